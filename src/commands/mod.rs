mod action;
mod plan;
mod validate;

pub use action::run_action;
pub use plan::run_plan;
pub use validate::run_validate;
