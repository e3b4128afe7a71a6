#![allow(unused_assignments)]

//! # mysql-service
//!
//! Idempotent convergence of named MySQL service instances on a Linux host.
//!
//! Each lifecycle action (create, start, stop, restart, reload, delete) is
//! planned into an ordered list of operations. Destructive or one-time steps
//! (database initialization, the first privilege grant) are protected by
//! guards evaluated immediately before they run, so repeated invocations
//! converge without redoing work.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mysql_service::{Action, Converger, Parser, SystemHost};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), mysql_service::Error> {
//! let config = Parser::new().load_config("mysql-service.yaml")?;
//! let host = Arc::new(SystemHost::new(config.timeouts));
//!
//! let converger = Converger::new(config, host);
//! for result in converger.converge(Action::Create, &[]).await? {
//!     println!("{}: converged={}", result.instance, result.converged);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`config`] - `mysql-service.yaml` parsing and validation
//! - [`context`] - Derived per-instance paths and package coordinates
//! - [`template`] - Strict `{{variable}}` rendering and init-script lookup
//! - [`provider`] / [`plan`] - Ordered operations per action and platform family
//! - [`guard`] / [`executor`] - Guard-then-dispatch execution
//! - [`host`] - The primitives operations are dispatched to
//! - [`converge`] - Entry point tying the above together

pub mod config;
pub mod context;
pub mod converge;
pub mod error;
pub mod executor;
pub mod guard;
pub mod host;
pub mod markers;
pub mod plan;
pub mod provider;
pub mod template;

// Re-export commonly used types
pub use config::{Config, Parser, Platform, PlatformFamily};
pub use context::InstanceContext;
pub use converge::{Converger, InstanceClaims};
pub use error::{Error, ErrorKind, Result};
pub use executor::{ActionExecutor, ActionResult, ExecutionMode, Outcome};
pub use host::{HostPrimitives, RecordingHost, SystemHost};
pub use plan::{Action, ConvergencePlanner, Operation, OperationKind, Plan};
pub use template::TemplateRenderer;
