/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// human-readable output can be suppressed when results are printed as JSON.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Validating mysql-service.yaml...")
    fn status(&self, message: &str);

    /// Success message (e.g., "default: converged")
    fn success(&self, message: &str);

    /// Error message (e.g., "default: failed at :create /etc/mysql-default")
    fn error(&self, message: &str);

    /// A blank line separator.
    fn blank(&self);
}

/// Standard CLI output. Writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn blank(&self) {
        println!();
    }
}

/// Suppresses everything except errors. Used with `--json`, where stdout
/// carries only the JSON document.
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }
    fn blank(&self) {}
}

/// Pretty-printed JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
