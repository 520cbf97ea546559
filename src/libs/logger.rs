use std::fmt;

/// Logging handle threaded through fitting and prediction.
///
/// Messages go to the `log` facade under the handle's target, so
/// `RUST_LOG=qfit::predict=debug` narrows output to one stage.
#[derive(Debug, Clone)]
pub struct Logger {
    target: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("qfit")
    }
}

impl Logger {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
        }
    }

    /// A child handle logging under `<target>::<name>`.
    pub fn scoped(&self, name: &str) -> Self {
        Self {
            target: format!("{}::{}", self.target, name),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn debug(&self, args: fmt::Arguments) {
        log::debug!(target: self.target.as_str(), "{}", args);
    }

    pub fn info(&self, args: fmt::Arguments) {
        log::info!(target: self.target.as_str(), "{}", args);
    }

    pub fn warn(&self, args: fmt::Arguments) {
        log::warn!(target: self.target.as_str(), "{}", args);
    }
}
