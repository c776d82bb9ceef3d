use thiserror::Error;

/// The error kinds the front-end reports. Argument and validation errors are
/// raised before any delegation; a back-end never sees them.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Null-required-pointer analogs, count/shape mismatches, out-of-range
    /// enums. Always reported for constructors with missing required inputs.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Resource-creation and command-buffer invariants, reported under debug
    /// mode only.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A `supports_*` query would have returned false for this use.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl GpuError {
    /// Log-and-wrap, so every sentinel return leaves a diagnostic behind.
    pub(crate) fn report(self) -> anyhow::Error {
        log::error!("{self}");
        self.into()
    }
}
