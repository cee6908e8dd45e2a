//! Per-invocation state.
//!
//! One module run owns one `ModuleState`: the async runtime the connection
//! lives on, the dry-run flag and the warnings collected along the way.
//! Nothing here outlives the process.

use crate::error::CrdbError;

use parking_lot::Mutex;
use uuid::Uuid;

/// State for a single module invocation.
pub struct ModuleState {
    /// Identifier used to correlate log lines of one run
    invocation_id: Uuid,
    /// Skip mutating statements, report what would change
    check_mode: bool,
    /// Non-fatal warnings, returned in the module result
    warnings: Mutex<Vec<String>>,
    /// Tokio runtime driving the database connection
    tokio_runtime: tokio::runtime::Runtime,
}

impl ModuleState {
    /// Create invocation state with a single-threaded runtime.
    pub fn new(check_mode: bool) -> Result<Self, CrdbError> {
        let tokio_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CrdbError::internal(format!("Failed to create tokio runtime: {e}")))?;

        let invocation_id = Uuid::new_v4();
        tracing::debug!(%invocation_id, check_mode, "ModuleState initialized");

        Ok(Self { invocation_id, check_mode, warnings: Mutex::new(Vec::new()), tokio_runtime })
    }

    /// Get the invocation identifier.
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Whether mutating statements must be skipped.
    pub fn check_mode(&self) -> bool {
        self.check_mode
    }

    // ========== Warnings ==========

    /// Record a non-fatal warning.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(invocation_id = %self.invocation_id, "{message}");
        self.warnings.lock().push(message);
    }

    /// Record several warnings at once.
    pub fn extend_warnings(&self, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.warn(message);
        }
    }

    /// Get a copy of the collected warnings.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }

    // ========== Runtime ==========

    /// Get a handle to the tokio runtime.
    pub fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.tokio_runtime
    }

    /// Block on a future using the invocation runtime.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.tokio_runtime.block_on(future)
    }
}

impl std::fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleState")
            .field("invocation_id", &self.invocation_id)
            .field("check_mode", &self.check_mode)
            .field("warnings", &self.warnings.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_are_collected_in_order() {
        let state = ModuleState::new(false).unwrap();
        state.warn("first");
        state.extend_warnings(vec!["second".to_string()]);
        assert_eq!(state.warnings(), vec!["first", "second"]);
        assert_eq!(state.take_warnings().len(), 2);
        assert!(state.warnings().is_empty());
    }

    #[test]
    fn test_block_on_runs_futures() {
        let state = ModuleState::new(true).unwrap();
        assert!(state.check_mode());
        assert_eq!(state.block_on(async { 40 + 2 }), 42);
    }
}
