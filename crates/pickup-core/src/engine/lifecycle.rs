//! Startup and shutdown procedures for the pickup engine.

use super::{EngineError, PickupEngine};

impl PickupEngine {
	/// Resolves orders left overdue by a previous run.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(service_id = %self.config.service.id, "Initializing pickup engine");

		let report = self
			.recovery()
			.recover_state()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		if report.sweep.failed > 0 {
			tracing::warn!(
				failed = report.sweep.failed,
				"Some overdue orders could not be expired during recovery"
			);
		}
		Ok(())
	}

	/// Performs cleanup operations.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down pickup engine");
		Ok(())
	}
}
