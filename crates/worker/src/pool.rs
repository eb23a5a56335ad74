use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

/// Runtime used when a lane is started from a thread outside any runtime.
fn fallback_runtime() -> Option<&'static Runtime> {
	static FALLBACK: OnceLock<Option<Runtime>> = OnceLock::new();
	FALLBACK
		.get_or_init(|| {
			Builder::new_multi_thread()
				.worker_threads(1)
				.thread_name("weft-lanes")
				.enable_all()
				.build()
				.inspect_err(|error| tracing::error!(%error, "worker.pool.runtime_failed"))
				.ok()
		})
		.as_ref()
}

/// Runs a lane worker on the blocking pool.
///
/// Uses the ambient runtime when there is one. Without any runtime the
/// worker runs on the calling thread.
pub(crate) fn run_lane_worker(lane: &'static str, worker: impl FnOnce() + Send + 'static) {
	if let Ok(handle) = Handle::try_current() {
		tracing::trace!(lane, "worker.pool.ambient");
		drop(handle.spawn_blocking(worker));
		return;
	}
	match fallback_runtime() {
		Some(runtime) => {
			tracing::trace!(lane, "worker.pool.fallback");
			drop(runtime.spawn_blocking(worker));
		}
		None => {
			tracing::warn!(lane, "worker.pool.caller_thread");
			worker();
		}
	}
}
