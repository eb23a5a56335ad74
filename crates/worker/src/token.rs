use tokio_util::sync::CancellationToken;

/// Cooperative cancellation token scoped to one pass generation.
///
/// The generation is the clock value the pass started at; a newer pass
/// cancels the older token instead of interrupting it.
#[derive(Debug, Clone)]
pub struct PassToken {
	generation: u64,
	cancel: CancellationToken,
}

impl PassToken {
	/// Creates a fresh, uncancelled token for `generation`.
	pub fn new(generation: u64) -> Self {
		Self {
			generation,
			cancel: CancellationToken::new(),
		}
	}

	/// Token that is never cancelled by anyone else.
	pub fn detached() -> Self {
		Self::new(0)
	}

	/// Returns generation ID.
	pub const fn generation(&self) -> u64 {
		self.generation
	}

	/// Returns true when cancellation is requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}
