use thiserror::Error;
use weft_primitives::FileId;

/// Errors returned by the scheduler API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
	/// The file was never opened or has been closed.
	#[error("unknown file: {0}")]
	UnknownFile(FileId),

	/// `open` was called for a file that is already tracked.
	#[error("file already open: {0}")]
	AlreadyOpen(FileId),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// A resolution pass observed cancellation between two definitions.
///
/// Not user-visible; the file simply stays dirty.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("resolution pass canceled")]
pub struct Canceled;
