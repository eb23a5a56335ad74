use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a source file under analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u64);

impl FileId {
	/// Generates a new unique file ID.
	pub fn next() -> Self {
		Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for FileId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "file#{}", self.0)
	}
}

/// Stable identifier of a definition.
///
/// Assigned by the declaration source and preserved across edits that keep the
/// definition's name and nesting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefId(pub u64);

impl fmt::Display for DefId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "def#{}", self.0)
	}
}
