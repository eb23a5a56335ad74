//! Applicability of results computed against an older version.

use weft_primitives::Version;

use crate::staleness::FileState;

/// Returns true if work computed at `task_version` may still be applied.
///
/// Checked before every group of a typecheck task and once more before the
/// task advances the file's typecheck version.
#[inline]
pub fn applicable(task_version: Version, state: &FileState) -> bool {
	task_version == state.last_seen
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_the_latest_version_applies() {
		let state = FileState {
			last_seen: Version(6),
			..FileState::default()
		};
		assert!(applicable(Version(6), &state));
		assert!(!applicable(Version(5), &state));
		assert!(!applicable(Version(7), &state));
	}
}
