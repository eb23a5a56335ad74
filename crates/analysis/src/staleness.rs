//! Per-file phase versions.
//!
//! A [`StalenessTracker`] records the latest version each phase has observed
//! and the definitions whose typecheck results are out of date. It never runs
//! anything itself; the scheduler asks it whether a phase must run and tells
//! it when a phase finished.

use std::collections::BTreeMap;

use weft_primitives::{DefId, Stamp, Version};

use crate::reconcile;

/// Versions observed by each phase of one file.
///
/// `last_typechecked <= last_resolved <= last_seen` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileState {
	/// Newest edit version seen.
	pub last_seen: Version,
	/// Version the last completed resolution pass started at.
	pub last_resolved: Version,
	/// Version of the last typecheck task whose results were applied.
	pub last_typechecked: Version,
	/// Definition under active edit, cleared when it is removed.
	pub last_edited: Option<DefId>,
	/// Shape clock observed by the last applied typecheck task.
	pub last_shape_typechecked: Version,
}

#[derive(Debug, Clone, Default)]
pub struct StalenessTracker {
	state: FileState,
	/// Definitions awaiting typechecking, with the version that dirtied them.
	awaiting: BTreeMap<DefId, Version>,
}

impl StalenessTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> FileState {
		self.state
	}

	/// Records an edit.
	///
	/// Versions older than the newest seen one are ignored. `edited` replaces
	/// the edited-definition marker only when the syntax layer named one.
	pub fn note_edit(&mut self, version: Version, edited: Option<DefId>) {
		if version > self.state.last_seen {
			self.state.last_seen = version;
		}
		if edited.is_some() {
			self.state.last_edited = edited;
		}
	}

	/// Every phase has caught up with the newest edit.
	pub fn is_current(&self) -> bool {
		self.state.last_resolved == self.state.last_seen
			&& self.state.last_typechecked == self.state.last_seen
			&& self.awaiting.is_empty()
	}

	/// Advances every phase to `version` without running anything.
	///
	/// Only allowed when the file was current before the edit; returns false
	/// and leaves the state untouched otherwise.
	pub fn fast_forward(&mut self, version: Version) -> bool {
		if !self.is_current() || version < self.state.last_seen {
			return false;
		}
		self.state.last_seen = version;
		self.state.last_resolved = version;
		self.state.last_typechecked = version;
		true
	}

	pub fn should_resolve(&self) -> bool {
		self.state.last_seen > self.state.last_resolved
	}

	/// Marks a resolution pass that started at `started` as completed.
	pub fn mark_resolved(&mut self, started: Version) {
		let started = started.min(self.state.last_seen);
		if started > self.state.last_resolved {
			self.state.last_resolved = started;
		}
	}

	/// Marks definitions as needing typechecking as of `version`.
	pub fn mark_dirty(&mut self, defs: impl IntoIterator<Item = DefId>, version: Version) {
		for def in defs {
			let entry = self.awaiting.entry(def).or_insert(version);
			if *entry < version {
				*entry = version;
			}
		}
	}

	/// Drops definitions that were removed or stopped being typechecked.
	pub fn forget(&mut self, removed: &[DefId]) {
		for def in removed {
			self.awaiting.remove(def);
		}
		if self.state.last_edited.is_some_and(|def| removed.contains(&def)) {
			self.state.last_edited = None;
		}
	}

	pub fn should_typecheck(&self) -> bool {
		!self.awaiting.is_empty()
	}

	pub fn is_awaiting(&self, def: DefId) -> bool {
		self.awaiting.contains_key(&def)
	}

	/// Definitions awaiting typechecking, in id order.
	pub fn awaiting(&self) -> impl Iterator<Item = DefId> + '_ {
		self.awaiting.keys().copied()
	}

	/// Clears definitions committed by a task computed at `task_version`.
	///
	/// A definition dirtied by a newer edit stays awaiting. Returns how many
	/// definitions were cleared.
	pub fn commit_group(&mut self, defs: &[DefId], task_version: Version) -> usize {
		let mut cleared = 0;
		for def in defs {
			if self.awaiting.get(def).is_some_and(|&dirtied| dirtied <= task_version) {
				self.awaiting.remove(def);
				cleared += 1;
			}
		}
		cleared
	}

	/// Advances the typecheck version after a task ran to completion.
	///
	/// Refused when the task is stale or left definitions awaiting.
	pub fn finish_typecheck(&mut self, stamp: Stamp) -> bool {
		if !reconcile::applicable(stamp.version, &self.state)
			|| stamp.version > self.state.last_resolved
			|| !self.awaiting.is_empty()
		{
			return false;
		}
		self.state.last_typechecked = stamp.version;
		self.state.last_shape_typechecked = stamp.shape;
		true
	}

	/// Fast-forwards the typecheck version after a resolve pass that changed
	/// nothing typecheck-relevant.
	pub fn settle(&mut self, stamp: Stamp) -> bool {
		if !self.awaiting.is_empty() || stamp.version != self.state.last_resolved {
			return false;
		}
		self.state.last_typechecked = stamp.version;
		self.state.last_shape_typechecked = self.state.last_shape_typechecked.max(stamp.shape);
		true
	}
}
