//! Monotonic version clocks stamping edits.
//!
//! Two independent counters are kept: one advances on every change, the other
//! only when a change alters the shape of a definition (rename, signature
//! edit, definition added or removed). The clock is injected into the
//! scheduler so tests can drive synthetic version sequences.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use weft_primitives::{Stamp, Version};

/// Source of edit stamps.
pub trait VersionClock: Send + Sync + fmt::Debug {
	/// Advances the any-change clock, and the shape clock when `shape_changed`.
	///
	/// Returns both readings after the advance.
	fn tick(&self, shape_changed: bool) -> Stamp;

	/// Returns the current readings without advancing.
	fn now(&self) -> Stamp;
}

/// Lock-free clock backed by two atomics.
#[derive(Debug, Default)]
pub struct AtomicVersionClock {
	any: AtomicU64,
	shape: AtomicU64,
}

impl AtomicVersionClock {
	/// Creates a clock at `Version::ZERO`; the first tick issues version 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a clock whose next tick issues the versions following `start`.
	pub fn starting_at(start: Stamp) -> Self {
		Self {
			any: AtomicU64::new(start.version.0),
			shape: AtomicU64::new(start.shape.0),
		}
	}
}

impl VersionClock for AtomicVersionClock {
	fn tick(&self, shape_changed: bool) -> Stamp {
		// Shape first so a reader never sees a version newer than its shape tick.
		let shape = if shape_changed {
			self.shape.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
		} else {
			self.shape.load(Ordering::Acquire)
		};
		let version = self.any.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
		Stamp::new(Version(version), Version(shape))
	}

	fn now(&self) -> Stamp {
		let shape = self.shape.load(Ordering::Acquire);
		let version = self.any.load(Ordering::Acquire);
		Stamp::new(Version(version), Version(shape))
	}
}
