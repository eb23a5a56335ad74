use std::fmt;

/// A value read from one of the monotonic version clocks.
///
/// `Version::ZERO` means "never observed"; clocks start issuing at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub u64);

impl Version {
	pub const ZERO: Version = Version(0);

	/// Returns the following version.
	#[inline]
	pub fn next(self) -> Version {
		Version(self.0.wrapping_add(1))
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

/// Pair of clock readings a unit of work was computed against.
///
/// `version` comes from the any-change clock, `shape` from the
/// definition-shape clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stamp {
	pub version: Version,
	pub shape: Version,
}

impl Stamp {
	pub const fn new(version: Version, shape: Version) -> Self {
		Self { version, shape }
	}
}
