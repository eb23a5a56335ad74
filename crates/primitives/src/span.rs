/// Half-open byte range `[start, end)` into a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
	pub start: u32,
	pub end: u32,
}

impl Span {
	/// Creates a span, normalizing reversed bounds.
	pub fn new(start: u32, end: u32) -> Self {
		if end < start { Self { start: end, end: start } } else { Self { start, end } }
	}

	/// Returns the length in bytes.
	#[inline]
	pub fn len(&self) -> u32 {
		self.end - self.start
	}

	/// Returns true for zero-width spans.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.start == self.end
	}

	/// Returns true if `offset` lies inside the span.
	#[inline]
	pub fn contains(&self, offset: u32) -> bool {
		self.start <= offset && offset < self.end
	}

	/// Moves the span by `delta` bytes, clamping at the start of the file.
	pub fn shifted(self, delta: i64) -> Span {
		let shift = |offset: u32| u32::try_from((i64::from(offset) + delta).max(0)).unwrap_or(u32::MAX);
		Span {
			start: shift(self.start),
			end: shift(self.end),
		}
	}

	/// Smallest span covering both `self` and `other`.
	pub fn cover(self, other: Span) -> Span {
		Span {
			start: self.start.min(other.start),
			end: self.end.max(other.end),
		}
	}
}
