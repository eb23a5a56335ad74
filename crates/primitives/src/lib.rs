//! Core value types for incremental analysis: identifiers, spans and versions.

/// Identifier types for files and definitions.
pub mod ids;
/// Byte spans into a source file.
pub mod span;
/// Version stamps issued by the version clocks.
pub mod version;

pub use ids::{DefId, FileId};
pub use span::Span;
pub use version::{Stamp, Version};
