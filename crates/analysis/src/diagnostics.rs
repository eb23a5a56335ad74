//! Diagnostics and their per-phase aggregation.
//!
//! Diagnostics are grouped by `(file, phase)`. Resolution diagnostics are
//! replaced as one batch per pass. Typecheck diagnostics are further keyed by
//! definition so that a task only replaces what it actually rechecked.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use weft_primitives::{DefId, FileId, Span, Version};

/// Analysis phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
	Resolution,
	Typecheck,
}

impl Phase {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Resolution => "resolution",
			Self::Typecheck => "typecheck",
		}
	}
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
	/// A name did not resolve in any scope.
	UnresolvedReference,
	/// Two definitions share an effective name in one scope.
	StructuralConflict,
	/// The typechecker rejected a definition.
	TypecheckError,
	/// A goal (placeholder) with the errors found inside it.
	Goal,
}

impl DiagnosticKind {
	pub const fn phase(self) -> Phase {
		match self {
			Self::UnresolvedReference | Self::StructuralConflict => Phase::Resolution,
			Self::TypecheckError | Self::Goal => Phase::Typecheck,
		}
	}

	/// Goals are informational; everything else is an error.
	pub const fn is_error(self) -> bool {
		!matches!(self, Self::Goal)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
	pub kind: DiagnosticKind,
	pub target: Option<DefId>,
	pub span: Span,
	pub message: String,
	/// Errors reported inside a goal.
	pub embedded: Vec<Diagnostic>,
}

impl Diagnostic {
	pub fn new(kind: DiagnosticKind, target: Option<DefId>, span: Span, message: impl Into<String>) -> Self {
		Self {
			kind,
			target,
			span,
			message: message.into(),
			embedded: Vec::new(),
		}
	}

	pub fn unresolved(target: DefId, span: Span, name: &str) -> Self {
		Self::new(DiagnosticKind::UnresolvedReference, Some(target), span, format!("cannot resolve `{name}`"))
	}

	pub fn typecheck_error(target: DefId, span: Span, message: impl Into<String>) -> Self {
		Self::new(DiagnosticKind::TypecheckError, Some(target), span, message)
	}

	pub fn goal(target: DefId, span: Span, message: impl Into<String>, embedded: Vec<Diagnostic>) -> Self {
		Self {
			embedded,
			..Self::new(DiagnosticKind::Goal, Some(target), span, message)
		}
	}

	pub fn phase(&self) -> Phase {
		self.kind.phase()
	}

	/// The same diagnostic, embedded ones included, moved by `delta` bytes.
	pub fn shifted(&self, delta: i64) -> Self {
		Self {
			span: self.span.shifted(delta),
			embedded: self.embedded.iter().map(|inner| inner.shifted(delta)).collect(),
			..self.clone()
		}
	}
}

/// Expands goals into the goal followed by its embedded diagnostics.
pub fn flatten_for_editor(diagnostics: &[Diagnostic]) -> Vec<Diagnostic> {
	let mut out = Vec::with_capacity(diagnostics.len());
	for diagnostic in diagnostics {
		if diagnostic.kind == DiagnosticKind::Goal {
			let mut goal = diagnostic.clone();
			let embedded = std::mem::take(&mut goal.embedded);
			out.push(goal);
			out.extend(flatten_for_editor(&embedded));
		} else {
			out.push(diagnostic.clone());
		}
	}
	out
}

#[derive(Debug, Clone, Default)]
struct Batch {
	version: Version,
	diagnostics: Vec<Diagnostic>,
}

/// Typecheck diagnostics of one definition.
#[derive(Debug, Clone)]
struct DefinitionBatch {
	version: Version,
	/// Start of the definition in the snapshot the diagnostics were computed on.
	anchor: u32,
	diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
struct FileDiagnostics {
	resolution: Batch,
	typecheck: BTreeMap<DefId, DefinitionBatch>,
	/// Typecheck diagnostics installed for the whole phase with no target.
	untargeted: Batch,
	/// Where each definition starts in the newest resolved snapshot.
	positions: FxHashMap<DefId, u32>,
}

impl FileDiagnostics {
	fn newest_typecheck(&self) -> Version {
		self.typecheck
			.values()
			.map(|batch| batch.version)
			.fold(self.untargeted.version, Version::max)
	}

	/// Diagnostics of one definition moved to where it currently starts.
	fn placed(&self, def: DefId, batch: &DefinitionBatch) -> impl Iterator<Item = Diagnostic> {
		let delta = self
			.positions
			.get(&def)
			.map_or(0, |&start| i64::from(start) - i64::from(batch.anchor));
		batch.diagnostics.iter().map(move |diagnostic| diagnostic.shifted(delta))
	}
}

/// Process-wide diagnostic store, safe for concurrent use across files.
///
/// Typecheck diagnostics stay attached to their definition. A definition that
/// moves without changing keeps its diagnostics, reported at its new offset.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
	files: RwLock<FxHashMap<FileId, FileDiagnostics>>,
}

impl ErrorAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the whole batch of one phase.
	///
	/// Returns false if a batch from a newer version is already installed.
	pub fn replace(&self, file: FileId, phase: Phase, version: Version, diagnostics: Vec<Diagnostic>) -> bool {
		let mut files = self.files.write();
		let entry = files.entry(file).or_default();
		let applied = match phase {
			Phase::Resolution => {
				if entry.resolution.version > version {
					false
				} else {
					entry.resolution = Batch { version, diagnostics };
					true
				}
			}
			Phase::Typecheck => {
				if entry.newest_typecheck() > version {
					false
				} else {
					let (targeted, untargeted): (Vec<_>, Vec<_>) =
						diagnostics.into_iter().partition(|diagnostic| diagnostic.target.is_some());
					entry.typecheck.clear();
					for (def, diagnostics) in group_by_target(targeted, None) {
						let anchor = entry.positions.get(&def).copied().unwrap_or_default();
						entry.typecheck.insert(def, DefinitionBatch { version, anchor, diagnostics });
					}
					entry.untargeted = Batch {
						version,
						diagnostics: untargeted,
					};
					true
				}
			}
		};
		drop(files);
		note_applied(file, phase, applied);
		applied
	}

	/// Empties one phase.
	pub fn clear(&self, file: FileId, phase: Phase, version: Version) -> bool {
		self.replace(file, phase, version, Vec::new())
	}

	/// Replaces typecheck diagnostics of the listed definitions only.
	///
	/// Each definition comes with its start offset in the snapshot that was
	/// checked. Diagnostics targeting definitions outside the group (or none)
	/// are attached to the first listed definition. Definitions whose
	/// installed batch is newer than `version` are left untouched. Returns the
	/// number of definitions updated.
	pub fn replace_definitions(
		&self,
		file: FileId,
		defs: &[(DefId, u32)],
		version: Version,
		diagnostics: Vec<Diagnostic>,
	) -> usize {
		let Some(&(first, _)) = defs.first() else {
			return 0;
		};
		let ids: Vec<DefId> = defs.iter().map(|&(def, _)| def).collect();
		let mut grouped = group_by_target(diagnostics, Some((ids.as_slice(), first)));

		let mut files = self.files.write();
		let entry = files.entry(file).or_default();
		let mut updated = 0;
		for &(def, anchor) in defs {
			if entry.typecheck.get(&def).is_some_and(|batch| batch.version > version) {
				continue;
			}
			let diagnostics = grouped.remove(&def).unwrap_or_default();
			if diagnostics.is_empty() {
				entry.typecheck.remove(&def);
			} else {
				entry.typecheck.insert(def, DefinitionBatch { version, anchor, diagnostics });
			}
			updated += 1;
		}
		drop(files);
		note_applied(file, Phase::Typecheck, updated > 0);
		updated
	}

	/// Records where every definition of the newest resolved snapshot starts.
	///
	/// Returns true if diagnostics already installed for a definition now
	/// report at a different offset.
	pub fn place_definitions(&self, file: FileId, positions: impl IntoIterator<Item = (DefId, u32)>) -> bool {
		let positions: FxHashMap<DefId, u32> = positions.into_iter().collect();
		let mut files = self.files.write();
		let entry = files.entry(file).or_default();
		let moved = entry
			.typecheck
			.keys()
			.any(|def| entry.positions.get(def) != positions.get(def));
		entry.positions = positions;
		moved
	}

	/// Forgets typecheck diagnostics of definitions that no longer exist or
	/// are no longer typechecked.
	pub fn remove_definitions(&self, file: FileId, removed: &[DefId]) {
		if removed.is_empty() {
			return;
		}
		let mut files = self.files.write();
		let Some(entry) = files.get_mut(&file) else {
			return;
		};
		let before = entry.typecheck.len();
		for def in removed {
			entry.typecheck.remove(def);
		}
		let dropped = before - entry.typecheck.len();
		drop(files);
		if dropped > 0 {
			tracing::trace!(%file, dropped, "diagnostics.definitions.removed");
		}
	}

	/// Drops every diagnostic of a file.
	pub fn remove_file(&self, file: FileId) {
		self.files.write().remove(&file);
	}

	/// Diagnostics of one phase, ordered by position.
	pub fn diagnostics(&self, file: FileId, phase: Phase) -> Vec<Diagnostic> {
		let files = self.files.read();
		let Some(entry) = files.get(&file) else {
			return Vec::new();
		};
		let mut out: Vec<Diagnostic> = match phase {
			Phase::Resolution => entry.resolution.diagnostics.clone(),
			Phase::Typecheck => entry
				.typecheck
				.iter()
				.flat_map(|(&def, batch)| entry.placed(def, batch))
				.chain(entry.untargeted.diagnostics.iter().cloned())
				.collect(),
		};
		out.sort_by_key(|diagnostic| (diagnostic.span.start, diagnostic.span.end));
		out
	}

	/// Typecheck diagnostics of one definition.
	pub fn definition_diagnostics(&self, file: FileId, def: DefId) -> Vec<Diagnostic> {
		let files = self.files.read();
		let Some(entry) = files.get(&file) else {
			return Vec::new();
		};
		entry
			.typecheck
			.get(&def)
			.map(|batch| entry.placed(def, batch).collect())
			.unwrap_or_default()
	}

	/// Version of the batch installed for a definition, if any.
	pub fn definition_version(&self, file: FileId, def: DefId) -> Option<Version> {
		self.files.read().get(&file).and_then(|entry| entry.typecheck.get(&def)).map(|batch| batch.version)
	}

	/// Number of error diagnostics (goals excluded) across both phases.
	pub fn error_count(&self, file: FileId) -> usize {
		[Phase::Resolution, Phase::Typecheck]
			.into_iter()
			.flat_map(|phase| self.diagnostics(file, phase))
			.filter(|diagnostic| diagnostic.kind.is_error())
			.count()
	}
}

fn note_applied(file: FileId, phase: Phase, applied: bool) {
	if !applied {
		tracing::trace!(%file, phase = phase.as_str(), "diagnostics.replace.ignored_older");
	}
}

/// Buckets targeted diagnostics by definition. With `fallback`, targets
/// outside the listed definitions (and untargeted ones) go to the fallback.
fn group_by_target(diagnostics: Vec<Diagnostic>, fallback: Option<(&[DefId], DefId)>) -> BTreeMap<DefId, Vec<Diagnostic>> {
	let mut grouped: BTreeMap<DefId, Vec<Diagnostic>> = BTreeMap::new();
	for diagnostic in diagnostics {
		let key = match (diagnostic.target, fallback) {
			(Some(def), Some((defs, first))) => {
				if defs.contains(&def) {
					def
				} else {
					first
				}
			}
			(Some(def), None) => def,
			(None, Some((_, first))) => first,
			(None, None) => continue,
		};
		grouped.entry(key).or_default().push(diagnostic);
	}
	grouped
}
