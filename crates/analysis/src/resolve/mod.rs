//! Document-order name resolution.
//!
//! A [`ResolvePass`] walks the declarations of a [`Snapshot`] in document
//! order and yields [`ResolveEvent`]s lazily. Cancellation is observed only
//! between definitions, so a definition's events are always complete.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use weft_primitives::{DefId, FileId, Span, Version};
use weft_worker::PassToken;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::Canceled;
use crate::snapshot::{DefKind, Declaration, NamePart, Reference, Snapshot};

pub mod annotate;
pub mod scope;

use scope::{LocalScope, NamingScope, Referable};

/// Resolution of one name occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
	/// Definition containing the occurrence.
	pub owner: DefId,
	pub reference: Reference,
	/// Referents of the resolved prefix, one per part. Shorter than
	/// `reference.parts` when a part failed to resolve.
	pub resolved: Vec<Referable>,
}

impl ResolvedReference {
	pub fn is_complete(&self) -> bool {
		self.resolved.len() == self.reference.parts.len()
	}

	/// Index of the first part that did not resolve.
	pub fn first_unresolved(&self) -> Option<usize> {
		(!self.is_complete()).then_some(self.resolved.len())
	}

	/// Referent of the whole name, if every part resolved.
	pub fn target(&self) -> Option<&Referable> {
		if self.is_complete() { self.resolved.last() } else { None }
	}
}

/// A parameter telescope with its type resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParam {
	pub names: Vec<NamePart>,
	pub ty: Option<Referable>,
}

/// A fully resolved definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concrete {
	pub id: DefId,
	pub kind: DefKind,
	pub name: String,
	pub name_span: Span,
	pub alias_span: Option<Span>,
	pub span: Span,
	pub parent: Option<DefId>,
	pub shape: u64,
	/// File-local definitions referenced from the signature or body.
	pub deps: BTreeSet<DefId>,
	pub params: Vec<ResolvedParam>,
	/// Number of name occurrences that failed to resolve.
	pub unresolved: usize,
}

impl Concrete {
	/// Whether two resolutions of the same definition would typecheck alike.
	///
	/// Spans are ignored; edits elsewhere shift them without changing meaning.
	pub fn same_analysis(&self, other: &Concrete) -> bool {
		self.kind == other.kind
			&& self.name == other.name
			&& self.parent == other.parent
			&& self.shape == other.shape
			&& self.deps == other.deps
			&& self.unresolved == other.unresolved
			&& self.params.iter().map(|p| &p.ty).eq(other.params.iter().map(|p| &p.ty))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveEvent {
	Reference(ResolvedReference),
	Definition(Arc<Concrete>),
	Diagnostic(Diagnostic),
}

/// Resolves snapshots against a fixed external scope.
#[derive(Debug, Clone)]
pub struct Resolver {
	scope: Arc<dyn NamingScope>,
}

impl Resolver {
	pub fn new(scope: Arc<dyn NamingScope>) -> Self {
		Self { scope }
	}

	/// Starts a lazy pass over `snapshot`.
	pub fn pass(&self, snapshot: &Snapshot, token: PassToken) -> ResolvePass {
		ResolvePass {
			snapshot: snapshot.clone(),
			local: Arc::new(LocalScope::build(snapshot)),
			external: Arc::clone(&self.scope),
			token,
			position: 0,
			pending: VecDeque::new(),
			done: false,
		}
	}
}

/// Lazy sequence of resolution events over one snapshot.
///
/// Yields `Err(Canceled)` once if the token is cancelled before a definition,
/// then ends. [`ResolvePass::restart`] rewinds to the first definition.
#[derive(Debug)]
pub struct ResolvePass {
	snapshot: Snapshot,
	local: Arc<LocalScope>,
	external: Arc<dyn NamingScope>,
	token: PassToken,
	position: usize,
	pending: VecDeque<ResolveEvent>,
	done: bool,
}

impl ResolvePass {
	pub fn version(&self) -> Version {
		self.snapshot.version()
	}

	pub fn file(&self) -> FileId {
		self.snapshot.file()
	}

	/// Rewinds the pass under a fresh token.
	pub fn restart(&mut self, token: PassToken) {
		self.token = token;
		self.position = 0;
		self.pending.clear();
		self.done = false;
	}

	fn resolve_definition(&mut self, decl: &Declaration) {
		for conflict in self.local.conflicts_of(decl.id) {
			self.pending.push_back(ResolveEvent::Diagnostic(Diagnostic::new(
				DiagnosticKind::StructuralConflict,
				Some(decl.id),
				conflict.name.span,
				format!("duplicate definition `{}`", conflict.name.text),
			)));
		}

		let mut deps = BTreeSet::new();
		let mut unresolved = 0;
		let mut params = Vec::with_capacity(decl.params.len());
		for param in &decl.params {
			let ty = param.ty.as_ref().and_then(|ty| {
				let resolved = self.resolve_reference(decl, ty, &mut deps, &mut unresolved);
				resolved.target().cloned()
			});
			params.push(ResolvedParam {
				names: param.names.clone(),
				ty,
			});
		}

		for reference in &decl.references {
			if is_bound_variable(decl, reference) {
				continue;
			}
			self.resolve_reference(decl, reference, &mut deps, &mut unresolved);
		}
		deps.remove(&decl.id);

		let concrete = Concrete {
			id: decl.id,
			kind: decl.kind,
			name: decl.name.text.clone(),
			name_span: decl.name.span,
			alias_span: decl.alias.as_ref().map(|alias| alias.span),
			span: decl.span,
			parent: decl.parent,
			shape: decl.shape,
			deps,
			params,
			unresolved,
		};
		self.pending.push_back(ResolveEvent::Definition(Arc::new(concrete)));
	}

	fn resolve_reference(
		&mut self,
		owner: &Declaration,
		reference: &Reference,
		deps: &mut BTreeSet<DefId>,
		unresolved: &mut usize,
	) -> ResolvedReference {
		let mut resolved: Vec<Referable> = Vec::with_capacity(reference.parts.len());
		for part in &reference.parts {
			let found = match resolved.last() {
				None => self
					.local
					.lookup_from(owner.id, &part.text)
					.cloned()
					.or_else(|| self.external.resolve(None, &part.text)),
				Some(qualifier) => qualifier
					.local_id()
					.and_then(|parent| self.local.child(parent, &part.text).cloned())
					.or_else(|| self.external.resolve(Some(qualifier), &part.text)),
			};
			let Some(found) = found else {
				*unresolved += 1;
				self.pending
					.push_back(ResolveEvent::Diagnostic(Diagnostic::unresolved(owner.id, part.span, &part.text)));
				break;
			};
			if let Some(id) = found.local_id() {
				deps.insert(id);
			}
			resolved.push(found);
		}

		let event = ResolvedReference {
			owner: owner.id,
			reference: reference.clone(),
			resolved,
		};
		self.pending.push_back(ResolveEvent::Reference(event.clone()));
		event
	}
}

impl Iterator for ResolvePass {
	type Item = Result<ResolveEvent, Canceled>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(event) = self.pending.pop_front() {
				return Some(Ok(event));
			}
			if self.done {
				return None;
			}
			if self.token.is_cancelled() {
				self.done = true;
				tracing::debug!(file = %self.snapshot.file(), version = %self.snapshot.version(), at = self.position, "resolve.pass.canceled");
				return Some(Err(Canceled));
			}
			let snapshot = self.snapshot.clone();
			let Some(decl) = snapshot.declarations().get(self.position) else {
				self.done = true;
				return None;
			};
			self.position += 1;
			self.resolve_definition(decl);
		}
	}
}

/// Single-part references naming one of the owner's parameters.
fn is_bound_variable(owner: &Declaration, reference: &Reference) -> bool {
	let [part] = reference.parts.as_slice() else {
		return false;
	};
	owner
		.params
		.iter()
		.flat_map(|param| param.names.iter())
		.any(|name| name.text == part.text)
}

/// Result of a completed pass.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFile {
	pub version: Version,
	definitions: Vec<Arc<Concrete>>,
	by_id: FxHashMap<DefId, usize>,
	diagnostics: Vec<Diagnostic>,
}

/// Definitions whose resolution changed between two passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveDiff {
	/// New definitions and definitions that resolve differently, in document order.
	pub changed: Vec<DefId>,
	/// Definitions of the previous pass missing from the new one.
	pub removed: Vec<DefId>,
}

impl ResolveDiff {
	pub fn is_empty(&self) -> bool {
		self.changed.is_empty() && self.removed.is_empty()
	}
}

impl ResolvedFile {
	/// Drains a pass, handing every event to `observe` before collecting it.
	pub fn collect(
		pass: &mut ResolvePass,
		mut observe: impl FnMut(&ResolveEvent),
	) -> Result<Self, Canceled> {
		let mut file = ResolvedFile {
			version: pass.version(),
			..Self::default()
		};
		for event in pass {
			let event = event?;
			observe(&event);
			match event {
				ResolveEvent::Definition(concrete) => {
					file.by_id.insert(concrete.id, file.definitions.len());
					file.definitions.push(concrete);
				}
				ResolveEvent::Diagnostic(diagnostic) => file.diagnostics.push(diagnostic),
				ResolveEvent::Reference(_) => {}
			}
		}
		Ok(file)
	}

	/// All definitions in document order.
	pub fn definitions(&self) -> &[Arc<Concrete>] {
		&self.definitions
	}

	pub fn get(&self, id: DefId) -> Option<&Arc<Concrete>> {
		self.by_id.get(&id).map(|&pos| &self.definitions[pos])
	}

	pub fn position(&self, id: DefId) -> Option<usize> {
		self.by_id.get(&id).copied()
	}

	pub fn diagnostics(&self) -> &[Diagnostic] {
		&self.diagnostics
	}

	/// Definitions that go through typechecking, in document order.
	pub fn typecheckable(&self) -> impl Iterator<Item = &Arc<Concrete>> {
		self.definitions.iter().filter(|def| def.kind.is_typecheckable())
	}

	/// Typecheckable definitions, nested ones included.
	pub fn definition_count(&self) -> usize {
		self.typecheckable().count()
	}

	/// Compares against the previous pass of the same file.
	pub fn diff(&self, previous: Option<&ResolvedFile>) -> ResolveDiff {
		let Some(previous) = previous else {
			return ResolveDiff {
				changed: self.definitions.iter().map(|def| def.id).collect(),
				removed: Vec::new(),
			};
		};
		let changed = self
			.definitions
			.iter()
			.filter(|def| previous.get(def.id).is_none_or(|old| !old.same_analysis(def)))
			.map(|def| def.id)
			.collect();
		let removed = previous
			.definitions
			.iter()
			.filter(|def| !self.by_id.contains_key(&def.id))
			.map(|def| def.id)
			.collect();
		ResolveDiff { changed, removed }
	}

	/// `seeds` plus every definition that transitively depends on one of them.
	pub fn with_dependents(&self, seeds: impl IntoIterator<Item = DefId>) -> BTreeSet<DefId> {
		let mut reverse: FxHashMap<DefId, Vec<DefId>> = FxHashMap::default();
		for def in &self.definitions {
			for &dep in &def.deps {
				reverse.entry(dep).or_default().push(def.id);
			}
		}

		let mut out = BTreeSet::new();
		let mut stack: Vec<DefId> = seeds.into_iter().collect();
		while let Some(def) = stack.pop() {
			if !out.insert(def) {
				continue;
			}
			if let Some(users) = reverse.get(&def) {
				stack.extend(users.iter().copied().filter(|user| !out.contains(user)));
			}
		}
		out
	}
}
