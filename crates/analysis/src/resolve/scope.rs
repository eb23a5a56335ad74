//! Name lookup: file-local declarations first, then an external scope.

use std::fmt;

use rustc_hash::FxHashMap;
use weft_primitives::DefId;

use crate::snapshot::{DefKind, Declaration, NamePart, Snapshot};

/// What a resolved name points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
	/// A definition of the file being analyzed.
	Local(DefId),
	/// A definition outside the file, identified by the external scope.
	External(String),
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Referable {
	pub name: String,
	pub target: Target,
	pub kind: DefKind,
	/// Declared with infix precedence.
	pub infix: bool,
	/// Carries a meta resolver that rewrites its applications.
	pub meta_resolver: bool,
}

impl Referable {
	pub fn external(name: impl Into<String>, path: impl Into<String>, kind: DefKind) -> Self {
		Self {
			name: name.into(),
			target: Target::External(path.into()),
			kind,
			infix: false,
			meta_resolver: false,
		}
	}

	pub fn with_infix(mut self) -> Self {
		self.infix = true;
		self
	}

	pub fn with_meta_resolver(mut self) -> Self {
		self.meta_resolver = true;
		self
	}

	pub(crate) fn local(decl: &Declaration, name: &NamePart) -> Self {
		Self {
			name: name.text.clone(),
			target: Target::Local(decl.id),
			kind: decl.kind,
			infix: decl.infix,
			meta_resolver: false,
		}
	}

	pub fn local_id(&self) -> Option<DefId> {
		match self.target {
			Target::Local(id) => Some(id),
			Target::External(_) => None,
		}
	}
}

/// Names visible from outside the file (imports, prelude, libraries).
pub trait NamingScope: Send + Sync {
	/// Resolves `name`, inside `qualifier` when it is a later part of a
	/// qualified name.
	fn resolve(&self, qualifier: Option<&Referable>, name: &str) -> Option<Referable>;
}

/// Scope with no external names.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyScope;

impl NamingScope for EmptyScope {
	fn resolve(&self, _qualifier: Option<&Referable>, _name: &str) -> Option<Referable> {
		None
	}
}

impl fmt::Debug for dyn NamingScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("dyn NamingScope")
	}
}

/// A later declaration reusing a name already taken in the same scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Conflict {
	pub def: DefId,
	pub name: NamePart,
}

/// Declarations of one snapshot indexed by `(enclosing definition, name)`.
///
/// Aliases are indexed like names. The first declaration of a name wins.
#[derive(Debug, Default)]
pub(crate) struct LocalScope {
	entries: FxHashMap<(Option<DefId>, String), Referable>,
	parents: FxHashMap<DefId, Option<DefId>>,
	conflicts: Vec<Conflict>,
}

impl LocalScope {
	pub fn build(snapshot: &Snapshot) -> Self {
		let mut scope = Self::default();
		for decl in snapshot.declarations() {
			scope.parents.insert(decl.id, decl.parent);
			for name in std::iter::once(&decl.name).chain(decl.alias.as_ref()) {
				let key = (decl.parent, name.text.clone());
				match scope.entries.get(&key) {
					Some(existing) if existing.local_id() != Some(decl.id) => scope.conflicts.push(Conflict {
						def: decl.id,
						name: name.clone(),
					}),
					Some(_) => {}
					None => {
						scope.entries.insert(key, Referable::local(decl, name));
					}
				}
			}
		}
		scope
	}

	pub fn conflicts_of(&self, def: DefId) -> impl Iterator<Item = &Conflict> {
		self.conflicts.iter().filter(move |conflict| conflict.def == def)
	}

	/// Looks a first name part up from inside `owner`: its own children, then
	/// each enclosing definition outward, then the top level.
	pub fn lookup_from(&self, owner: DefId, name: &str) -> Option<&Referable> {
		let mut current = Some(owner);
		while let Some(def) = current {
			if let Some(found) = self.entries.get(&(Some(def), name.to_owned())) {
				return Some(found);
			}
			current = self.parents.get(&def).copied().flatten();
		}
		self.entries.get(&(None, name.to_owned()))
	}

	/// Looks a name up among the children of `parent`.
	pub fn child(&self, parent: DefId, name: &str) -> Option<&Referable> {
		self.entries.get(&(Some(parent), name.to_owned()))
	}
}
