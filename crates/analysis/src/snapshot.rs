//! Immutable declaration snapshots handed to each resolution pass.
//!
//! The host owns the live syntax tree; the scheduler only ever sees a
//! value-typed, document-ordered list of declarations stamped with the
//! version of the edit that produced it.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use weft_primitives::{DefId, FileId, Span, Version};

/// Kind of a declared unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
	Function,
	Data,
	Constructor,
	Class,
	Record,
	Field,
	Instance,
	/// Namespace-only grouping; resolved but never typechecked.
	Module,
}

impl DefKind {
	/// Returns true if definitions of this kind go through typechecking.
	#[inline]
	pub fn is_typecheckable(self) -> bool {
		!matches!(self, Self::Module)
	}
}

/// One identifier of a (possibly qualified) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePart {
	pub text: String,
	pub span: Span,
}

impl NamePart {
	pub fn new(text: impl Into<String>, span: Span) -> Self {
		Self { text: text.into(), span }
	}
}

/// A name occurrence, `a` or `A.B.c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
	pub parts: SmallVec<[NamePart; 2]>,
}

impl Reference {
	/// Builds a reference from its parts, left to right.
	pub fn new(parts: impl IntoIterator<Item = NamePart>) -> Self {
		Self {
			parts: parts.into_iter().collect(),
		}
	}

	/// Single-identifier reference.
	pub fn simple(text: impl Into<String>, span: Span) -> Self {
		Self::new([NamePart::new(text, span)])
	}

	/// Span from the first to the last part.
	pub fn span(&self) -> Span {
		match (self.parts.first(), self.parts.last()) {
			(Some(first), Some(last)) => first.span.cover(last.span),
			_ => Span::default(),
		}
	}

	/// Dotted text of the whole name.
	pub fn text(&self) -> String {
		let mut out = String::new();
		for (i, part) in self.parts.iter().enumerate() {
			if i > 0 {
				out.push('.');
			}
			out.push_str(&part.text);
		}
		out
	}
}

/// A parameter telescope: one or more names sharing an optional type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
	pub names: Vec<NamePart>,
	pub ty: Option<Reference>,
}

/// A declaration as exposed by the syntax layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
	pub id: DefId,
	pub kind: DefKind,
	pub name: NamePart,
	pub alias: Option<NamePart>,
	/// Full extent of the declaration.
	pub span: Span,
	/// Enclosing definition for nested declarations.
	pub parent: Option<DefId>,
	/// Bumped by the host whenever the signature or body changes structurally.
	pub shape: u64,
	/// Declared with infix precedence.
	pub infix: bool,
	pub params: Vec<Param>,
	/// Name occurrences in the signature and body, in source order.
	pub references: Vec<Reference>,
}

impl Declaration {
	/// Top-level declaration with no parameters or references.
	pub fn new(id: DefId, kind: DefKind, name: NamePart, span: Span) -> Self {
		Self {
			id,
			kind,
			name,
			alias: None,
			span,
			parent: None,
			shape: 0,
			infix: false,
			params: Vec::new(),
			references: Vec::new(),
		}
	}

	pub fn with_parent(mut self, parent: DefId) -> Self {
		self.parent = Some(parent);
		self
	}

	pub fn with_alias(mut self, alias: NamePart) -> Self {
		self.alias = Some(alias);
		self
	}

	pub fn with_shape(mut self, shape: u64) -> Self {
		self.shape = shape;
		self
	}

	pub fn infix(mut self) -> Self {
		self.infix = true;
		self
	}

	pub fn with_param(mut self, param: Param) -> Self {
		self.params.push(param);
		self
	}

	pub fn with_reference(mut self, reference: Reference) -> Self {
		self.references.push(reference);
		self
	}
}

/// Immutable, document-ordered view of a file's declarations at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
	file: FileId,
	version: Version,
	decls: Arc<[Declaration]>,
	index: Arc<FxHashMap<DefId, usize>>,
}

impl Snapshot {
	pub fn new(file: FileId, version: Version, decls: impl Into<Arc<[Declaration]>>) -> Self {
		let decls = decls.into();
		let index = decls.iter().enumerate().map(|(pos, decl)| (decl.id, pos)).collect();
		Self {
			file,
			version,
			decls,
			index: Arc::new(index),
		}
	}

	pub fn file(&self) -> FileId {
		self.file
	}

	pub fn version(&self) -> Version {
		self.version
	}

	pub fn declarations(&self) -> &[Declaration] {
		&self.decls
	}

	pub fn get(&self, id: DefId) -> Option<&Declaration> {
		self.index.get(&id).map(|&pos| &self.decls[pos])
	}

	/// Document position of a declaration.
	pub fn position(&self, id: DefId) -> Option<usize> {
		self.index.get(&id).copied()
	}

	pub fn contains(&self, id: DefId) -> bool {
		self.index.contains_key(&id)
	}

	/// Number of typecheckable definitions, nested ones included.
	pub fn definition_count(&self) -> usize {
		self.decls.iter().filter(|decl| decl.kind.is_typecheckable()).count()
	}
}

/// Classification of an edit, supplied by the syntax layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
	/// Only comments or whitespace changed.
	Trivia,
	/// A definition body changed without altering any definition's shape.
	Body { def: Option<DefId> },
	/// A definition was renamed, re-signatured, added or removed.
	Shape { def: Option<DefId> },
}

impl EditKind {
	/// Definition under active edit, if the syntax layer could tell.
	pub fn edited(self) -> Option<DefId> {
		match self {
			Self::Trivia => None,
			Self::Body { def } | Self::Shape { def } => def,
		}
	}

	pub fn changes_shape(self) -> bool {
		matches!(self, Self::Shape { .. })
	}
}
