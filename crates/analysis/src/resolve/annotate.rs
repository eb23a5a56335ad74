//! Highlight annotations derived from resolution events.

use weft_primitives::Span;

use super::{Concrete, ResolveEvent, ResolvedReference};
use crate::snapshot::DefKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationKind {
	/// Name or alias of a definition of this file.
	Declaration,
	/// Referent declared infix.
	Operator,
	/// Referent carrying a meta resolver.
	MetaResolved,
	/// Qualifier parts of a long name.
	LongNamePrefix,
	/// Parameter whose type is a (non-record) class.
	ClassParameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Annotation {
	pub span: Span,
	pub kind: AnnotationKind,
}

/// Accumulates annotations while a pass is drained.
#[derive(Debug, Default)]
pub struct AnnotationPublisher {
	annotations: Vec<Annotation>,
}

impl AnnotationPublisher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn observe(&mut self, event: &ResolveEvent) {
		match event {
			ResolveEvent::Reference(reference) => self.reference(reference),
			ResolveEvent::Definition(concrete) => self.definition(concrete),
			ResolveEvent::Diagnostic(_) => {}
		}
	}

	/// Annotations in source order.
	pub fn finish(mut self) -> Vec<Annotation> {
		self.annotations.sort_by_key(|ann| (ann.span.start, ann.span.end, ann.kind));
		self.annotations.dedup();
		self.annotations
	}

	fn push(&mut self, span: Span, kind: AnnotationKind) {
		self.annotations.push(Annotation { span, kind });
	}

	fn reference(&mut self, reference: &ResolvedReference) {
		let parts = &reference.reference.parts;
		if let (Some(target), Some(last)) = (reference.target(), parts.last()) {
			if target.meta_resolver {
				self.push(last.span, AnnotationKind::MetaResolved);
			} else if target.infix {
				self.push(last.span, AnnotationKind::Operator);
			}
		}

		if parts.len() > 1 {
			let end = reference.first_unresolved().unwrap_or(parts.len() - 1);
			if end > 0 {
				self.push(parts[0].span.cover(parts[end - 1].span), AnnotationKind::LongNamePrefix);
			}
		}
	}

	fn definition(&mut self, concrete: &Concrete) {
		self.push(concrete.name_span, AnnotationKind::Declaration);
		if let Some(alias) = concrete.alias_span {
			self.push(alias, AnnotationKind::Declaration);
		}
		for param in &concrete.params {
			if param.ty.as_ref().is_some_and(|ty| ty.kind == DefKind::Class) {
				for name in &param.names {
					self.push(name.span, AnnotationKind::ClassParameter);
				}
			}
		}
	}
}
