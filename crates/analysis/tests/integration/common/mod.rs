//! Shared fixtures for scheduler integration tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use parking_lot::Mutex;
use weft_analysis::{
	DefId, DefKind, Declaration, Diagnostic, GroupOutcome, GroupRequest, NamePart, Reference, Span, Typechecker,
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn decl(id: u64, name: &str, at: u32) -> Declaration {
	Declaration::new(
		DefId(id),
		DefKind::Function,
		NamePart::new(name, Span::new(at, at + name.len() as u32)),
		Span::new(at, at + 9),
	)
}

pub fn uses(decl: Declaration, names: &[&str]) -> Declaration {
	let at = decl.span.start + 4;
	names.iter().fold(decl, |decl, name| {
		decl.with_reference(Reference::simple(*name, Span::new(at, at + name.len() as u32)))
	})
}

/// A (no deps), B (uses A), C and D (use each other, C also uses B).
pub fn abcd() -> Vec<Declaration> {
	vec![
		decl(1, "A", 0),
		uses(decl(2, "B", 10), &["A"]),
		uses(decl(3, "C", 20), &["B", "D"]),
		uses(decl(4, "D", 30), &["C"]),
	]
}

/// Blocks the checking thread on a named definition until released.
pub struct Gate {
	pub def: DefId,
	pub entered: Arc<Barrier>,
	pub release: Arc<Barrier>,
}

impl Gate {
	pub fn new(def: DefId) -> Self {
		Self {
			def,
			entered: Arc::new(Barrier::new(2)),
			release: Arc::new(Barrier::new(2)),
		}
	}
}

/// Emits one diagnostic per checked definition, tagged with a generation
/// number so tests can tell runs apart.
#[derive(Default)]
pub struct RecordingChecker {
	pub checked: Mutex<Vec<Vec<DefId>>>,
	pub generation: Mutex<u32>,
	pub gate: Mutex<Option<Gate>>,
	pub failed_inputs: Mutex<Vec<BTreeSet<DefId>>>,
}

impl RecordingChecker {
	pub fn gated(def: DefId) -> (Arc<Self>, Arc<Barrier>, Arc<Barrier>) {
		let gate = Gate::new(def);
		let (entered, release) = (Arc::clone(&gate.entered), Arc::clone(&gate.release));
		let checker = Self {
			gate: Mutex::new(Some(gate)),
			..Self::default()
		};
		(Arc::new(checker), entered, release)
	}

	pub fn checked(&self) -> Vec<Vec<DefId>> {
		self.checked.lock().clone()
	}

	pub fn set_generation(&self, generation: u32) {
		*self.generation.lock() = generation;
	}
}

impl Typechecker for RecordingChecker {
	fn check_group(&self, request: GroupRequest<'_>) -> GroupOutcome {
		let gate = {
			let mut gate = self.gate.lock();
			if gate.as_ref().is_some_and(|gate| request.group.defs.contains(&gate.def)) {
				gate.take()
			} else {
				None
			}
		};
		if let Some(gate) = gate {
			gate.entered.wait();
			gate.release.wait();
		}

		self.checked.lock().push(request.group.defs.clone());
		self.failed_inputs.lock().push(request.failed_dependencies.clone());
		let generation = *self.generation.lock();
		GroupOutcome {
			diagnostics: request
				.definitions
				.iter()
				.map(|def| Diagnostic::typecheck_error(def.id, def.name_span, format!("{} #{generation}", def.name)))
				.collect(),
			failed: false,
		}
	}
}
