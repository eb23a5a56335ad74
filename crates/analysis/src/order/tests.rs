use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use weft_primitives::{DefId, Span};

use super::*;
use crate::snapshot::DefKind;

fn def(id: u64, deps: &[u64]) -> Arc<Concrete> {
	Arc::new(Concrete {
		id: DefId(id),
		kind: DefKind::Function,
		name: format!("d{id}"),
		name_span: Span::new(0, 1),
		alias_span: None,
		span: Span::new(0, 1),
		parent: None,
		shape: 0,
		deps: deps.iter().copied().map(DefId).collect::<BTreeSet<_>>(),
		params: Vec::new(),
		unresolved: 0,
	})
}

fn groups(order: &EvaluationOrder) -> Vec<Vec<u64>> {
	order.groups.iter().map(|g| g.defs.iter().map(|d| d.0).collect()).collect()
}

fn run(defs: &[Arc<Concrete>], edited: Option<u64>) -> (EvaluationOrder, EvaluationOrder) {
	let mut fast = EvaluationOrder::default();
	let mut full = EvaluationOrder::default();
	order_file(defs, &ReferenceDeps, edited.map(DefId), &mut fast, &mut full);
	(fast, full)
}

#[test]
fn dependencies_come_first_and_cycles_share_a_group() {
	// A; B depends on A; C and D are mutually recursive and depend on B.
	let defs = [def(1, &[]), def(2, &[1]), def(3, &[2, 4]), def(4, &[3])];
	let (fast, full) = run(&defs, None);

	assert!(fast.is_empty());
	assert_eq!(groups(&full), vec![vec![1], vec![2], vec![3, 4]]);
	assert_eq!(full.groups.iter().map(|g| g.cyclic).collect::<Vec<_>>(), vec![false, false, true]);
}

#[test]
fn document_order_breaks_ties() {
	let defs = [def(5, &[]), def(3, &[]), def(9, &[3])];
	let (_, full) = run(&defs, None);
	assert_eq!(groups(&full), vec![vec![5], vec![3], vec![9]]);
}

#[test]
fn edited_definition_goes_first_with_its_dependencies() {
	let defs = [def(1, &[]), def(2, &[]), def(3, &[2]), def(4, &[1])];
	let (fast, full) = run(&defs, Some(3));

	assert_eq!(groups(&fast), vec![vec![2], vec![3]]);
	assert_eq!(groups(&full), vec![vec![1], vec![4]]);
}

#[test]
fn edited_marker_outside_the_set_skips_the_fast_pass() {
	let defs = [def(1, &[]), def(2, &[1])];
	let (fast, full) = run(&defs, Some(42));
	assert!(fast.is_empty());
	assert_eq!(groups(&full), vec![vec![1], vec![2]]);
}

#[test]
fn self_reference_is_cyclic_and_outside_edges_are_ignored() {
	struct SelfLoop;
	impl DependencyOracle for SelfLoop {
		fn dependencies(&self, def: &Concrete) -> Vec<DefId> {
			vec![def.id, DefId(99)]
		}
	}
	let defs = [def(1, &[])];
	let mut fast = EvaluationOrder::default();
	let mut full = EvaluationOrder::default();
	order_file(&defs, &SelfLoop, None, &mut fast, &mut full);
	assert_eq!(full.groups, vec![Group {
		defs: vec![DefId(1)],
		cyclic: true,
	}]);
}

fn graph() -> impl Strategy<Value = Vec<Vec<u64>>> {
	(1usize..12).prop_flat_map(|n| proptest::collection::vec(proptest::collection::vec(1..=n as u64, 0..4), n))
}

fn reachable(deps: &[Vec<u64>], from: u64, to: u64) -> bool {
	let mut seen = BTreeSet::new();
	let mut stack = vec![from];
	while let Some(node) = stack.pop() {
		if node == to {
			return true;
		}
		if seen.insert(node) {
			stack.extend(deps[(node - 1) as usize].iter().copied());
		}
	}
	false
}

proptest! {
	#[test]
	fn ordering_law_holds(deps in graph(), edited in proptest::option::of(1u64..12)) {
		let defs: Vec<_> = deps.iter().enumerate().map(|(i, d)| def(i as u64 + 1, d)).collect();
		let (fast, full) = run(&defs, edited);
		let combined: Vec<Group> = fast.groups.iter().chain(full.groups.iter()).cloned().collect();
		let order = EvaluationOrder { groups: combined };

		// Every definition exactly once.
		let mut all: Vec<u64> = order.defs().map(|d| d.0).collect();
		all.sort_unstable();
		prop_assert_eq!(all, (1..=deps.len() as u64).collect::<Vec<_>>());

		for (i, d) in deps.iter().enumerate() {
			let id = i as u64 + 1;
			let at = order.group_of(DefId(id)).unwrap();
			for &dep in d {
				prop_assert!(order.group_of(DefId(dep)).unwrap() <= at);
			}
		}

		for a in 1..=deps.len() as u64 {
			for b in 1..=deps.len() as u64 {
				let same = order.group_of(DefId(a)) == order.group_of(DefId(b));
				let mutual = reachable(&deps, a, b) && reachable(&deps, b, a);
				prop_assert_eq!(same, mutual || a == b);
			}
		}

		if let Some(edited) = edited.filter(|&e| e as usize <= deps.len()) {
			prop_assert!(fast.group_of(DefId(edited)).is_some());
			prop_assert_eq!(fast.groups.last().map(|g| g.defs.contains(&DefId(edited))), Some(true));
		} else {
			prop_assert!(fast.is_empty());
		}
	}

	#[test]
	fn ordering_is_deterministic(deps in graph(), edited in proptest::option::of(1u64..12)) {
		let defs: Vec<_> = deps.iter().enumerate().map(|(i, d)| def(i as u64 + 1, d)).collect();
		prop_assert_eq!(run(&defs, edited), run(&defs, edited));
	}
}
