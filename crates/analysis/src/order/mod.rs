//! Dependency-respecting evaluation order over the definitions of a file.
//!
//! Definitions are grouped into strongly connected components and emitted
//! dependencies first. Document order breaks every tie, so the same input
//! always yields the same order. When a definition is under active edit its
//! component (and whatever it needs) goes to the fast listener first; the
//! rest goes to the full listener.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use weft_primitives::DefId;

use crate::resolve::Concrete;

/// Supplies the dependency edges of a definition.
pub trait DependencyOracle: Send + Sync {
	/// Definitions `def` depends on. Ids outside the ordered set are ignored.
	fn dependencies(&self, def: &Concrete) -> Vec<DefId>;
}

/// Reads dependencies off the resolved references of each definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceDeps;

impl DependencyOracle for ReferenceDeps {
	fn dependencies(&self, def: &Concrete) -> Vec<DefId> {
		def.deps.iter().copied().collect()
	}
}

/// Definitions typechecked as one unit, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
	pub defs: Vec<DefId>,
	/// Mutually recursive, or a definition referring to itself.
	pub cyclic: bool,
}

/// Receives groups in evaluation order.
pub trait OrderingListener {
	fn group(&mut self, group: Group);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationOrder {
	pub groups: Vec<Group>,
}

impl EvaluationOrder {
	pub fn is_empty(&self) -> bool {
		self.groups.is_empty()
	}

	pub fn len(&self) -> usize {
		self.groups.len()
	}

	/// Every definition, group after group.
	pub fn defs(&self) -> impl Iterator<Item = DefId> + '_ {
		self.groups.iter().flat_map(|group| group.defs.iter().copied())
	}

	/// Index of the group containing `def`.
	pub fn group_of(&self, def: DefId) -> Option<usize> {
		self.groups.iter().position(|group| group.defs.contains(&def))
	}
}

impl OrderingListener for EvaluationOrder {
	fn group(&mut self, group: Group) {
		self.groups.push(group);
	}
}

/// Orders `defs` (given in document order).
///
/// With `edited` naming one of `defs`, the edited definition's component and
/// its in-set dependency components go to `fast`; everything else goes to
/// `full`. A definition is emitted exactly once.
pub fn order_file(
	defs: &[Arc<Concrete>],
	oracle: &dyn DependencyOracle,
	edited: Option<DefId>,
	fast: &mut dyn OrderingListener,
	full: &mut dyn OrderingListener,
) {
	let mut orderer = Orderer::new(defs, oracle);
	if let Some(start) = edited.and_then(|def| orderer.index.get(&def).copied()) {
		let comp = orderer.comp_of[start];
		orderer.emit_from(comp, fast);
	}
	for node in 0..orderer.ids.len() {
		let comp = orderer.comp_of[node];
		orderer.emit_from(comp, full);
	}
}

struct Orderer {
	ids: Vec<DefId>,
	index: FxHashMap<DefId, usize>,
	/// Out-edges per node, sorted by document position.
	edges: Vec<Vec<usize>>,
	comp_of: Vec<usize>,
	/// Members per component, in document order.
	comps: Vec<Vec<usize>>,
	/// Component out-edges, sorted by the first member's position.
	comp_edges: Vec<Vec<usize>>,
	seen: Vec<bool>,
}

impl Orderer {
	fn new(defs: &[Arc<Concrete>], oracle: &dyn DependencyOracle) -> Self {
		let ids: Vec<DefId> = defs.iter().map(|def| def.id).collect();
		let index: FxHashMap<DefId, usize> = ids.iter().enumerate().map(|(pos, &id)| (id, pos)).collect();
		let edges: Vec<Vec<usize>> = defs
			.iter()
			.map(|def| {
				let mut out: Vec<usize> = oracle
					.dependencies(def)
					.into_iter()
					.filter_map(|dep| index.get(&dep).copied())
					.collect();
				out.sort_unstable();
				out.dedup();
				out
			})
			.collect();

		let (comp_of, mut comps) = strongly_connected(&edges);
		for members in &mut comps {
			members.sort_unstable();
		}
		let comp_edges = comps
			.iter()
			.enumerate()
			.map(|(comp, members)| {
				let mut out: Vec<usize> = members
					.iter()
					.flat_map(|&node| edges[node].iter().map(|&dep| comp_of[dep]))
					.filter(|&dep| dep != comp)
					.collect();
				out.sort_unstable_by_key(|&dep| comps[dep][0]);
				out.dedup();
				out
			})
			.collect();
		let seen = vec![false; comps.len()];

		Self {
			ids,
			index,
			edges,
			comp_of,
			comps,
			comp_edges,
			seen,
		}
	}

	/// Emits `start` after every component it depends on, skipping anything
	/// emitted before.
	fn emit_from(&mut self, start: usize, listener: &mut dyn OrderingListener) {
		if self.seen[start] {
			return;
		}
		self.seen[start] = true;
		let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
		while let Some(frame) = stack.last_mut() {
			let comp = frame.0;
			if let Some(&dep) = self.comp_edges[comp].get(frame.1) {
				frame.1 += 1;
				if !self.seen[dep] {
					self.seen[dep] = true;
					stack.push((dep, 0));
				}
				continue;
			}
			stack.pop();
			let members = &self.comps[comp];
			let cyclic = members.len() > 1 || self.edges[members[0]].contains(&members[0]);
			listener.group(Group {
				defs: members.iter().map(|&node| self.ids[node]).collect(),
				cyclic,
			});
		}
	}
}

/// Tarjan's algorithm without recursion.
///
/// Returns the component of each node and the members of each component.
fn strongly_connected(edges: &[Vec<usize>]) -> (Vec<usize>, Vec<Vec<usize>>) {
	const UNVISITED: usize = usize::MAX;
	let n = edges.len();
	let mut index = vec![UNVISITED; n];
	let mut low = vec![0; n];
	let mut on_stack = vec![false; n];
	let mut stack = Vec::new();
	let mut comp_of = vec![UNVISITED; n];
	let mut comps: Vec<Vec<usize>> = Vec::new();
	let mut counter = 0;

	for root in 0..n {
		if index[root] != UNVISITED {
			continue;
		}
		index[root] = counter;
		low[root] = counter;
		counter += 1;
		stack.push(root);
		on_stack[root] = true;
		let mut call: Vec<(usize, usize)> = vec![(root, 0)];

		while let Some(frame) = call.last_mut() {
			let v = frame.0;
			if let Some(&w) = edges[v].get(frame.1) {
				frame.1 += 1;
				if index[w] == UNVISITED {
					index[w] = counter;
					low[w] = counter;
					counter += 1;
					stack.push(w);
					on_stack[w] = true;
					call.push((w, 0));
				} else if on_stack[w] {
					low[v] = low[v].min(index[w]);
				}
				continue;
			}

			call.pop();
			if let Some(&(parent, _)) = call.last() {
				low[parent] = low[parent].min(low[v]);
			}
			if low[v] == index[v] {
				let comp = comps.len();
				let mut members = Vec::new();
				while let Some(w) = stack.pop() {
					on_stack[w] = false;
					comp_of[w] = comp;
					members.push(w);
					if w == v {
						break;
					}
				}
				comps.push(members);
			}
		}
	}
	(comp_of, comps)
}

#[cfg(test)]
mod tests;
