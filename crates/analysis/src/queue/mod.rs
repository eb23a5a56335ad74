//! Background typechecking, one task in flight per file.
//!
//! A [`TypecheckTask`] carries everything it needs: the resolved definitions
//! and the fast and full evaluation orders computed at one stamp. Tasks run
//! through a [`SingleFlight`] lane keyed by file, so a newer task replaces a
//! pending one and waits behind a running one. Before each group the running
//! task re-checks applicability; a group that passed its checkpoint commits
//! in full.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_primitives::{DefId, FileId, Stamp};
use weft_worker::{FlightJob, LaneSnapshot, SingleFlight, SubmitOutcome};

use crate::diagnostics::{Diagnostic, ErrorAggregator};
use crate::order::{EvaluationOrder, Group};
use crate::reconcile;
use crate::resolve::{Concrete, ResolvedFile};
use crate::staleness::StalenessTracker;

/// Immutable unit of background typechecking work.
#[derive(Debug, Clone)]
pub struct TypecheckTask {
	pub file: FileId,
	pub stamp: Stamp,
	/// Groups of the edited definition, checked first.
	pub fast: EvaluationOrder,
	pub full: EvaluationOrder,
	pub resolved: Arc<ResolvedFile>,
}

impl TypecheckTask {
	/// Fast groups, then full groups.
	pub fn groups(&self) -> impl Iterator<Item = &Group> {
		self.fast.groups.iter().chain(self.full.groups.iter())
	}

	pub fn group_count(&self) -> usize {
		self.fast.len() + self.full.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fast.is_empty() && self.full.is_empty()
	}
}

impl FlightJob for TypecheckTask {
	type Key = FileId;
	type Tag = Stamp;

	fn key(&self) -> FileId {
		self.file
	}

	fn tag(&self) -> Stamp {
		self.stamp
	}
}

/// One group handed to the typechecker.
#[derive(Debug)]
pub struct GroupRequest<'a> {
	pub file: FileId,
	pub group: &'a Group,
	/// Resolved definitions of the group, in document order.
	pub definitions: Vec<Arc<Concrete>>,
	/// Dependencies of the group whose own check failed in this task.
	pub failed_dependencies: BTreeSet<DefId>,
}

/// Result of checking one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOutcome {
	pub diagnostics: Vec<Diagnostic>,
	/// The group did not typecheck; dependents are told but still checked.
	pub failed: bool,
}

impl GroupOutcome {
	pub fn ok() -> Self {
		Self::default()
	}

	pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
		Self { diagnostics, failed: true }
	}
}

/// The type system, as seen by the scheduler.
pub trait Typechecker: Send + Sync {
	fn check_group(&self, request: GroupRequest<'_>) -> GroupOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
	/// Every group committed and the file's typecheck version advanced.
	Applied { groups: usize },
	/// A newer edit arrived mid-task; committed groups stay, the rest is
	/// left to the next task.
	StoppedEarly { committed: usize, skipped: usize },
	/// Stale before the first group; nothing was applied.
	Discarded,
}

impl TaskOutcome {
	pub fn committed(self) -> usize {
		match self {
			Self::Applied { groups } => groups,
			Self::StoppedEarly { committed, .. } => committed,
			Self::Discarded => 0,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
	pub file: FileId,
	pub stamp: Stamp,
	pub outcome: TaskOutcome,
}

/// Shared state a running task reads and commits into.
pub trait TaskContext: Send + Sync {
	fn typechecker(&self) -> &dyn Typechecker;

	/// Tracker of an open file; `None` once the file is closed.
	fn tracker(&self, file: FileId) -> Option<Arc<Mutex<StalenessTracker>>>;

	fn aggregator(&self) -> &ErrorAggregator;

	/// Called once per task after its last commit.
	fn finished(&self, report: TaskReport);
}

/// Runs `task` to completion or to its first stale checkpoint.
pub fn execute(task: &TypecheckTask, ctx: &dyn TaskContext) -> TaskReport {
	let outcome = run_groups(task, ctx);
	match outcome {
		TaskOutcome::Applied { groups } => {
			tracing::debug!(file = %task.file, version = %task.stamp.version, groups, "queue.task.applied");
		}
		TaskOutcome::StoppedEarly { committed, skipped } => {
			tracing::debug!(file = %task.file, version = %task.stamp.version, committed, skipped, "queue.task.stopped_early");
		}
		TaskOutcome::Discarded => {
			tracing::debug!(file = %task.file, version = %task.stamp.version, "queue.task.discarded");
		}
	}
	let report = TaskReport {
		file: task.file,
		stamp: task.stamp,
		outcome,
	};
	ctx.finished(report);
	report
}

fn run_groups(task: &TypecheckTask, ctx: &dyn TaskContext) -> TaskOutcome {
	let version = task.stamp.version;
	let total = task.group_count();
	let mut failed: BTreeSet<DefId> = BTreeSet::new();
	let mut committed = 0;

	for group in task.groups() {
		// Looked up per group: a closed file has no tracker.
		let current = ctx
			.tracker(task.file)
			.filter(|tracker| reconcile::applicable(version, &tracker.lock().state()));
		let Some(tracker) = current else {
			if committed == 0 {
				return TaskOutcome::Discarded;
			}
			return TaskOutcome::StoppedEarly {
				committed,
				skipped: total - committed,
			};
		};

		let definitions: Vec<Arc<Concrete>> = group.defs.iter().filter_map(|def| task.resolved.get(*def).cloned()).collect();
		let failed_dependencies = definitions
			.iter()
			.flat_map(|def| def.deps.iter().copied())
			.filter(|dep| failed.contains(dep))
			.collect();
		let outcome = ctx.typechecker().check_group(GroupRequest {
			file: task.file,
			group,
			definitions,
			failed_dependencies,
		});
		if outcome.failed {
			failed.extend(group.defs.iter().copied());
		}

		let anchored: Vec<(DefId, u32)> = group
			.defs
			.iter()
			.map(|&def| (def, task.resolved.get(def).map_or(0, |concrete| concrete.span.start)))
			.collect();
		ctx.aggregator().replace_definitions(task.file, &anchored, version, outcome.diagnostics);
		tracker.lock().commit_group(&group.defs, version);
		committed += 1;
		tracing::trace!(file = %task.file, %version, defs = group.defs.len(), committed, "queue.group.committed");
	}

	let finished = ctx
		.tracker(task.file)
		.is_some_and(|tracker| tracker.lock().finish_typecheck(task.stamp));
	if finished {
		TaskOutcome::Applied { groups: committed }
	} else if committed == 0 {
		TaskOutcome::Discarded
	} else {
		TaskOutcome::StoppedEarly { committed, skipped: 0 }
	}
}

/// Single-flight-per-file executor of typecheck tasks.
#[derive(Clone)]
pub struct TaskQueue {
	flight: SingleFlight<TypecheckTask>,
}

impl fmt::Debug for TaskQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskQueue").field("flight", &self.flight).finish()
	}
}

impl TaskQueue {
	pub fn new(ctx: Arc<dyn TaskContext>) -> Self {
		let flight = SingleFlight::new("typecheck", move |task: TypecheckTask| {
			execute(&task, ctx.as_ref());
		});
		Self { flight }
	}

	/// Queues a task for background execution.
	pub fn submit(&self, task: TypecheckTask) -> SubmitOutcome<Stamp> {
		self.flight.submit(task)
	}

	/// Runs a task on the calling thread, serialized with the file's
	/// background worker. Returns the stamp of a pending task it dropped.
	pub fn run_inline(&self, task: TypecheckTask) -> Option<Stamp> {
		self.flight.run_inline(task)
	}

	pub fn lane(&self, file: FileId) -> LaneSnapshot<Stamp> {
		self.flight.lane(&file)
	}

	pub fn is_busy(&self, file: FileId) -> bool {
		self.flight.is_busy(&file)
	}

	/// Drops the pending task of a file; a running one finishes on its own.
	pub fn close(&self, file: FileId) -> Option<Stamp> {
		self.flight.close(&file)
	}

	pub async fn wait_idle(&self, file: FileId) {
		self.flight.wait_idle(&file).await;
	}

	pub async fn wait_all_idle(&self) {
		self.flight.wait_all_idle().await;
	}
}
