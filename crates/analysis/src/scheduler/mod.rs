//! The analysis facade.
//!
//! [`AnalysisScheduler`] owns per-file state and wires the phases together:
//! edits tick the clock, [`request_resolve`](AnalysisScheduler::request_resolve)
//! runs a cancelable resolution pass on the calling thread, and definitions
//! whose resolution changed (plus their dependents) are typechecked by a
//! background task serialized per file.
//!
//! Lock order: the file map, then a file's work state, then its tracker.
//! Running tasks only ever take the tracker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use weft_primitives::{DefId, FileId, Stamp, Version};
use weft_worker::{LaneSnapshot, PassToken, SubmitOutcome};

use crate::clock::{AtomicVersionClock, VersionClock};
use crate::config::SchedulerCfg;
use crate::diagnostics::{Diagnostic, ErrorAggregator, Phase, flatten_for_editor};
use crate::error::{AnalysisError, Result};
use crate::order::{DependencyOracle, EvaluationOrder, ReferenceDeps, order_file};
use crate::queue::{TaskContext, TaskQueue, TaskReport, TypecheckTask, Typechecker};
use crate::reconcile;
use crate::report::{NullReporter, Reporter};
use crate::resolve::annotate::{Annotation, AnnotationPublisher};
use crate::resolve::scope::{EmptyScope, NamingScope};
use crate::resolve::{ResolvedFile, Resolver};
use crate::snapshot::{Declaration, EditKind, Snapshot};
use crate::staleness::{FileState, StalenessTracker};

/// Result of [`AnalysisScheduler::request_resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
	/// Resolution already reflects the newest edit.
	UpToDate,
	/// The pass observed cancellation; the file stays dirty.
	Canceled,
	/// A pass over a newer snapshot finished first; this one was dropped.
	Superseded,
	Resolved {
		stamp: Stamp,
		/// Typecheckable definitions in the file, nested ones included.
		definitions: usize,
		/// Definitions newly awaiting typechecking.
		dirty: usize,
		typecheck: TypecheckPlan,
	},
}

/// What happened to typechecking after a resolve or typecheck request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypecheckPlan {
	/// Nothing awaits typechecking.
	NotNeeded,
	Submitted(SubmitOutcome<Stamp>),
	/// Ran to completion on the calling thread.
	Inline,
	/// A newer edit arrived; the next resolve will submit.
	Stale,
}

struct FileWork {
	snapshot: Snapshot,
	/// Stamp of the edit that produced `snapshot`.
	stamp: Stamp,
	resolved: Option<Arc<ResolvedFile>>,
	/// Stamp the current `resolved` was computed at.
	resolved_stamp: Stamp,
	resolve_token: Option<PassToken>,
	/// A shape edit arrived since the last completed pass; dependents of
	/// changed definitions must be rechecked too.
	shape_edited: bool,
	annotations: Arc<[Annotation]>,
}

struct FileEntry {
	tracker: Arc<Mutex<StalenessTracker>>,
	work: Mutex<FileWork>,
}

struct Shared {
	cfg: SchedulerCfg,
	clock: Arc<dyn VersionClock>,
	files: RwLock<FxHashMap<FileId, Arc<FileEntry>>>,
	aggregator: ErrorAggregator,
	reporter: Arc<dyn Reporter>,
	typechecker: Arc<dyn Typechecker>,
	reports: Mutex<VecDeque<TaskReport>>,
}

impl Shared {
	fn entry(&self, file: FileId) -> Result<Arc<FileEntry>> {
		self.files.read().get(&file).cloned().ok_or(AnalysisError::UnknownFile(file))
	}

	fn should_report_typecheck(&self, tracker: &StalenessTracker) -> bool {
		tracker.state().last_shape_typechecked >= self.clock.now().shape
	}

	/// Pushes typecheck diagnostics to the editor, or only refreshes the
	/// message view when a definition shape changed since they were computed.
	fn refresh_reports(&self, file: FileId) {
		let Ok(entry) = self.entry(file) else {
			return;
		};
		let (report, version) = {
			let tracker = entry.tracker.lock();
			(self.should_report_typecheck(&tracker), tracker.state().last_typechecked)
		};
		if report {
			let diagnostics = flatten_for_editor(&self.aggregator.diagnostics(file, Phase::Typecheck));
			self.reporter.diagnostics(file, Phase::Typecheck, version, diagnostics);
		} else {
			tracing::trace!(%file, "analysis.report.messages_only");
			self.reporter.messages_refreshed(file);
		}
	}
}

impl TaskContext for Shared {
	fn typechecker(&self) -> &dyn Typechecker {
		self.typechecker.as_ref()
	}

	fn tracker(&self, file: FileId) -> Option<Arc<Mutex<StalenessTracker>>> {
		self.files.read().get(&file).map(|entry| Arc::clone(&entry.tracker))
	}

	fn aggregator(&self) -> &ErrorAggregator {
		&self.aggregator
	}

	fn finished(&self, report: TaskReport) {
		{
			let mut reports = self.reports.lock();
			if self.cfg.report_history > 0 {
				while reports.len() >= self.cfg.report_history {
					reports.pop_front();
				}
				reports.push_back(report);
			}
		}
		if report.outcome.committed() == 0 {
			return;
		}
		if self.files.read().contains_key(&report.file) {
			self.refresh_reports(report.file);
		} else {
			// Closed while a group was running; that group still committed.
			self.aggregator.remove_file(report.file);
		}
	}
}

/// Builder for [`AnalysisScheduler`]; every collaborator except the
/// typechecker has a default.
pub struct SchedulerBuilder {
	cfg: SchedulerCfg,
	typechecker: Arc<dyn Typechecker>,
	clock: Arc<dyn VersionClock>,
	scope: Arc<dyn NamingScope>,
	oracle: Arc<dyn DependencyOracle>,
	reporter: Arc<dyn Reporter>,
}

impl SchedulerBuilder {
	pub fn config(mut self, cfg: SchedulerCfg) -> Self {
		self.cfg = cfg;
		self
	}

	pub fn clock(mut self, clock: Arc<dyn VersionClock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn scope(mut self, scope: Arc<dyn NamingScope>) -> Self {
		self.scope = scope;
		self
	}

	pub fn oracle(mut self, oracle: Arc<dyn DependencyOracle>) -> Self {
		self.oracle = oracle;
		self
	}

	pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
		self.reporter = reporter;
		self
	}

	pub fn build(self) -> AnalysisScheduler {
		let shared = Arc::new(Shared {
			cfg: self.cfg,
			clock: self.clock,
			files: RwLock::new(FxHashMap::default()),
			aggregator: ErrorAggregator::new(),
			reporter: self.reporter,
			typechecker: self.typechecker,
			reports: Mutex::new(VecDeque::new()),
		});
		let queue = TaskQueue::new(Arc::clone(&shared) as Arc<dyn TaskContext>);
		AnalysisScheduler {
			shared,
			queue,
			resolver: Resolver::new(self.scope),
			oracle: self.oracle,
		}
	}
}

/// Incremental resolve, order and typecheck scheduler for a set of files.
pub struct AnalysisScheduler {
	shared: Arc<Shared>,
	queue: TaskQueue,
	resolver: Resolver,
	oracle: Arc<dyn DependencyOracle>,
}

impl fmt::Debug for AnalysisScheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnalysisScheduler")
			.field("cfg", &self.shared.cfg)
			.field("clock", &self.shared.clock)
			.field("files", &self.shared.files.read().len())
			.field("queue", &self.queue)
			.finish()
	}
}

impl AnalysisScheduler {
	pub fn builder(typechecker: Arc<dyn Typechecker>) -> SchedulerBuilder {
		SchedulerBuilder {
			cfg: SchedulerCfg::default(),
			typechecker,
			clock: Arc::new(AtomicVersionClock::new()),
			scope: Arc::new(EmptyScope),
			oracle: Arc::new(ReferenceDeps),
			reporter: Arc::new(NullReporter),
		}
	}

	/// Scheduler with default collaborators.
	pub fn new(cfg: SchedulerCfg, typechecker: Arc<dyn Typechecker>) -> Self {
		Self::builder(typechecker).config(cfg).build()
	}

	pub fn config(&self) -> &SchedulerCfg {
		&self.shared.cfg
	}

	pub fn aggregator(&self) -> &ErrorAggregator {
		&self.shared.aggregator
	}

	/// Starts tracking a file. Its first resolve covers every definition.
	pub fn open(&self, file: FileId, decls: impl Into<Arc<[Declaration]>>) -> Result<Stamp> {
		let mut files = self.shared.files.write();
		if files.contains_key(&file) {
			return Err(AnalysisError::AlreadyOpen(file));
		}
		let stamp = self.shared.clock.tick(true);
		let mut tracker = StalenessTracker::new();
		tracker.note_edit(stamp.version, None);
		let entry = FileEntry {
			tracker: Arc::new(Mutex::new(tracker)),
			work: Mutex::new(FileWork {
				snapshot: Snapshot::new(file, stamp.version, decls),
				stamp,
				resolved: None,
				resolved_stamp: Stamp::default(),
				resolve_token: None,
				shape_edited: false,
				annotations: Arc::from([]),
			}),
		};
		files.insert(file, Arc::new(entry));
		tracing::debug!(%file, version = %stamp.version, "analysis.file.opened");
		Ok(stamp)
	}

	/// Stops tracking a file and clears its diagnostics.
	///
	/// A pending task is dropped; a running one stops at its next checkpoint.
	pub fn close(&self, file: FileId) -> Result<()> {
		let entry = self.shared.files.write().remove(&file).ok_or(AnalysisError::UnknownFile(file))?;
		let version = {
			let work = entry.work.lock();
			if let Some(token) = work.resolve_token.as_ref() {
				token.cancel();
			}
			work.stamp.version
		};
		self.queue.close(file);
		self.shared.aggregator.remove_file(file);
		for phase in [Phase::Resolution, Phase::Typecheck] {
			self.shared.reporter.diagnostics(file, phase, version, Vec::new());
		}
		tracing::debug!(%file, "analysis.file.closed");
		Ok(())
	}

	/// Records an edit and installs the new declarations.
	///
	/// Trivia edits on a fully analyzed file fast-forward every phase instead
	/// of invalidating it.
	pub fn note_edit(&self, file: FileId, decls: impl Into<Arc<[Declaration]>>, kind: EditKind) -> Result<Stamp> {
		let entry = self.shared.entry(file)?;
		let mut work = entry.work.lock();
		let stamp = self.shared.clock.tick(kind.changes_shape());
		work.snapshot = Snapshot::new(file, stamp.version, decls);
		work.stamp = stamp;
		work.shape_edited |= kind.changes_shape();

		let forwarded = {
			let mut tracker = entry.tracker.lock();
			if kind == EditKind::Trivia && tracker.fast_forward(stamp.version) {
				true
			} else {
				tracker.note_edit(stamp.version, kind.edited());
				false
			}
		};
		if forwarded {
			tracing::trace!(%file, version = %stamp.version, "analysis.edit.trivia_forwarded");
			return Ok(stamp);
		}

		if self.shared.cfg.cancel_on_edit
			&& let Some(token) = work.resolve_token.as_ref()
		{
			token.cancel();
		}
		tracing::trace!(%file, version = %stamp.version, shape = kind.changes_shape(), "analysis.edit.noted");
		Ok(stamp)
	}

	/// Resolves the newest snapshot if it is not resolved yet, then schedules
	/// typechecking of what changed.
	///
	/// The pass runs on the calling thread without holding file locks, so a
	/// concurrent [`note_edit`](Self::note_edit) can cancel it.
	pub fn request_resolve(&self, file: FileId) -> Result<ResolveOutcome> {
		let entry = self.shared.entry(file)?;
		let (snapshot, stamp, token, shape_edited) = {
			let mut work = entry.work.lock();
			if !entry.tracker.lock().should_resolve() {
				return Ok(ResolveOutcome::UpToDate);
			}
			if let Some(previous) = work.resolve_token.take() {
				previous.cancel();
			}
			let token = PassToken::new(work.stamp.version.0);
			work.resolve_token = Some(token.clone());
			let shape_edited = std::mem::take(&mut work.shape_edited);
			(work.snapshot.clone(), work.stamp, token, shape_edited)
		};

		let mut publisher = AnnotationPublisher::new();
		let mut pass = self.resolver.pass(&snapshot, token);
		let resolved = match ResolvedFile::collect(&mut pass, |event| publisher.observe(event)) {
			Ok(resolved) => Arc::new(resolved),
			Err(_canceled) => {
				entry.work.lock().shape_edited |= shape_edited;
				tracing::debug!(%file, version = %stamp.version, "analysis.resolve.canceled");
				return Ok(ResolveOutcome::Canceled);
			}
		};
		let annotations: Arc<[Annotation]> = publisher.finish().into();

		let (dirty, applicable, moved) = {
			let mut work = entry.work.lock();
			if work.resolved.as_ref().is_some_and(|current| current.version > stamp.version) {
				work.shape_edited |= shape_edited;
				return Ok(ResolveOutcome::Superseded);
			}
			let diff = resolved.diff(work.resolved.as_deref());
			let changed: Vec<DefId> = if shape_edited {
				resolved.with_dependents(diff.changed.iter().copied()).into_iter().collect()
			} else {
				diff.changed.clone()
			};
			let dirty: Vec<DefId> = changed
				.into_iter()
				.filter(|def| resolved.get(*def).is_some_and(|concrete| concrete.kind.is_typecheckable()))
				.collect();
			// Nothing will ever typecheck these again.
			let dropped: Vec<DefId> = diff
				.removed
				.iter()
				.copied()
				.chain(
					resolved
						.definitions()
						.iter()
						.filter(|def| !def.kind.is_typecheckable())
						.map(|def| def.id),
				)
				.collect();

			let applicable = {
				let mut tracker = entry.tracker.lock();
				tracker.forget(&dropped);
				tracker.mark_dirty(dirty.iter().copied(), stamp.version);
				tracker.mark_resolved(stamp.version);
				if !tracker.should_typecheck() {
					tracker.settle(stamp);
				}
				reconcile::applicable(stamp.version, &tracker.state())
			};

			self.shared.aggregator.remove_definitions(file, &dropped);
			let moved = self
				.shared
				.aggregator
				.place_definitions(file, resolved.definitions().iter().map(|def| (def.id, def.span.start)));
			self.shared
				.aggregator
				.replace(file, Phase::Resolution, stamp.version, resolved.diagnostics().to_vec());
			work.resolved = Some(Arc::clone(&resolved));
			work.resolved_stamp = stamp;
			work.annotations = Arc::clone(&annotations);
			if work.resolve_token.as_ref().is_some_and(|current| current.generation() == stamp.version.0) {
				work.resolve_token = None;
			}
			(dirty.len(), applicable, moved)
		};

		self.shared
			.reporter
			.diagnostics(file, Phase::Resolution, stamp.version, resolved.diagnostics().to_vec());
		self.shared.reporter.annotations(file, stamp.version, annotations.to_vec());
		tracing::debug!(
			%file,
			version = %stamp.version,
			definitions = resolved.definition_count(),
			dirty,
			"analysis.resolve.done"
		);

		let typecheck = if applicable {
			self.schedule_typecheck(file, &entry, stamp, &resolved)
		} else {
			TypecheckPlan::Stale
		};
		// Kept diagnostics now report at new offsets; an inline run already
		// refreshed them.
		if moved && typecheck != TypecheckPlan::Inline {
			self.shared.refresh_reports(file);
		}
		Ok(ResolveOutcome::Resolved {
			stamp,
			definitions: resolved.definition_count(),
			dirty,
			typecheck,
		})
	}

	/// Schedules typechecking of the definitions still awaiting it.
	///
	/// Returns `None` while the file needs resolving first. Submitting again
	/// for the same stamp is a no-op.
	pub fn request_typecheck(&self, file: FileId) -> Result<Option<TypecheckPlan>> {
		let entry = self.shared.entry(file)?;
		let (resolved, stamp) = {
			let work = entry.work.lock();
			let tracker = entry.tracker.lock();
			if tracker.should_resolve() {
				return Ok(None);
			}
			if !tracker.should_typecheck() {
				return Ok(Some(TypecheckPlan::NotNeeded));
			}
			let Some(resolved) = work.resolved.clone() else {
				return Ok(None);
			};
			(resolved, work.resolved_stamp)
		};
		Ok(Some(self.schedule_typecheck(file, &entry, stamp, &resolved)))
	}

	fn schedule_typecheck(&self, file: FileId, entry: &FileEntry, stamp: Stamp, resolved: &Arc<ResolvedFile>) -> TypecheckPlan {
		let (awaiting, edited) = {
			let tracker = entry.tracker.lock();
			if !reconcile::applicable(stamp.version, &tracker.state()) {
				return TypecheckPlan::Stale;
			}
			if !tracker.should_typecheck() {
				return TypecheckPlan::NotNeeded;
			}
			(tracker.awaiting().collect::<Vec<_>>(), tracker.state().last_edited)
		};

		let defs: Vec<_> = resolved
			.typecheckable()
			.filter(|def| awaiting.binary_search(&def.id).is_ok())
			.cloned()
			.collect();
		let mut fast = EvaluationOrder::default();
		let mut full = EvaluationOrder::default();
		let edited = if self.shared.cfg.fast_path { edited } else { None };
		order_file(&defs, self.oracle.as_ref(), edited, &mut fast, &mut full);

		let task = TypecheckTask {
			file,
			stamp,
			fast,
			full,
			resolved: Arc::clone(resolved),
		};
		tracing::debug!(
			%file,
			version = %stamp.version,
			fast = task.fast.len(),
			full = task.full.len(),
			inline = self.shared.cfg.inline_typecheck,
			"analysis.typecheck.scheduled"
		);
		if self.shared.cfg.inline_typecheck {
			self.queue.run_inline(task);
			TypecheckPlan::Inline
		} else {
			TypecheckPlan::Submitted(self.queue.submit(task))
		}
	}

	/// Diagnostics of one phase, ordered by position.
	pub fn diagnostics(&self, file: FileId, phase: Phase) -> Vec<Diagnostic> {
		self.shared.aggregator.diagnostics(file, phase)
	}

	/// Both phases merged for display, goals expanded.
	pub fn editor_diagnostics(&self, file: FileId) -> Vec<Diagnostic> {
		let mut out = self.shared.aggregator.diagnostics(file, Phase::Resolution);
		out.extend(flatten_for_editor(&self.shared.aggregator.diagnostics(file, Phase::Typecheck)));
		out.sort_by_key(|diagnostic| (diagnostic.span.start, diagnostic.span.end));
		out
	}

	/// Annotations of the last completed resolution pass.
	pub fn annotations(&self, file: FileId) -> Result<Arc<[Annotation]>> {
		Ok(Arc::clone(&self.shared.entry(file)?.work.lock().annotations))
	}

	pub fn file_state(&self, file: FileId) -> Result<FileState> {
		Ok(self.shared.entry(file)?.tracker.lock().state())
	}

	/// Newest snapshot installed for a file.
	pub fn snapshot(&self, file: FileId) -> Result<Snapshot> {
		Ok(self.shared.entry(file)?.work.lock().snapshot.clone())
	}

	/// Whether typecheck diagnostics of `file` may be pushed to the editor.
	///
	/// False while any definition shape changed after the last applied
	/// typecheck of the file; the shape clock is shared by all files.
	pub fn should_report_typecheck(&self, file: FileId) -> Result<bool> {
		let entry = self.shared.entry(file)?;
		let tracker = entry.tracker.lock();
		Ok(self.shared.should_report_typecheck(&tracker))
	}

	/// Re-sends the typecheck diagnostics of a file through the reporter,
	/// subject to the same gating as finished tasks.
	pub fn refresh_reports(&self, file: FileId) -> Result<()> {
		self.shared.entry(file)?;
		self.shared.refresh_reports(file);
		Ok(())
	}

	pub fn task_lane(&self, file: FileId) -> LaneSnapshot<Stamp> {
		self.queue.lane(file)
	}

	/// Reports of recently finished tasks, oldest first.
	pub fn task_reports(&self) -> Vec<TaskReport> {
		self.shared.reports.lock().iter().copied().collect()
	}

	/// Last applied typecheck version of a file.
	pub fn typechecked_version(&self, file: FileId) -> Result<Version> {
		Ok(self.file_state(file)?.last_typechecked)
	}

	/// Waits until the file has no pending or running typecheck task.
	pub async fn wait_idle(&self, file: FileId) {
		self.queue.wait_idle(file).await;
	}

	pub async fn wait_all_idle(&self) {
		self.queue.wait_all_idle().await;
	}
}
