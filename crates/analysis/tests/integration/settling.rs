use std::sync::{Arc, Barrier};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use weft_analysis::{
	AnalysisScheduler, DefId, DefKind, EditKind, FileId, NamingScope, Phase, Referable, ResolveOutcome, SchedulerCfg,
	SubmitOutcome, TaskOutcome, TypecheckPlan, Typechecker, Version,
};

use crate::common::{RecordingChecker, TIMEOUT, abcd, decl, init_tracing, uses};

fn shifted(base: u64) -> Vec<weft_analysis::Declaration> {
	abcd()
		.into_iter()
		.map(|mut decl| {
			decl.id = DefId(decl.id.0 + base);
			decl
		})
		.collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn many_files_settle_independently() {
	init_tracing();
	let checker = Arc::new(RecordingChecker::default());
	let sched = AnalysisScheduler::new(SchedulerCfg::default(), Arc::clone(&checker) as Arc<dyn Typechecker>);

	for file in 1..=4 {
		sched.open(FileId(file), shifted(file * 100)).unwrap();
	}
	for file in 1..=4 {
		sched.request_resolve(FileId(file)).unwrap();
	}
	tokio::time::timeout(TIMEOUT, sched.wait_all_idle()).await.unwrap();

	for file in 1..=4 {
		let state = sched.file_state(FileId(file)).unwrap();
		assert_eq!(state.last_typechecked, state.last_seen, "file {file}");
		assert_eq!(sched.request_typecheck(FileId(file)).unwrap(), Some(TypecheckPlan::NotNeeded));
	}
	assert_eq!(checker.checked().len(), 12);
	assert!(sched.task_reports().iter().all(|r| r.outcome == TaskOutcome::Applied { groups: 3 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_typecheck_requests_are_idempotent() {
	init_tracing();
	let (checker, entered, release) = RecordingChecker::gated(DefId(1));
	let sched = AnalysisScheduler::new(SchedulerCfg::default(), Arc::clone(&checker) as Arc<dyn Typechecker>);
	let file = FileId(1);
	sched.open(file, abcd()).unwrap();
	sched.request_resolve(file).unwrap();

	tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();
	for _ in 0..3 {
		assert_eq!(
			sched.request_typecheck(file).unwrap(),
			Some(TypecheckPlan::Submitted(SubmitOutcome::Deduplicated))
		);
	}
	tokio::task::spawn_blocking(move || release.wait()).await.unwrap();
	tokio::time::timeout(TIMEOUT, sched.wait_idle(file)).await.unwrap();

	assert_eq!(sched.request_typecheck(file).unwrap(), Some(TypecheckPlan::NotNeeded));
	assert_eq!(checker.checked().len(), 3);
	assert_eq!(sched.task_reports().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_a_file_stops_its_running_task() {
	init_tracing();
	let (checker, entered, release) = RecordingChecker::gated(DefId(1));
	let sched = AnalysisScheduler::new(SchedulerCfg::default(), Arc::clone(&checker) as Arc<dyn Typechecker>);
	let file = FileId(1);
	sched.open(file, abcd()).unwrap();
	sched.request_resolve(file).unwrap();
	tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();

	sched.close(file).unwrap();
	tokio::task::spawn_blocking(move || release.wait()).await.unwrap();
	tokio::time::timeout(TIMEOUT, sched.wait_idle(file)).await.unwrap();

	assert_eq!(checker.checked(), vec![vec![DefId(1)]]);
	let reports = sched.task_reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].outcome, TaskOutcome::StoppedEarly { committed: 1, skipped: 2 });
	assert!(sched.diagnostics(file, Phase::Typecheck).is_empty());
	assert_eq!(sched.aggregator().error_count(file), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn awaiting_definition_that_becomes_a_module_is_forgotten() {
	init_tracing();
	let (checker, entered, release) = RecordingChecker::gated(DefId(1));
	let sched = AnalysisScheduler::new(SchedulerCfg::default(), Arc::clone(&checker) as Arc<dyn Typechecker>);
	let file = FileId(1);
	sched.open(file, vec![decl(1, "Y", 0), decl(2, "X", 10)]).unwrap();
	sched.request_resolve(file).unwrap();
	tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();

	let mut module = decl(2, "X", 10);
	module.kind = DefKind::Module;
	let v2 = sched
		.note_edit(file, vec![decl(1, "Y", 0), module], EditKind::Shape { def: Some(DefId(2)) })
		.unwrap();
	tokio::task::spawn_blocking(move || release.wait()).await.unwrap();
	tokio::time::timeout(TIMEOUT, sched.wait_idle(file)).await.unwrap();
	assert_eq!(sched.task_reports()[0].outcome, TaskOutcome::StoppedEarly { committed: 1, skipped: 1 });

	let outcome = sched.request_resolve(file).unwrap();
	assert!(
		matches!(outcome, ResolveOutcome::Resolved { dirty: 0, typecheck: TypecheckPlan::NotNeeded, .. }),
		"{outcome:?}"
	);
	let state = sched.file_state(file).unwrap();
	assert_eq!((state.last_typechecked, state.last_seen), (v2.version, v2.version));
	for _ in 0..3 {
		assert_eq!(sched.request_typecheck(file).unwrap(), Some(TypecheckPlan::NotNeeded));
	}
	assert_eq!(sched.task_reports().len(), 1);
	assert_eq!(checker.checked(), vec![vec![DefId(1)]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_task_is_superseded_before_it_starts() {
	init_tracing();
	let (checker, entered, release) = RecordingChecker::gated(DefId(1));
	let sched = AnalysisScheduler::new(SchedulerCfg::default(), Arc::clone(&checker) as Arc<dyn Typechecker>);
	let file = FileId(1);
	let v1 = sched.open(file, abcd()).unwrap();
	sched.request_resolve(file).unwrap();
	tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();

	let v2 = sched.note_edit(file, abcd(), EditKind::Body { def: None }).unwrap();
	let queued = sched.request_resolve(file).unwrap();
	assert!(matches!(queued, ResolveOutcome::Resolved { typecheck: TypecheckPlan::Submitted(SubmitOutcome::Queued), .. }));
	assert_eq!(sched.task_lane(file).queued, Some(v2));

	let v3 = sched.note_edit(file, abcd(), EditKind::Body { def: None }).unwrap();
	let replaced = sched.request_resolve(file).unwrap();
	assert!(matches!(
		replaced,
		ResolveOutcome::Resolved { typecheck: TypecheckPlan::Submitted(SubmitOutcome::Replaced { superseded }), .. } if superseded == v2
	));

	tokio::task::spawn_blocking(move || release.wait()).await.unwrap();
	tokio::time::timeout(TIMEOUT, sched.wait_idle(file)).await.unwrap();

	let stamps: Vec<_> = sched.task_reports().iter().map(|r| (r.stamp, r.outcome)).collect();
	assert_eq!(stamps, vec![
		(v1, TaskOutcome::StoppedEarly { committed: 1, skipped: 2 }),
		(v3, TaskOutcome::Applied { groups: 3 }),
	]);
	assert_eq!(sched.typechecked_version(file).unwrap(), v3.version);
}

/// Blocks the first lookup of `slow` until released.
struct SlowScope {
	gate: Mutex<Option<(Arc<Barrier>, Arc<Barrier>)>>,
}

impl NamingScope for SlowScope {
	fn resolve(&self, _qualifier: Option<&Referable>, name: &str) -> Option<Referable> {
		if name != "slow" {
			return None;
		}
		let gate = self.gate.lock().take();
		if let Some((entered, release)) = gate {
			entered.wait();
			release.wait();
		}
		Some(Referable::external("slow", "Lib.slow", DefKind::Function))
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn canceled_resolve_leaves_the_file_dirty() {
	init_tracing();
	let entered = Arc::new(Barrier::new(2));
	let release = Arc::new(Barrier::new(2));
	let scope = SlowScope {
		gate: Mutex::new(Some((Arc::clone(&entered), Arc::clone(&release)))),
	};
	let cfg = SchedulerCfg {
		inline_typecheck: true,
		..SchedulerCfg::default()
	};
	let sched = Arc::new(
		AnalysisScheduler::builder(Arc::new(RecordingChecker::default()))
			.config(cfg)
			.scope(Arc::new(scope))
			.build(),
	);
	let file = FileId(1);
	let decls = vec![uses(decl(1, "f", 0), &["slow"]), decl(2, "g", 10)];
	sched.open(file, decls.clone()).unwrap();

	let resolving = {
		let sched = Arc::clone(&sched);
		tokio::task::spawn_blocking(move || sched.request_resolve(file))
	};
	tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();
	let latest = sched.note_edit(file, decls, EditKind::Body { def: Some(DefId(2)) }).unwrap();
	tokio::task::spawn_blocking(move || release.wait()).await.unwrap();

	assert_eq!(resolving.await.unwrap().unwrap(), ResolveOutcome::Canceled);
	let state = sched.file_state(file).unwrap();
	assert_eq!(state.last_resolved, Version::ZERO);
	assert!(sched.annotations(file).unwrap().is_empty());

	let outcome = sched.request_resolve(file).unwrap();
	assert!(matches!(outcome, ResolveOutcome::Resolved { stamp, .. } if stamp == latest));
	let state = sched.file_state(file).unwrap();
	assert_eq!(state.last_resolved, state.last_seen);
	assert_eq!(state.last_typechecked, state.last_seen);
}
