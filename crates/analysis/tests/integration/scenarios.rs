use std::sync::Arc;

use pretty_assertions::assert_eq;
use weft_analysis::{
	AnalysisScheduler, AtomicVersionClock, DefId, EditKind, FileId, Phase, ResolveOutcome, SchedulerCfg, Stamp, TaskOutcome,
	SubmitOutcome, TaskReport, TypecheckPlan, Typechecker, Version,
};

use crate::common::{RecordingChecker, TIMEOUT, abcd, init_tracing};

const FILE: FileId = FileId(1);

fn messages(sched: &AnalysisScheduler, def: u64) -> Vec<String> {
	sched
		.aggregator()
		.definition_diagnostics(FILE, DefId(def))
		.into_iter()
		.map(|d| d.message)
		.collect()
}

#[test]
fn editing_b_replaces_only_b_diagnostics() {
	init_tracing();
	let checker = Arc::new(RecordingChecker::default());
	let cfg = SchedulerCfg {
		inline_typecheck: true,
		..SchedulerCfg::default()
	};
	let sched = AnalysisScheduler::new(cfg, Arc::clone(&checker) as Arc<dyn Typechecker>);
	sched.open(FILE, abcd()).unwrap();
	sched.request_resolve(FILE).unwrap();

	assert_eq!(checker.checked(), vec![vec![DefId(1)], vec![DefId(2)], vec![DefId(3), DefId(4)]]);
	assert_eq!(sched.diagnostics(FILE, Phase::Typecheck).len(), 4);

	checker.set_generation(1);
	let mut edited = abcd();
	edited[1] = edited[1].clone().with_shape(1);
	sched.note_edit(FILE, edited, EditKind::Body { def: Some(DefId(2)) }).unwrap();
	sched.request_resolve(FILE).unwrap();

	assert_eq!(messages(&sched, 1), vec!["A #0"]);
	assert_eq!(messages(&sched, 2), vec!["B #1"]);
	assert_eq!(messages(&sched, 3), vec!["C #0"]);
	assert_eq!(messages(&sched, 4), vec!["D #0"]);
	let state = sched.file_state(FILE).unwrap();
	assert_eq!(state.last_typechecked, state.last_seen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_edit_stops_the_running_task_after_its_group() {
	init_tracing();
	let (checker, entered, release) = RecordingChecker::gated(DefId(1));
	let sched = AnalysisScheduler::builder(Arc::clone(&checker) as Arc<dyn Typechecker>)
		.clock(Arc::new(AtomicVersionClock::starting_at(Stamp::new(Version(4), Version(0)))))
		.build();

	let v5 = sched.open(FILE, abcd()).unwrap();
	assert_eq!(v5.version, Version(5));
	let outcome = sched.request_resolve(FILE).unwrap();
	assert!(matches!(
		outcome,
		ResolveOutcome::Resolved {
			typecheck: TypecheckPlan::Submitted(SubmitOutcome::Started),
			..
		}
	));

	// Group 1 is being checked; the edit lands before it finishes.
	tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();
	let mut edited = abcd();
	edited[2] = edited[2].clone().with_shape(1);
	let v6 = sched.note_edit(FILE, edited, EditKind::Body { def: Some(DefId(3)) }).unwrap();
	assert_eq!(v6.version, Version(6));
	tokio::task::spawn_blocking(move || release.wait()).await.unwrap();
	tokio::time::timeout(TIMEOUT, sched.wait_idle(FILE)).await.unwrap();

	assert_eq!(sched.task_reports(), vec![TaskReport {
		file: FILE,
		stamp: v5,
		outcome: TaskOutcome::StoppedEarly { committed: 1, skipped: 2 },
	}]);
	assert_eq!(sched.aggregator().definition_version(FILE, DefId(1)), Some(Version(5)));
	assert_eq!(sched.aggregator().definition_version(FILE, DefId(2)), None);
	let state = sched.file_state(FILE).unwrap();
	assert_eq!(state.last_seen, Version(6));
	assert_eq!(state.last_typechecked, Version::ZERO);

	// The next resolve submits a task for version 6 covering what is left.
	let outcome = sched.request_resolve(FILE).unwrap();
	assert!(matches!(outcome, ResolveOutcome::Resolved { stamp, .. } if stamp == v6));
	tokio::time::timeout(TIMEOUT, sched.wait_idle(FILE)).await.unwrap();

	assert_eq!(sched.task_reports()[1].outcome, TaskOutcome::Applied { groups: 2 });
	assert_eq!(checker.checked(), vec![vec![DefId(1)], vec![DefId(2)], vec![DefId(3), DefId(4)]]);
	assert_eq!(sched.typechecked_version(FILE).unwrap(), Version(6));
	assert_eq!(sched.aggregator().definition_version(FILE, DefId(4)), Some(Version(6)));
}
