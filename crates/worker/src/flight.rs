use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;

use crate::pool::run_lane_worker;

/// A unit of work executed through a [`SingleFlight`] lane.
pub trait FlightJob: Send + 'static {
	/// Lane key; at most one job per key runs at a time.
	type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;
	/// Identity of the work, used for deduplication and observation.
	type Tag: Eq + Clone + fmt::Debug + Send + Sync + 'static;

	fn key(&self) -> Self::Key;
	fn tag(&self) -> Self::Tag;
}

/// Outcome from submitting a job to a lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome<T> {
	/// The lane was idle; a worker was started and the job is queued for it.
	Started,
	/// The job is held behind the running job.
	Queued,
	/// The job replaced a pending job that never started.
	Replaced { superseded: T },
	/// An identical job is already pending, or running with nothing pending.
	Deduplicated,
}

/// Point-in-time view of one lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneSnapshot<T> {
	pub queued: Option<T>,
	pub running: Option<T>,
	pub busy: bool,
}

struct Lane<J: FlightJob> {
	queued: Option<J>,
	running: Option<J::Tag>,
	worker_active: bool,
	inline_runs: usize,
	retired: bool,
	/// Held for the whole execution of a job, background or inline.
	flight: Arc<Mutex<()>>,
}

impl<J: FlightJob> Lane<J> {
	fn new() -> Self {
		Self {
			queued: None,
			running: None,
			worker_active: false,
			inline_runs: 0,
			retired: false,
			flight: Arc::new(Mutex::new(())),
		}
	}

	fn busy(&self) -> bool {
		self.worker_active || self.inline_runs > 0
	}
}

type Handler<J> = dyn Fn(J) + Send + Sync;

struct Inner<J: FlightJob> {
	name: &'static str,
	lanes: Mutex<FxHashMap<J::Key, Lane<J>>>,
	idle: Notify,
	handler: Arc<Handler<J>>,
}

/// Keyed single-flight executor.
///
/// Per key: at most one job running and at most one job pending. A newer
/// submission replaces the pending job (latest wins) but never preempts the
/// running one. Jobs run on the blocking pool of the worker runtime; inline
/// runs share the same per-key flight lock so execution stays serialized.
pub struct SingleFlight<J: FlightJob> {
	inner: Arc<Inner<J>>,
}

impl<J: FlightJob> Clone for SingleFlight<J> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<J: FlightJob> fmt::Debug for SingleFlight<J> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SingleFlight")
			.field("name", &self.inner.name)
			.field("lanes", &self.inner.lanes.lock().len())
			.finish()
	}
}

impl<J: FlightJob> SingleFlight<J> {
	/// Creates an executor running every job through `handler`.
	pub fn new(name: &'static str, handler: impl Fn(J) + Send + Sync + 'static) -> Self {
		Self {
			inner: Arc::new(Inner {
				name,
				lanes: Mutex::new(FxHashMap::default()),
				idle: Notify::new(),
				handler: Arc::new(handler),
			}),
		}
	}

	/// Submits a job for background execution.
	pub fn submit(&self, job: J) -> SubmitOutcome<J::Tag> {
		let key = job.key();
		let tag = job.tag();
		let mut lanes = self.inner.lanes.lock();
		let lane = lanes.entry(key.clone()).or_insert_with(Lane::new);
		lane.retired = false;

		if let Some(queued) = lane.queued.as_ref() {
			if queued.tag() == tag {
				tracing::trace!(lane = self.inner.name, ?key, ?tag, "flight.submit.dedup_queued");
				return SubmitOutcome::Deduplicated;
			}
			let superseded = queued.tag();
			lane.queued = Some(job);
			tracing::debug!(lane = self.inner.name, ?key, ?tag, ?superseded, "flight.submit.superseded");
			return SubmitOutcome::Replaced { superseded };
		}

		if lane.running.as_ref() == Some(&tag) {
			tracing::trace!(lane = self.inner.name, ?key, ?tag, "flight.submit.dedup_running");
			return SubmitOutcome::Deduplicated;
		}

		lane.queued = Some(job);
		if lane.worker_active {
			tracing::trace!(lane = self.inner.name, ?key, ?tag, "flight.submit.queued");
			return SubmitOutcome::Queued;
		}

		lane.worker_active = true;
		drop(lanes);
		let inner = Arc::clone(&self.inner);
		let worker_key = key.clone();
		run_lane_worker(self.inner.name, move || drain_lane(inner, worker_key));
		tracing::trace!(lane = self.inner.name, ?key, ?tag, "flight.submit.started");
		SubmitOutcome::Started
	}

	/// Runs a job on the calling thread as if it were dequeued immediately.
	///
	/// Waits for a running job of the same key to finish first. A pending job
	/// is dropped and its tag returned.
	pub fn run_inline(&self, job: J) -> Option<J::Tag> {
		let key = job.key();
		let (superseded, flight) = {
			let mut lanes = self.inner.lanes.lock();
			let lane = lanes.entry(key.clone()).or_insert_with(Lane::new);
			lane.retired = false;
			lane.inline_runs += 1;
			(lane.queued.take().map(|queued| queued.tag()), Arc::clone(&lane.flight))
		};
		if let Some(tag) = superseded.as_ref() {
			tracing::debug!(lane = self.inner.name, ?key, superseded = ?tag, "flight.inline.superseded");
		}

		{
			let _guard = flight.lock();
			run_guarded(&self.inner, job);
		}

		let mut lanes = self.inner.lanes.lock();
		if let Some(lane) = lanes.get_mut(&key) {
			lane.inline_runs = lane.inline_runs.saturating_sub(1);
			if !lane.busy() {
				if lane.retired {
					lanes.remove(&key);
				}
				drop(lanes);
				self.inner.idle.notify_waiters();
			}
		}
		superseded
	}

	/// Drops the pending job of a lane and forgets the lane once idle.
	///
	/// A running job is left to finish.
	pub fn close(&self, key: &J::Key) -> Option<J::Tag> {
		let mut lanes = self.inner.lanes.lock();
		let lane = lanes.get_mut(key)?;
		let dropped = lane.queued.take().map(|job| job.tag());
		if lane.busy() {
			lane.retired = true;
		} else {
			lanes.remove(key);
		}
		dropped
	}

	/// Returns a snapshot of one lane.
	pub fn lane(&self, key: &J::Key) -> LaneSnapshot<J::Tag> {
		let lanes = self.inner.lanes.lock();
		match lanes.get(key) {
			Some(lane) => LaneSnapshot {
				queued: lane.queued.as_ref().map(|job| job.tag()),
				running: lane.running.clone(),
				busy: lane.busy(),
			},
			None => LaneSnapshot {
				queued: None,
				running: None,
				busy: false,
			},
		}
	}

	/// Returns true if the lane has pending or running work.
	pub fn is_busy(&self, key: &J::Key) -> bool {
		self.inner.lanes.lock().get(key).is_some_and(Lane::busy)
	}

	/// Waits until the lane has neither pending nor running work.
	pub async fn wait_idle(&self, key: &J::Key) {
		loop {
			// Register before checking to avoid a lost wakeup.
			let notified = self.inner.idle.notified();
			if !self.is_busy(key) {
				return;
			}
			notified.await;
		}
	}

	/// Waits until every lane is idle.
	pub async fn wait_all_idle(&self) {
		loop {
			let notified = self.inner.idle.notified();
			if !self.inner.lanes.lock().values().any(Lane::busy) {
				return;
			}
			notified.await;
		}
	}
}

fn drain_lane<J: FlightJob>(inner: Arc<Inner<J>>, key: J::Key) {
	loop {
		let (job, flight) = {
			let mut lanes = inner.lanes.lock();
			let Some(lane) = lanes.get_mut(&key) else {
				drop(lanes);
				inner.idle.notify_waiters();
				return;
			};
			match lane.queued.take() {
				Some(job) => {
					lane.running = Some(job.tag());
					(job, Arc::clone(&lane.flight))
				}
				None => {
					lane.running = None;
					lane.worker_active = false;
					if lane.retired && !lane.busy() {
						lanes.remove(&key);
					}
					drop(lanes);
					inner.idle.notify_waiters();
					return;
				}
			}
		};

		let _guard = flight.lock();
		run_guarded(&inner, job);
	}
}

fn run_guarded<J: FlightJob>(inner: &Inner<J>, job: J) {
	let key = job.key();
	let tag = job.tag();
	tracing::trace!(lane = inner.name, ?key, ?tag, "flight.run.begin");
	let handler = Arc::clone(&inner.handler);
	if let Err(payload) = catch_unwind(AssertUnwindSafe(move || handler(job))) {
		tracing::error!(
			lane = inner.name,
			?key,
			?tag,
			panic = panic_message(payload.as_ref()).unwrap_or("<non-string payload>"),
			"flight.run.panicked"
		);
		return;
	}
	tracing::trace!(lane = inner.name, ?key, ?tag, "flight.run.end");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<&str> {
	payload
		.downcast_ref::<&'static str>()
		.copied()
		.or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}
