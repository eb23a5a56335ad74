//! Worker runtime primitives shared by the analysis scheduler.
//!
//! * [`PassToken`] is a generation-scoped cooperative cancellation token.
//! * [`SingleFlight`] runs at most one job per key at a time, holding at most
//!   one pending job per key with latest-wins replacement. Lane workers run
//!   on the blocking pool of the ambient Tokio runtime, falling back to a
//!   small process-wide runtime.

mod flight;
mod pool;
mod token;

pub use flight::{FlightJob, LaneSnapshot, SingleFlight, SubmitOutcome};
pub use token::PassToken;
