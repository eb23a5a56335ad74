//! Incremental semantic-analysis scheduler.
//!
//! Keeps name resolution and typechecking results of a source file consistent
//! with live edits:
//!
//! * [`clock`]: injectable version clocks stamping every edit.
//! * [`staleness`]: per-file phase versions and the definitions awaiting typechecking.
//! * [`resolve`]: document-order resolution producing a lazy event sequence.
//! * [`order`]: SCC-aware evaluation order with a fast path for the edited definition.
//! * [`queue`]: single-flight background typechecking per file.
//! * [`diagnostics`]: per-phase diagnostic aggregation.
//! * [`reconcile`]: the one predicate deciding whether results are still current.
//! * [`scheduler`]: the facade tying the phases together.
//!
//! ```text
//! edit ─▶ clock ─▶ resolve ─▶ order (fast, full) ─▶ queue ─▶ reconcile ─▶ diagnostics ─▶ reporter
//! ```

pub mod clock;
pub mod config;
pub mod diagnostics;
mod error;
pub mod order;
pub mod queue;
pub mod reconcile;
pub mod report;
pub mod resolve;
pub mod scheduler;
pub mod snapshot;
pub mod staleness;

pub use clock::{AtomicVersionClock, VersionClock};
pub use config::{ConfigError, SchedulerCfg};
pub use diagnostics::{Diagnostic, DiagnosticKind, ErrorAggregator, Phase};
pub use error::{AnalysisError, Canceled, Result};
pub use order::{DependencyOracle, EvaluationOrder, Group, ReferenceDeps};
pub use queue::{GroupOutcome, GroupRequest, TaskOutcome, TaskQueue, TaskReport, TypecheckTask, Typechecker};
pub use report::{AnalysisEvent, ChannelReporter, NullReporter, Reporter};
pub use resolve::annotate::{Annotation, AnnotationKind};
pub use resolve::scope::{EmptyScope, NamingScope, Referable, Target};
pub use resolve::{Concrete, ResolveEvent, Resolver};
pub use scheduler::{AnalysisScheduler, ResolveOutcome, SchedulerBuilder, TypecheckPlan};
pub use snapshot::{DefKind, Declaration, EditKind, NamePart, Param, Reference, Snapshot};
pub use staleness::{FileState, StalenessTracker};
pub use weft_primitives::{DefId, FileId, Span, Stamp, Version};
pub use weft_worker::{LaneSnapshot, SubmitOutcome};
