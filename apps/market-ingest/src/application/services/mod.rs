//! Application Services
//!
//! - `worker`: one task per (symbol, stream kind) subscription
//! - `coordinator`: starts workers and owns the ingestion session
//! - `shutdown`: races stop signal against first error, joins workers
//! - `reporting`: non-blocking single-slot error channel
//! - `barrier`: join counter for running workers

mod barrier;
mod coordinator;
mod reporting;
mod shutdown;
mod worker;

pub use barrier::{JoinBarrier, JoinSlot};
pub use coordinator::IngestionCoordinator;
pub use reporting::{ERROR_CHANNEL_CAPACITY, ErrorReporter, FailureCause, IngestError, SetupError};
pub use shutdown::{ShutdownCause, ShutdownController, ShutdownOutcome, ShutdownState};
pub use worker::{StreamWorker, WorkerContext, WorkerSettings};
