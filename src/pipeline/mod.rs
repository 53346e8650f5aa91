/*!
 * Asynchronous translation job pipeline.
 *
 * Control flow:
 * - `intake` admits a request and creates at most one job per content key
 * - `orchestrator` fetches and parses the source, then creates and enqueues batches
 * - `batch_worker` translates each batch through `rate_limit` and `recovery`
 * - the last completed batch triggers `assembly`, which finalizes the job
 * - a terminal batch failure goes through `status`, failing the job and
 *   every sibling batch in one step
 *
 * Batches complete in any order. The global index of each cue is the only
 * ordering key, applied when the artifact is assembled.
 */

pub mod assembly;
pub mod batch_worker;
pub mod batching;
pub mod intake;
pub mod orchestrator;
pub mod rate_limit;
pub mod recovery;
pub mod status;
pub mod tasks;

pub use assembly::{AssemblyEngine, AssemblyOutcome};
pub use batch_worker::{BatchOutcome, BatchWorker};
pub use intake::{AcquireOutcome, DedupGate};
pub use orchestrator::{Orchestrator, StartOutcome};
pub use rate_limit::{LimiterProfile, LimiterRegistry, RateLimiter, RatePermit};
pub use recovery::{translate_with_recovery, RecoveredBatch, RetryPolicy};
pub use status::StatusMachine;
pub use tasks::{BatchTask, OrchestrationTask};
