//! Build orchestration: matches, their registry, and the scheduler.

mod matcher;
mod matches;
mod registry;
mod scheduler;

pub use matcher::expected_bindings;
pub use matches::{BuildMatch, KEY_ALL, StoredResult};
pub use registry::{MatchRegistry, ReconcileOutcome};
pub use scheduler::{BuildContext, BuildOutcome, BuildScheduler, COOLDOWN_MS};
