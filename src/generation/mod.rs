//! The multi-phase generation pipeline.
//!
//! Phases run in order under [`orchestrator::PlanJob`]: one outline call,
//! batched detail expansion, then a single normalization pass. Each phase
//! module owns its prompt, response shape, and failure policy.

pub mod details;
pub mod normalize;
pub mod orchestrator;
pub mod outlines;
pub mod session;

pub use orchestrator::{PlanJob, PlanRequest};
pub use session::{SessionStatus, SessionTracker};
