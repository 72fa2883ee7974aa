//! Email triage pipeline.
//!
//! Each inbound email flows through three independently triggered stages:
//! 1. `IntakeRecorder`: fetch the raw object, create the tracking record
//! 2. `ResponseDrafter`: retrieval-augmented reply draft (one attempt)
//! 3. `ReviewDispatcher`: send draft and original to a reviewer, then
//!    advance the record to `UnderReview`
//!
//! `KnowledgeBaseRefresher` runs on its own whenever source documents change.

pub mod drafter;
pub mod intake;
pub mod refresher;
pub mod review;
pub mod runner;
pub mod state;
pub mod types;

pub use drafter::ResponseDrafter;
pub use intake::IntakeRecorder;
pub use refresher::KnowledgeBaseRefresher;
pub use review::ReviewDispatcher;
pub use runner::PipelineRunner;
pub use state::Disposition;
