//! Core engine: the batch → token → DEX scan loop.

pub mod events;
pub mod orchestrator;
pub mod pipeline;

pub use events::{EventBus, ScanEvent, Stage, TokenSnapshot};
pub use orchestrator::{partition_batches, Collaborators, ScanOrchestrator, ScanSummary};
pub use pipeline::{amount_after_withdrawal, qualifies, ScanContext};
