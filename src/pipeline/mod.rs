pub mod orchestrator;

pub use orchestrator::{batch_count, PipelineOrchestrator, Stage};
