//! Workflow pipelines orchestrating stateless services.

pub mod prepare;
pub mod verify;

pub use prepare::PrepareWorkflow;
pub use verify::VerifyWorkflow;
