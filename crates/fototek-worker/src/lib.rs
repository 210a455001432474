//! Fototek worker: the in-process job queue and the pipeline's job handlers.

pub mod context;
pub mod handlers;
pub mod queue;
pub mod testing;

pub use context::JobHandlerContext;
pub use handlers::PipelineContext;
pub use queue::{JobQueue, JobQueueConfig, MetadataExtractionBarrier, QueueName};
