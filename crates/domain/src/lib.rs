pub mod entities;
pub mod events;
pub mod ports;
pub mod publishing;
pub mod quota;
pub mod repositories;

pub use entities::*;
pub use events::*;
pub use ports::*;
pub use quota::{QuotaStatus, QuotaWindow};
pub use repositories::*;
pub use pipeline_core::{
    JobStatus, JobType, PipelineError, PipelineResult, ProviderScope, PublishingBlockReason,
    TimeFrame,
};
