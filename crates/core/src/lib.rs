//! 流水线核心库：错误分类、共享枚举、配置模型、日志与时钟抽象

pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use errors::{PipelineError, PipelineResult};
pub use types::{JobStatus, JobType, ProviderScope, PublishingBlockReason, TimeFrame};
