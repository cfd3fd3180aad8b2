//! 流水线调度层
//!
//! 配额账本、配置选择、任务账本、阶段编排、事件对账与队列排空循环。

pub mod catalog;
pub mod config_selector;
pub mod drain;
pub mod job_ledger;
pub mod keyed_lock;
pub mod orchestrator;
pub mod quota_ledger;
pub mod reconciler;
pub mod services;

pub use catalog::{ArtifactCatalog, CreateAgentRequest, CreateTargetRequest, CreateWebsiteRequest};
pub use config_selector::{ConfigSelector, CreateConfigRequest, UpdateConfigRequest};
pub use drain::{DrainController, SystemAction};
pub use job_ledger::{Admission, DispatchRequest, JobLedger, QueueDepth};
pub use orchestrator::{DrainReport, StageArtifact, StageOrchestrator, StageOutcome};
pub use quota_ledger::{QuotaLedger, QuotaReport};
pub use reconciler::{ApplyOutcome, EventReconciler, LocalJobState};
pub use services::{DashboardStats, PipelineDependencies, PipelineServices, ScopeQuota, SystemStatus};
