//! 内存仓储实现，`database.url = "memory"` 时使用，也用于测试

pub mod artifact_repository;
pub mod config_repository;
pub mod job_repository;

pub use artifact_repository::InMemoryArtifactRepository;
pub use config_repository::InMemoryProviderConfigRepository;
pub use job_repository::InMemoryJobRepository;
