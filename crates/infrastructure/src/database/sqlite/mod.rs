pub mod mapping;
pub mod sqlite_config_repository;
pub mod sqlite_job_repository;

pub use sqlite_config_repository::SqliteProviderConfigRepository;
pub use sqlite_job_repository::SqliteJobRepository;
