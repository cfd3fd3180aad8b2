pub mod artifacts;
pub mod job;
pub mod provider_config;
pub mod publish_target;

pub use artifacts::*;
pub use job::*;
pub use provider_config::*;
pub use publish_target::*;
