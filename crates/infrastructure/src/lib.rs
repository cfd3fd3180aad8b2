//! 流水线基础设施：仓储实现与推送通道

pub mod database;
pub mod event_bus;
pub mod memory;

pub use database::*;
pub use event_bus::{BroadcastEventBus, BroadcastSubscription};
pub use memory::*;
