//! 外部提供方调用实现
//!
//! 每种 `ProviderKind` 一个客户端，通过 `ProviderRegistry` 按配置的类型选择。
//! 配额扣减不在这里发生，由调度层在调用前完成。

pub mod apify;
pub mod facebook;
pub mod http;
pub mod openai;
pub mod registry;

pub use apify::ApifyClient;
pub use facebook::FacebookClient;
pub use http::HttpTransport;
pub use openai::OpenAiClient;
pub use registry::ProviderRegistry;
