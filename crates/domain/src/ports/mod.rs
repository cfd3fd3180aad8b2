pub mod messaging;
pub mod provider;

pub use messaging::*;
pub use provider::*;
