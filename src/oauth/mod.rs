pub mod flow;
pub mod identity;
pub mod provider;

pub use flow::*;
pub use identity::*;
pub use provider::*;
