//! Protocol client adapter backed by the `rmcp` crate.

mod factory;
mod session;

pub use factory::RmcpClientFactory;
pub use session::RmcpSession;
