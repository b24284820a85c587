pub mod client;
pub mod common;

pub use client::DiscoveryClient;
pub use common::error::DiscoveryError;
pub use common::messages::Message;
