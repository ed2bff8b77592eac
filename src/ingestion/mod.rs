pub mod client;
pub mod protocol;

pub use client::{StreamClient, StreamClientConfig};
pub use protocol::SubscribeMethod;
