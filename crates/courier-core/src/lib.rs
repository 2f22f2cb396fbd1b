//! courier-core: shared identities, message types, wire format and configuration.
//! All other Courier crates depend on this one.

pub mod channel;
pub mod config;
pub mod message;
pub mod wire;

pub use channel::{ChannelDescriptor, ChannelKind};
pub use message::{now_millis, DataKind, Message, SystemId, TransmissionRequest};
