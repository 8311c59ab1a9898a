pub mod commands;
pub mod connection;
pub mod frames;
#[allow(clippy::module_inception)]
pub mod hub;
pub mod listeners;

pub use commands::HubCommand;
pub use connection::{ConnId, MAX_OUTBOUND_QUEUE};
pub use frames::{ClientFrame, HubEvent};
pub use hub::{AttachmentLimits, Hub, HubHandle};
