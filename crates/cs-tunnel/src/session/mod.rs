//! Multiplexed session transport
//!
//! One transport carries many logical channels. The control plane (service
//! start, channel open) is serialized; data on open channels is not.

mod channel;
mod connector;
mod multiplexer;

pub use channel::LogicalChannel;
pub use connector::SessionConnector;
pub use multiplexer::MuxSession;
