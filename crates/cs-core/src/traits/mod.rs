//! Core trait definitions

mod session;

pub use session::RemoteSession;
