mod broker;
mod client;
mod error;

pub use broker::fetch_ephemeral_credential;
pub use client::{AudioRx, ControlHandle, RealtimeSession, ServerRx, SessionConfig};
pub use error::TransportError;

pub use friday_realtime_types as types;
pub use friday_realtime_utils as utils;
