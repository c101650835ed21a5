//! Client-facing plumbing: response bodies and verbatim forwarding.

pub mod body;
pub mod forward;

pub use body::{channel_body, full, BoxError, ChannelSink, GatewayBody};
pub use forward::{ClientAddr, ForwardError, PassThroughForwarder};
