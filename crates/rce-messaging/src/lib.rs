//! RCE Messaging - handler dispatch and routed messages
//!
//! [`Distributor`] maps an identifier to exactly one handler. [`Messenger`]
//! routes envelopes between connected interfaces, correlates responses with
//! the requests that caused them, and hands everything else to the
//! distributor.

#![forbid(unsafe_code)]

mod channel;
mod distributor;
mod messenger;

pub use channel::{Attachment, ChannelNetwork, ChannelProxy};
pub use distributor::{Distributor, Handler, SharedHandler};
pub use messenger::{Messenger, OutgoingMessage};
