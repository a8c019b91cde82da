//! Astrolabe - message director and state server
//!
//! A channel-addressed publish/subscribe bus with a state server that hosts
//! replicated distributed objects. Objects live at a `(parent, zone)`
//! location, replicate field updates according to schema flags, and track a
//! managing authority inherited down the parent chain.

pub mod bus;
pub mod channel;
pub mod codec;
pub mod config;
pub mod context;
pub mod database;
pub mod datagram;
pub mod directory;
pub mod interfaces;
pub mod network;
pub mod object;
pub mod runtime;
pub mod schema;
pub mod stateserver;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
