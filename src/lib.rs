//! Group membership and failure detection in the style of SWIM.
//!
//! Every member periodically probes one other member, asking a few others to
//! probe it on its behalf when it does not answer, and gossips what it knows
//! about the group on every message it sends. Members that stay silent are
//! first suspected and, unless proven alive in time, declared dead.

#[cfg(test)]
#[macro_use]
extern crate tokio_test;

mod common;
mod config;
mod error;
mod event;
mod handle;
mod handler;
mod lifecycle;
mod member;
pub mod membership;
mod monitor;
mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use self::{
    common::{Endpoint, Incarnation, MemberName},
    config::Config,
    error::{Error, ErrorKind, Result},
    event::Event,
    handle::Handle,
    handler::RequestHandler,
    member::Member,
    monitor::{ProbeResult, ProbeRunner},
    state::{MemberState, Status},
    transport::{Message, Request, Transport},
};
