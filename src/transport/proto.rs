use crate::{common::Endpoint, state::MemberState};
use serde::{Deserialize, Serialize};

/// Every message exchanged between members. Each one carries gossip, the
/// states the sender knows about, except the join handshake which only
/// introduces the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Ping {
        gossip: Vec<MemberState>,
    },
    /// Ask the receiver to ping `probe_target` on our behalf.
    IndirectPing {
        gossip: Vec<MemberState>,
        probe_target: Endpoint,
    },
    FullStateSync {
        sender: MemberState,
    },
    Ack {
        gossip: Vec<MemberState>,
    },
    FullStateSyncResponse {
        gossip: Vec<MemberState>,
    },
}

impl Message {
    pub fn ping(gossip: Vec<MemberState>) -> Self {
        Message::Ping { gossip }
    }

    pub fn indirect_ping(gossip: Vec<MemberState>, probe_target: Endpoint) -> Self {
        Message::IndirectPing {
            gossip,
            probe_target,
        }
    }

    pub fn full_state_sync(sender: MemberState) -> Self {
        Message::FullStateSync { sender }
    }

    pub fn ack(gossip: Vec<MemberState>) -> Self {
        Message::Ack { gossip }
    }

    pub fn full_state_sync_response(gossip: Vec<MemberState>) -> Self {
        Message::FullStateSyncResponse { gossip }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ping { .. } => "Ping",
            Message::IndirectPing { .. } => "IndirectPing",
            Message::FullStateSync { .. } => "FullStateSync",
            Message::Ack { .. } => "Ack",
            Message::FullStateSyncResponse { .. } => "FullStateSyncResponse",
        }
    }
}
