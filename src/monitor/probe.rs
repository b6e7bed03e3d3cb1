use super::ProbeResult;
use crate::{
    common::{Endpoint, MemberName},
    handler::process_ack,
    membership::{MemberList, SuspectTimers},
    state::MemberState,
    transport::{Message, Transport},
};
use futures::StreamExt;
use rand::seq::SliceRandom;
use std::{cmp, sync::Arc, time::Duration};
use tokio::time::{self, Instant};
use tracing_attributes::instrument;

/// One probe cycle: a direct ping, then up to `indirect_checks` relayed
/// pings, then suspicion.
pub(super) struct Prober<T> {
    pub(super) members: Arc<MemberList>,
    pub(super) timers: Arc<SuspectTimers>,
    pub(super) transport: Arc<T>,
    pub(super) probe_period: Duration,
    pub(super) request_timeout: Duration,
    pub(super) indirect_checks: usize,
}

impl<T: Transport> Prober<T> {
    #[instrument(level = "debug", skip(self), fields(member = %self.members.my_name()))]
    pub(super) async fn probe_once(&self) -> ProbeResult {
        let deadline = Instant::now() + self.probe_period;

        let peers = self.members.member_states_excluding_self();
        if peers.is_empty() {
            return ProbeResult::NoPeers;
        }

        let target = match self.members.next_probe_target() {
            Some(target) => target,
            None => return ProbeResult::NoPeers,
        };
        let name = target.name().clone();

        let timeout = cmp::min(
            self.request_timeout,
            deadline.saturating_duration_since(Instant::now()),
        );
        let ping = Message::ping(self.members.member_states());

        match self
            .transport
            .send(target.endpoint(), ping, timeout)
            .await
            .and_then(|response| process_ack(&self.members, response))
        {
            Ok(()) => {
                tracing::trace!(%name, "Ack");
                self.mark_alive(&name);
                return ProbeResult::Acked(name);
            }
            Err(error) => tracing::debug!(%name, %error, "Direct probe failed"),
        }

        if Instant::now() < deadline && self.probe_indirectly(&target, &peers, deadline).await {
            self.mark_alive(&name);
            return ProbeResult::IndirectAck(name);
        }

        if self.members.suspect_member(&name) {
            tracing::info!(%name, "Probe failed, suspecting member");

            if let Err(error) = self.timers.suspect_member(&name) {
                tracing::warn!(%name, %error, "Could not arm suspicion timer");
            }
        }

        ProbeResult::Failed(name)
    }

    /// Wait for the first relay to ack, at most until `deadline`.
    async fn probe_indirectly(
        &self,
        target: &MemberState,
        peers: &[MemberState],
        deadline: Instant,
    ) -> bool {
        let relays = self.relays(target, peers);
        if relays.is_empty() {
            tracing::debug!("No relays to probe through");
            return false;
        }

        let gossip = self.members.member_states();
        let message = Message::indirect_ping(gossip, target.endpoint().clone());
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut calls = self.transport.fanout(&relays, &message, remaining);

        let first_ack = async {
            while let Some((relay, res)) = calls.next().await {
                match res.and_then(|response| process_ack(&self.members, response)) {
                    Ok(()) => return Some(relay),
                    Err(error) => tracing::debug!(%relay, %error, "Indirect probe failed"),
                }
            }

            None
        };

        // Calls still in flight are dropped with `calls`.
        match time::timeout_at(deadline, first_ack).await {
            Ok(Some(relay)) => {
                tracing::debug!(%relay, "Indirect ack");
                true
            }
            Ok(None) => false,
            Err(_) => {
                tracing::debug!("Indirect probe deadline passed");
                false
            }
        }
    }

    /// Up to `indirect_checks` random live peers other than `target`.
    fn relays(&self, target: &MemberState, peers: &[MemberState]) -> Vec<Endpoint> {
        let candidates = peers
            .iter()
            .filter(|peer| peer.name() != target.name() && !peer.status().is_dead())
            .collect::<Vec<_>>();
        let k = cmp::min(self.indirect_checks, candidates.len());

        candidates
            .choose_multiple(&mut rand::thread_rng(), k)
            .map(|peer| peer.endpoint().clone())
            .collect()
    }

    fn mark_alive(&self, name: &MemberName) {
        if self.members.make_member_alive(name) {
            tracing::info!(%name, "Suspected member is alive");
        }

        if let Err(error) = self.timers.unsuspect_member(name) {
            tracing::debug!(%name, %error, "Could not cancel suspicion timer");
        }
    }
}
