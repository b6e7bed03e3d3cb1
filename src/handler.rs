use crate::{
    common::Endpoint,
    error::{Error, Result},
    membership::MemberList,
    transport::{Message, Reply, Request, Transport},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing_attributes::instrument;
use tracing_futures::Instrument;

/// Answers the requests other members send us.
pub struct RequestHandler<T> {
    members: Arc<MemberList>,
    transport: Arc<T>,
    request_timeout: Duration,
}

impl<T: Transport> RequestHandler<T> {
    pub fn new(members: Arc<MemberList>, transport: Arc<T>, request_timeout: Duration) -> Self {
        Self {
            members,
            transport,
            request_timeout,
        }
    }

    /// Dispatch inbound requests until the transport closes the queue.
    pub async fn run(self, mut inbound: mpsc::Receiver<Request>) {
        while let Some(request) = inbound.recv().await {
            self.dispatch(request);
        }

        tracing::debug!("Inbound queue closed");
    }

    /// Handles a single request. Never fails: a bad request is rejected
    /// through its own reply slot and the next one is served as usual.
    #[instrument(level = "debug", skip(self, request), fields(kind = request.message().kind()))]
    pub fn dispatch(&self, request: Request) {
        let (message, reply) = request.into_parts();

        let res = match message {
            Message::FullStateSync { sender } => {
                tracing::debug!(sender = %sender, "Join request");
                self.members.update(Some(sender));
                reply.respond(Message::full_state_sync_response(self.members.member_states()))
            }

            Message::Ping { gossip } => {
                self.members.update(gossip);
                reply.respond(Message::ack(self.members.member_states()))
            }

            Message::IndirectPing {
                gossip,
                probe_target,
            } => {
                self.members.update(gossip);
                self.relay(probe_target, reply);
                Ok(())
            }

            other => {
                tracing::warn!(kind = other.kind(), "Rejecting unexpected request");
                reply.reject(Error::new_unexpected_request(other.kind()))
            }
        };

        if let Err(error) = res {
            tracing::debug!(%error, "Could not respond");
        }
    }

    /// Probe `target` on behalf of the requester. The reply is only
    /// completed when `target` acks.
    fn relay(&self, target: Endpoint, mut reply: Reply) {
        let members = self.members.clone();
        let transport = self.transport.clone();
        let timeout = self.request_timeout;
        let span = tracing::debug_span!("relay", %target);

        let task = async move {
            let ping = Message::ping(members.member_states());

            let res = tokio::select! {
                res = transport.send(&target, ping, timeout) => res,
                _ = reply.closed() => {
                    tracing::debug!("Requester gave up");
                    return;
                }
            };

            match res.and_then(|response| process_ack(&members, response)) {
                Ok(()) => {
                    if let Err(error) = reply.respond(Message::ack(members.member_states())) {
                        tracing::debug!(%error, "Could not relay ack");
                    }
                }
                // Leave the requester to its own timeout.
                Err(error) => tracing::debug!(%error, "Indirect probe failed"),
            }
        };

        tokio::spawn(task.instrument(span));
    }
}

/// Merge the gossip carried by the answer to a ping. Only an `Ack` proves
/// the target is alive.
pub(crate) fn process_ack(members: &MemberList, response: Message) -> Result<()> {
    match response {
        Message::Ack { gossip } => {
            members.update(gossip);
            Ok(())
        }
        other => Err(Error::new_unexpected_response(other.kind())),
    }
}

/// Merge the gossip carried by a response to one of our own requests.
pub(crate) fn process_response(members: &MemberList, response: Message) -> Result<()> {
    match response {
        Message::Ack { gossip } | Message::FullStateSyncResponse { gossip } => {
            members.update(gossip);
            Ok(())
        }
        other => Err(Error::new_unexpected_response(other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        state::{MemberState, Status},
        test_utils::trace_init,
        transport::memory::{MemoryNetwork, MemoryTransport},
    };
    use tokio::sync::oneshot;
    use tokio_test::task;

    fn state(name: &str) -> MemberState {
        MemberState::alive(name.into(), format!("mem:{}", name))
    }

    fn handler(network: &MemoryNetwork) -> (Arc<MemberList>, RequestHandler<MemoryTransport>) {
        trace_init();

        let members = Arc::new(MemberList::new(state("r")));
        let transport = Arc::new(network.transport("mem:r"));
        let handler = RequestHandler::new(members.clone(), transport, Duration::from_millis(200));

        (members, handler)
    }

    fn request(message: Message) -> (Request, oneshot::Receiver<Result<Message>>) {
        let (tx, rx) = oneshot::channel();
        (Request::new(tx, message), rx)
    }

    fn gossip_names(message: &Message) -> Vec<String> {
        let gossip = match message {
            Message::Ack { gossip } | Message::FullStateSyncResponse { gossip } => gossip,
            other => panic!("unexpected {:?}", other),
        };

        let mut names = gossip.iter().map(|m| m.name().to_string()).collect::<Vec<_>>();
        names.sort();
        names
    }

    #[tokio::test]
    async fn ping_merges_gossip_and_acks() {
        let network = MemoryNetwork::new();
        let (members, handler) = handler(&network);

        let (req, rx) = request(Message::ping(vec![state("a"), state("b")]));
        handler.dispatch(req);

        let res = rx.await.unwrap().unwrap();
        assert_eq!(res.kind(), "Ack");
        assert_eq!(gossip_names(&res), vec!["a", "b", "r"]);
        assert_eq!(members.member_states().len(), 3);
    }

    #[tokio::test]
    async fn full_state_sync_introduces_the_sender() {
        let network = MemoryNetwork::new();
        let (members, handler) = handler(&network);
        members.update(vec![state("b")]);

        let (req, rx) = request(Message::full_state_sync(state("a")));
        handler.dispatch(req);

        let res = rx.await.unwrap().unwrap();
        assert_eq!(res.kind(), "FullStateSyncResponse");
        assert_eq!(gossip_names(&res), vec!["a", "b", "r"]);
    }

    #[tokio::test]
    async fn responses_are_rejected_as_requests() {
        let network = MemoryNetwork::new();
        let (members, handler) = handler(&network);

        let (req, rx) = request(Message::ack(vec![state("a")]));
        handler.dispatch(req);
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedRequestType);

        // Nothing was merged and the next request is still served.
        assert!(members.get(&"a".into()).is_none());
        let (req, rx) = request(Message::ping(Vec::new()));
        handler.dispatch(req);
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn indirect_ping_relays_the_ack() {
        let network = MemoryNetwork::new();
        let (members, handler) = handler(&network);
        let mut target = network.transport("mem:t").listen().await.unwrap();

        let (req, rx) = request(Message::indirect_ping(vec![state("a")], "mem:t".into()));
        handler.dispatch(req);
        let mut rx = task::spawn(rx);

        let ping = target.recv().await.unwrap();
        assert_eq!(ping.message().kind(), "Ping");
        assert_pending!(rx.poll());

        ping.respond(Message::ack(vec![state("t")])).unwrap();

        let res = rx.into_inner().await.unwrap().unwrap();
        assert_eq!(gossip_names(&res), vec!["a", "r", "t"]);
        assert_eq!(members.get(&"t".into()).unwrap().status(), Status::Alive);
    }

    #[tokio::test]
    async fn indirect_ping_answered_with_a_sync_response_is_not_relayed() {
        let network = MemoryNetwork::new();
        let (members, handler) = handler(&network);
        let mut target = network.transport("mem:t").listen().await.unwrap();

        let (req, rx) = request(Message::indirect_ping(Vec::new(), "mem:t".into()));
        handler.dispatch(req);

        let ping = target.recv().await.unwrap();
        ping.respond(Message::full_state_sync_response(vec![state("t")])).unwrap();

        assert!(rx.await.is_err());
        assert!(members.get(&"t".into()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn indirect_ping_to_unreachable_target_is_never_answered() {
        let network = MemoryNetwork::new();
        let (_members, handler) = handler(&network);
        let _target = network.transport("mem:t").listen().await.unwrap();
        network.block("mem:r", "mem:t");

        let (req, rx) = request(Message::indirect_ping(Vec::new(), "mem:t".into()));
        handler.dispatch(req);
        let mut rx = task::spawn(rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_pending!(rx.poll());

        // The relay gives up after its own timeout and drops the slot.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_ready_err!(rx.poll());
    }

    #[test]
    fn unexpected_response_is_an_error() {
        let members = MemberList::new(state("r"));

        let err = process_response(&members, Message::ping(vec![state("a")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedResponseType);
        assert!(members.get(&"a".into()).is_none());

        process_response(&members, Message::ack(vec![state("a")])).unwrap();
        assert!(members.get(&"a".into()).is_some());
    }

    #[test]
    fn only_an_ack_answers_a_ping() {
        let members = MemberList::new(state("r"));

        let response = Message::full_state_sync_response(vec![state("a")]);
        let err = process_ack(&members, response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedResponseType);
        assert!(members.get(&"a".into()).is_none());

        process_ack(&members, Message::ack(vec![state("a")])).unwrap();
        assert!(members.get(&"a".into()).is_some());
    }
}
