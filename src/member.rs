use crate::{
    common::{Endpoint, MemberName},
    config::Config,
    error::{Error, Result},
    handle::Handle,
    handler::{process_response, RequestHandler},
    lifecycle::Lifecycle,
    membership::{MemberList, SuspectTimers},
    monitor::{ProbeResult, ProbeRunner},
    state::MemberState,
    transport::{Message, Transport},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing_attributes::instrument;
use tracing_futures::Instrument;

/// A single member of a group.
///
/// Owns the local view of the group and the background work that keeps it
/// up to date: answering requests from other members, probing them and
/// expiring suspicions.
pub struct Member<T: Transport> {
    config: Config,
    members: Arc<MemberList>,
    timers: Arc<SuspectTimers>,
    prober: ProbeRunner<T>,
    transport: Arc<T>,
    lifecycle: Lifecycle,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Member<T> {
    pub fn new(config: Config, transport: T) -> Result<Self> {
        config.validate()?;

        if transport.local_endpoint() != &config.endpoint {
            return Err(Error::new_invalid_config(
                "transport is bound to a different endpoint",
            ));
        }

        let me = MemberState::alive(config.name.clone(), config.endpoint.clone());
        let members = Arc::new(MemberList::new(me));
        let timers = Arc::new(SuspectTimers::new(members.clone(), config.suspicion_deadline));
        let transport = Arc::new(transport);
        let prober = ProbeRunner::new(members.clone(), timers.clone(), transport.clone(), &config);

        Ok(Self {
            config,
            members,
            timers,
            prober,
            transport,
            lifecycle: Lifecycle::new("member"),
            dispatcher: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &MemberName {
        &self.config.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start answering requests and probing the group.
    pub async fn start(&self) -> Result<()> {
        self.lifecycle.start()?;

        let inbound = match self.transport.listen().await {
            Ok(inbound) => inbound,
            Err(e) => {
                let _ = self.lifecycle.stop();
                return Err(e);
            }
        };

        let handler = RequestHandler::new(
            self.members.clone(),
            self.transport.clone(),
            self.config.request_timeout,
        );
        let span = tracing::debug_span!("dispatcher", member = %self.config.name);
        let task = tokio::spawn(handler.run(inbound).instrument(span));

        if let Some(old) = self.dispatcher().replace(task) {
            old.abort();
        }

        self.timers.start()?;
        self.prober.start()?;

        tracing::info!(
            member = %self.config.name,
            endpoint = %self.config.endpoint,
            "Member started"
        );

        Ok(())
    }

    /// Stop probing, cancel every suspicion and release the transport.
    ///
    /// Only fails if the member is not running, everything else is best
    /// effort.
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.stop()?;

        if let Err(error) = self.prober.stop() {
            tracing::warn!(%error, "Could not stop the probe runner");
        }

        if let Err(error) = self.timers.stop() {
            tracing::warn!(%error, "Could not stop the suspicion timers");
        }

        if let Some(dispatcher) = self.dispatcher().take() {
            dispatcher.abort();
        }

        if let Err(error) = self.transport.close().await {
            tracing::warn!(%error, "Could not close the transport");
        }

        tracing::info!(member = %self.config.name, "Member stopped");

        Ok(())
    }

    /// Join the group `target` belongs to.
    ///
    /// Only a member that does not know about anybody else yet can join.
    #[instrument(skip(self), fields(member = %self.config.name))]
    pub async fn join(&self, target: &Endpoint) -> Result<()> {
        self.lifecycle.ensure_running()?;

        if !self.members.member_states_excluding_self().is_empty() {
            return Err(Error::new_already_joined());
        }

        let request = Message::full_state_sync(self.members.me().clone());
        let response = self
            .transport
            .send(target, request, self.config.request_timeout)
            .await?;
        process_response(&self.members, response)?;

        tracing::info!(
            members = self.members.member_states().len(),
            "Joined group"
        );

        Ok(())
    }

    /// A snapshot of every known member, ourselves first.
    pub fn list_members(&self) -> Vec<MemberState> {
        self.members.member_states()
    }

    /// Subscribe to membership changes.
    pub fn handle(&self) -> Handle {
        self.members.subscribe()
    }

    /// Probe the next member right away.
    pub async fn probe(&self) -> Result<ProbeResult> {
        self.lifecycle.ensure_running()?;
        Ok(self.prober.probe_once().await)
    }

    fn dispatcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Drop for Member<T> {
    fn drop(&mut self) {
        if let Some(dispatcher) = self
            .dispatcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            dispatcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        test_utils::trace_init,
        transport::memory::{MemoryNetwork, MemoryTransport},
    };

    fn member(network: &MemoryNetwork, name: &str) -> Member<MemoryTransport> {
        let endpoint = format!("mem:{}", name);
        Member::new(Config::local(name, endpoint.clone()), network.transport(endpoint)).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let network = MemoryNetwork::new();
        let mut config = Config::local("a", "mem:a");
        config.request_timeout = config.probe_period * 2;

        let err = Member::new(config, network.transport("mem:a")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = Member::new(Config::local("a", "mem:a"), network.transport("mem:b"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn join_requires_a_running_member() {
        trace_init();
        let network = MemoryNetwork::new();
        let a = member(&network, "a");

        let err = a.join(&"mem:b".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotRunning);
        assert_eq!(a.probe().await.unwrap_err().kind(), ErrorKind::NotRunning);
    }

    #[tokio::test]
    async fn stop_releases_the_endpoint() {
        trace_init();
        let network = MemoryNetwork::new();
        let a = member(&network, "a");

        a.start().await.unwrap();
        assert!(network.is_listening(&"mem:a".into()));
        assert_eq!(a.start().await.unwrap_err().kind(), ErrorKind::Lifecycle);

        a.stop().await.unwrap();
        assert!(!network.is_listening(&"mem:a".into()));
        assert_eq!(a.stop().await.unwrap_err().kind(), ErrorKind::Lifecycle);

        a.start().await.unwrap();
        assert!(network.is_listening(&"mem:a".into()));
        a.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_join_leaves_the_view_untouched() {
        trace_init();
        let network = MemoryNetwork::new();
        let a = member(&network, "a");
        a.start().await.unwrap();

        let err = a.join(&"mem:nobody".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        assert_eq!(a.list_members().len(), 1);

        a.stop().await.unwrap();
    }
}
