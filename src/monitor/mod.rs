mod probe;

use self::probe::Prober;
use crate::{
    common::MemberName,
    config::Config,
    error::Result,
    lifecycle::Lifecycle,
    membership::{MemberList, SuspectTimers},
    transport::Transport,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing_futures::Instrument;

/// The outcome of a single probe cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProbeResult {
    /// There was nobody to probe.
    NoPeers,
    /// The target acked our ping.
    Acked(MemberName),
    /// The target did not ack our ping but acked one of the relays.
    IndirectAck(MemberName),
    /// Nobody heard from the target before the deadline.
    Failed(MemberName),
}

impl ProbeResult {
    pub fn target(&self) -> Option<&MemberName> {
        match self {
            ProbeResult::NoPeers => None,
            ProbeResult::Acked(name)
            | ProbeResult::IndirectAck(name)
            | ProbeResult::Failed(name) => Some(name),
        }
    }
}

/// Probes one member every `probe_period`.
///
/// Cycles never overlap: a cycle that overruns the period delays the next
/// one instead of running alongside it.
pub struct ProbeRunner<T> {
    prober: Arc<Prober<T>>,
    lifecycle: Lifecycle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> ProbeRunner<T> {
    pub fn new(
        members: Arc<MemberList>,
        timers: Arc<SuspectTimers>,
        transport: Arc<T>,
        config: &Config,
    ) -> Self {
        let prober = Prober {
            members,
            timers,
            transport,
            probe_period: config.probe_period,
            request_timeout: config.request_timeout,
            indirect_checks: config.indirect_checks,
        };

        Self {
            prober: Arc::new(prober),
            lifecycle: Lifecycle::new("probe runner"),
            task: Mutex::new(None),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.lifecycle.start()?;

        let prober = self.prober.clone();
        let span = tracing::debug_span!("probe_runner", member = %prober.members.my_name());

        let task = async move {
            let mut interval = time::interval(prober.probe_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                if let ProbeResult::Failed(name) = prober.probe_once().await {
                    tracing::debug!(%name, "Probe cycle failed");
                }
            }
        };

        if let Some(old) = self.task().replace(tokio::spawn(task.instrument(span))) {
            old.abort();
        }

        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.lifecycle.stop()?;

        if let Some(task) = self.task().take() {
            task.abort();
        }

        Ok(())
    }

    /// Run a single probe cycle right away, outside of the schedule.
    pub async fn probe_once(&self) -> ProbeResult {
        self.prober.probe_once().await
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for ProbeRunner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::RequestHandler,
        state::{MemberState, Status},
        test_utils::trace_init,
        transport::memory::{MemoryNetwork, MemoryTransport},
    };
    use std::{collections::HashSet, time::Duration};

    struct Fixture {
        network: MemoryNetwork,
        members: Arc<MemberList>,
        timers: Arc<SuspectTimers>,
        runner: ProbeRunner<MemoryTransport>,
        config: Config,
    }

    fn endpoint(name: &str) -> String {
        format!("mem:{}", name)
    }

    fn fixture() -> Fixture {
        trace_init();

        let network = MemoryNetwork::new();
        let config = Config::new("me", endpoint("me"));
        let members = Arc::new(MemberList::new(MemberState::alive(
            config.name.clone(),
            config.endpoint.clone(),
        )));
        let timers = Arc::new(SuspectTimers::new(members.clone(), config.suspicion_deadline));
        let transport = Arc::new(network.transport(endpoint("me")));
        let runner = ProbeRunner::new(members.clone(), timers.clone(), transport, &config);

        timers.start().unwrap();

        Fixture {
            network,
            members,
            timers,
            runner,
            config,
        }
    }

    impl Fixture {
        /// Add a peer that answers requests like a regular member.
        async fn peer(&self, name: &str) -> Arc<MemberList> {
            let me = MemberState::alive(name.into(), endpoint(name));
            let members = Arc::new(MemberList::new(me));
            let transport = Arc::new(self.network.transport(endpoint(name)));
            let inbound = transport.listen().await.unwrap();
            let timeout = self.config.request_timeout;
            let handler = RequestHandler::new(members.clone(), transport, timeout);
            tokio::spawn(handler.run(inbound));

            self.members.update(vec![members.me().clone()]);
            members
        }

        fn status(&self, name: &str) -> Status {
            self.members.get(&name.into()).unwrap().status()
        }

        async fn probe_rotation(&self, n: usize) -> HashSet<ProbeResult> {
            let mut results = HashSet::new();
            for _ in 0..n {
                results.insert(self.runner.probe_once().await);
            }
            results
        }
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_probe() {
        let f = fixture();
        assert_eq!(f.runner.probe_once().await, ProbeResult::NoPeers);
    }

    #[tokio::test(start_paused = true)]
    async fn direct_ack_exchanges_gossip() {
        let f = fixture();
        let a = f.peer("a").await;

        assert_eq!(f.runner.probe_once().await, ProbeResult::Acked("a".into()));
        assert_eq!(a.get(&"me".into()).unwrap().status(), Status::Alive);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_probe_suspects_the_target() {
        let f = fixture();
        f.members.update(vec![MemberState::alive("a".into(), endpoint("a"))]);

        assert_eq!(f.runner.probe_once().await, ProbeResult::Failed("a".into()));
        assert_eq!(f.status("a"), Status::Suspected);
        assert!(f.timers.has_timer(&"a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn ack_revives_a_suspected_member() {
        let f = fixture();
        f.peer("a").await;
        f.members.suspect_member(&"a".into());
        f.timers.suspect_member(&"a".into()).unwrap();

        assert_eq!(f.runner.probe_once().await, ProbeResult::Acked("a".into()));
        assert_eq!(f.status("a"), Status::Alive);
        assert!(!f.timers.has_timer(&"a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn relay_rescues_the_target() {
        let f = fixture();
        f.peer("a").await;
        f.peer("r").await;
        f.network.block(endpoint("me"), endpoint("a"));

        let results = f.probe_rotation(2).await;
        let expected = vec![ProbeResult::IndirectAck("a".into()), ProbeResult::Acked("r".into())];
        assert_eq!(results, expected.into_iter().collect());

        assert_eq!(f.status("a"), Status::Alive);
        assert!(!f.timers.has_timer(&"a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn first_relay_ack_ends_the_cycle() {
        let f = fixture();
        f.peer("a").await;
        f.peer("r1").await;
        f.peer("r2").await;
        f.network.block(endpoint("me"), endpoint("a"));
        // r2 never hears back from a and only gives up at its own timeout.
        f.network.block(endpoint("r2"), endpoint("a"));

        let mut rescued = None;
        for _ in 0..3 {
            let start = tokio::time::Instant::now();
            let result = f.runner.probe_once().await;
            if result == ProbeResult::IndirectAck("a".into()) {
                rescued = Some(start.elapsed());
            }
        }

        // The direct ping timeout plus r1's round trip, r2 is not waited for.
        let elapsed = rescued.expect("a was not rescued through r1");
        assert!(elapsed < f.config.request_timeout + Duration::from_millis(100));
        assert!(elapsed < f.config.probe_period);
        assert_eq!(f.status("a"), Status::Alive);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_relays_end_in_suspicion_within_the_period() {
        let f = fixture();
        f.peer("a").await;
        f.peer("r").await;
        f.network.block(endpoint("me"), endpoint("a"));
        f.network.block(endpoint("r"), endpoint("a"));

        let start = tokio::time::Instant::now();
        let results = f.probe_rotation(2).await;
        assert!(start.elapsed() <= f.config.probe_period * 2);

        let expected = vec![ProbeResult::Failed("a".into()), ProbeResult::Acked("r".into())];
        assert_eq!(results, expected.into_iter().collect());
        assert_eq!(f.status("a"), Status::Suspected);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_probes_detect_a_dead_member() {
        let f = fixture();
        f.members.update(vec![MemberState::alive("a".into(), endpoint("a"))]);
        let mut handle = f.members.subscribe();

        f.runner.start().unwrap();
        tokio::time::sleep(f.config.suspicion_deadline + f.config.probe_period * 2).await;
        f.runner.stop().unwrap();

        let suspected = handle.next().await.unwrap();
        assert_eq!(suspected.state().status(), Status::Suspected);
        let dead = handle.next().await.unwrap();
        assert_eq!(dead.state().status(), Status::Dead);

        assert_eq!(f.status("a"), Status::Dead);
        assert_eq!(f.runner.probe_once().await, ProbeResult::NoPeers);
    }

    #[tokio::test]
    async fn runner_lifecycle() {
        let f = fixture();

        assert!(f.runner.stop().is_err());
        f.runner.start().unwrap();
        assert!(f.runner.start().is_err());
        f.runner.stop().unwrap();
        f.runner.start().unwrap();
        f.runner.stop().unwrap();
    }
}
