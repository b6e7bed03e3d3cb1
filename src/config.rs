use crate::{
    common::{Endpoint, MemberName},
    error::{Error, Result},
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub name: MemberName,
    /// The endpoint the member listens on and announces to its peers.
    pub endpoint: Endpoint,

    /// The interval between probes, also the deadline of a single probe. A
    /// member that has not acked a direct or indirect ping within this
    /// period is suspected.
    pub probe_period: Duration,

    /// How long a suspected member has to be proven alive again before it
    /// is declared dead.
    pub suspicion_deadline: Duration,

    /// The timeout of a single request. Must be strictly less than
    /// `probe_period` so that an indirect probe can still fit in the
    /// remainder of the period.
    pub request_timeout: Duration,

    /// The number of members asked to probe a target on our behalf after a
    /// failed direct ping.
    pub indirect_checks: usize,
}

impl Config {
    /// A conservative configuration suitable for most LAN environments.
    pub fn new(name: impl Into<MemberName>, endpoint: impl Into<Endpoint>) -> Self {
        Config {
            name: name.into(),
            endpoint: endpoint.into(),
            probe_period: Duration::from_secs(1),
            suspicion_deadline: Duration::from_secs(5),
            request_timeout: Duration::from_millis(500),
            indirect_checks: 3,
        }
    }

    /// Like `new`, tuned for a loopback environment.
    pub fn local(name: impl Into<MemberName>, endpoint: impl Into<Endpoint>) -> Self {
        Config {
            probe_period: Duration::from_millis(500),
            suspicion_deadline: Duration::from_secs(3),
            request_timeout: Duration::from_millis(200),
            indirect_checks: 1,
            ..Config::new(name, endpoint)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_period == Duration::from_secs(0) {
            return Err(Error::new_invalid_config("probe_period must be non zero"));
        }

        if self.request_timeout == Duration::from_secs(0) {
            return Err(Error::new_invalid_config("request_timeout must be non zero"));
        }

        if self.request_timeout >= self.probe_period {
            return Err(Error::new_invalid_config(
                "request_timeout must be less than probe_period",
            ));
        }

        if self.suspicion_deadline == Duration::from_secs(0) {
            return Err(Error::new_invalid_config("suspicion_deadline must be non zero"));
        }

        Ok(())
    }
}
