use crate::common::{Endpoint, Incarnation, MemberName};
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// Health of a member as seen by the local process.
///
/// `Dead` is absorbing, nothing ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Alive,
    Suspected,
    Dead,
}

impl Status {
    pub fn is_alive(self) -> bool {
        self == Status::Alive
    }

    pub fn is_suspected(self) -> bool {
        self == Status::Suspected
    }

    pub fn is_dead(self) -> bool {
        self == Status::Dead
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Alive => f.write_str("alive"),
            Status::Suspected => f.write_str("suspected"),
            Status::Dead => f.write_str("dead"),
        }
    }
}

/// An immutable snapshot of what is known about a single member.
///
/// Every transition produces a new value; the helpers return an unchanged
/// copy when their precondition does not hold so callers can apply them
/// unconditionally and compare the status afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    name: MemberName,
    endpoint: Endpoint,
    incarnation: Incarnation,
    status: Status,
    updated_at: SystemTime,
}

impl MemberState {
    pub fn new(
        name: MemberName,
        endpoint: Endpoint,
        incarnation: Incarnation,
        status: Status,
    ) -> Self {
        MemberState {
            name,
            endpoint,
            incarnation,
            status,
            updated_at: SystemTime::now(),
        }
    }

    /// The state every member starts its life with.
    pub fn alive(name: MemberName, endpoint: Endpoint) -> Self {
        MemberState::new(name, endpoint, 0, Status::Alive)
    }

    pub fn name(&self) -> &MemberName {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn incarnation(&self) -> Incarnation {
        self.incarnation
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }

    /// `Alive -> Suspected`.
    pub fn suspect(&self) -> MemberState {
        self.transition(Status::Alive, Status::Suspected)
    }

    /// `Suspected -> Alive`.
    pub fn revive(&self) -> MemberState {
        self.transition(Status::Suspected, Status::Alive)
    }

    /// `Suspected -> Dead`.
    pub fn kill(&self) -> MemberState {
        self.transition(Status::Suspected, Status::Dead)
    }

    fn transition(&self, from: Status, to: Status) -> MemberState {
        if self.status != from {
            return self.clone();
        }

        MemberState::new(self.name.clone(), self.endpoint.clone(), self.incarnation, to)
    }

    /// Returns `true` if this remote announcement must replace `local`.
    ///
    /// A dead announcement wins regardless of incarnation, even against a
    /// fresher local record. A local dead record is never replaced by
    /// anything but another dead announcement.
    pub fn supersedes(&self, local: &MemberState) -> bool {
        match (local.status, self.status) {
            (_, Status::Dead) => true,
            (Status::Alive, Status::Suspected) => local.incarnation <= self.incarnation,
            (Status::Suspected, Status::Alive) => local.incarnation < self.incarnation,
            (l, r) if l == r => local.incarnation < self.incarnation,
            _ => false,
        }
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}@{} ({}, incarnation {})",
            self.name, self.endpoint, self.status, self.incarnation
        )
    }
}
