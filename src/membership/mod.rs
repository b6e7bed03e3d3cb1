mod list;
mod rotation;
mod suspicion;

pub use self::{list::MemberList, rotation::RoundRobin, suspicion::SuspectTimers};

pub(crate) use self::list::Observer;
