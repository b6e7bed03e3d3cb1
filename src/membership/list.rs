use crate::{
    common::MemberName,
    event::Event,
    handle::Handle,
    membership::rotation::RoundRobin,
    state::{MemberState, Status},
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError, Weak},
};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Sees every accepted write synchronously, while the states lock is held,
/// so observers never miss or reorder a change.
pub(crate) trait Observer: Send + Sync {
    fn observe(&self, event: &Event);
}

/// The local, eventually consistent view of the group.
///
/// The states of the other members and the probe rotation are guarded by
/// two separate locks so that picking a probe target never waits behind a
/// large gossip merge. When both are needed the states lock is always
/// taken first. Callers only ever see cloned snapshots.
#[derive(Debug)]
pub struct MemberList {
    me: MemberState,
    others: Mutex<HashMap<MemberName, MemberState>>,
    rotation: Mutex<RoundRobin>,
    observers: Mutex<Vec<Weak<dyn Observer>>>,
    event_tx: broadcast::Sender<Event>,
}

impl MemberList {
    pub fn new(me: MemberState) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            me,
            others: Mutex::new(HashMap::new()),
            rotation: Mutex::new(RoundRobin::default()),
            observers: Mutex::new(Vec::new()),
            event_tx,
        }
    }

    pub fn my_name(&self) -> &MemberName {
        self.me.name()
    }

    pub fn me(&self) -> &MemberState {
        &self.me
    }

    /// Subscribe to every change applied from now on.
    pub fn subscribe(&self) -> Handle {
        Handle::new(self.event_tx.subscribe())
    }

    pub(crate) fn observe(&self, observer: Weak<dyn Observer>) {
        self.observers().push(observer);
    }

    /// Visit every other member while holding the states lock, so no write
    /// can slip in between the visit and what `f` does with it.
    pub(crate) fn for_each_member(&self, mut f: impl FnMut(&MemberState)) {
        self.others().values().for_each(|state| f(state));
    }

    /// Apply gossip learned from a peer.
    ///
    /// Entries about ourselves are ignored, everything else is resolved per
    /// member with `MemberState::supersedes`.
    pub fn update<I>(&self, remote: I)
    where
        I: IntoIterator<Item = MemberState>,
    {
        let mut others = self.others();

        for remote in remote {
            if remote.name() == self.my_name() {
                continue;
            }

            let event = match others.get(remote.name()) {
                None => Some(Event::Joined(remote.clone())),
                // Same status with a fresher incarnation is not worth an event.
                Some(local) if remote.supersedes(local) => {
                    Some(Event::status_change(remote.clone()))
                        .filter(|_| local.status() != remote.status())
                }
                Some(local) => {
                    tracing::trace!(%local, %remote, "Rejected stale gossip");
                    continue;
                }
            };

            tracing::debug!(state = %remote, "Accepted gossip");
            self.accept(&mut others, remote);

            if let Some(event) = event {
                self.emit(event);
            }
        }
    }

    /// `Alive -> Suspected`, returns whether anything changed.
    pub fn suspect_member(&self, name: &MemberName) -> bool {
        self.transition(name, MemberState::suspect)
    }

    /// `Suspected -> Alive`, returns whether anything changed.
    pub fn make_member_alive(&self, name: &MemberName) -> bool {
        self.transition(name, MemberState::revive)
    }

    /// `Suspected -> Dead`, returns whether anything changed.
    pub fn make_member_dead(&self, name: &MemberName) -> bool {
        self.transition(name, MemberState::kill)
    }

    /// A snapshot of every known member, ourselves included.
    pub fn member_states(&self) -> Vec<MemberState> {
        let others = self.others();

        let mut states = Vec::with_capacity(others.len() + 1);
        states.push(self.me.clone());
        states.extend(others.values().cloned());
        states
    }

    pub fn member_states_excluding_self(&self) -> Vec<MemberState> {
        self.others().values().cloned().collect()
    }

    pub fn get(&self, name: &MemberName) -> Option<MemberState> {
        if name == self.my_name() {
            return Some(self.me.clone());
        }

        self.others().get(name).cloned()
    }

    /// The next member to probe, `None` if there is nobody left to probe.
    ///
    /// Dead members are not part of the rotation.
    pub fn next_probe_target(&self) -> Option<MemberState> {
        self.rotation().next()
    }

    fn transition(&self, name: &MemberName, f: impl FnOnce(&MemberState) -> MemberState) -> bool {
        let mut others = self.others();

        let next = match others.get(name) {
            Some(current) => {
                let next = f(current);
                if next.status() == current.status() {
                    return false;
                }
                next
            }
            None => return false,
        };

        tracing::debug!(state = %next, "Local transition");

        {
            let mut rotation = self.rotation();
            if next.status().is_dead() {
                rotation.remove(name);
            } else {
                rotation.replace(next.clone());
            }
        }

        others.insert(name.clone(), next.clone());
        self.emit(Event::status_change(next));

        true
    }

    fn accept(&self, others: &mut HashMap<MemberName, MemberState>, state: MemberState) {
        {
            let mut rotation = self.rotation();
            if state.status() == Status::Dead {
                rotation.remove(state.name());
            } else {
                rotation.push(state.clone());
            }
        }

        others.insert(state.name().clone(), state);
    }

    /// Callers hold the states lock.
    fn emit(&self, event: Event) {
        self.observers().retain(|observer| match observer.upgrade() {
            Some(observer) => {
                observer.observe(&event);
                true
            }
            None => false,
        });

        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    fn others(&self) -> MutexGuard<'_, HashMap<MemberName, MemberState>> {
        self.others.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Weak<dyn Observer>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rotation(&self) -> MutexGuard<'_, RoundRobin> {
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
