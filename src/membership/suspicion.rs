use crate::{
    common::MemberName,
    error::Result,
    event::Event,
    lifecycle::Lifecycle,
    membership::{MemberList, Observer},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};
use tokio::{runtime, task::JoinHandle};
use tracing_futures::Instrument;

/// Deferred "declare dead" timers, at most one per suspected member.
///
/// A timer that fires goes through `MemberList::make_member_dead`, which only
/// applies to a member that is still suspected, so a timer that loses the
/// race against a revival is a no-op.
///
/// While running, the timers observe every accepted write to the member list
/// as it happens: a suspicion arms a timer and any revival or death cancels
/// it. Starting rebuilds the timers from the current states, so suspicions
/// recorded while stopped are not forgotten.
#[derive(Debug)]
pub struct SuspectTimers {
    inner: Arc<Inner>,
    lifecycle: Lifecycle,
}

#[derive(Debug)]
struct Inner {
    members: Arc<MemberList>,
    deadline: Duration,
    timers: Arc<Mutex<Timers>>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct Timers {
    /// Set while running, timers are spawned onto it.
    runtime: Option<runtime::Handle>,
    pending: HashMap<MemberName, Timer>,
}

#[derive(Debug)]
struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

impl SuspectTimers {
    pub fn new(members: Arc<MemberList>, deadline: Duration) -> Self {
        let inner = Arc::new(Inner {
            members,
            deadline,
            timers: Arc::new(Mutex::new(Timers::default())),
            next_id: AtomicU64::new(0),
        });

        let observer: Weak<dyn Observer> = Arc::<Inner>::downgrade(&inner);
        inner.members.observe(observer);

        Self {
            inner,
            lifecycle: Lifecycle::new("suspect timers"),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.lifecycle.start()?;

        let inner = &self.inner;
        lock(&inner.timers).runtime = Some(runtime::Handle::current());

        // States lock first, then the timers, same order as the write path.
        let mut armed = 0;
        inner.members.for_each_member(|state| {
            if state.status().is_suspected() && inner.arm(&mut lock(&inner.timers), state.name()) {
                armed += 1;
            }
        });

        tracing::debug!(armed, "Suspect timers started");

        Ok(())
    }

    /// Cancels every outstanding timer.
    pub fn stop(&self) -> Result<()> {
        self.lifecycle.stop()?;

        let cancelled = self.inner.shutdown();
        tracing::debug!(cancelled, "Suspect timers stopped");

        Ok(())
    }

    /// Arm a timer for `name` unless one is already pending.
    pub fn suspect_member(&self, name: &MemberName) -> Result<()> {
        self.lifecycle.ensure_running()?;
        self.inner.arm(&mut lock(&self.inner.timers), name);
        Ok(())
    }

    /// Cancel the pending timer for `name`, if any.
    pub fn unsuspect_member(&self, name: &MemberName) -> Result<()> {
        self.lifecycle.ensure_running()?;
        self.inner.disarm(&mut lock(&self.inner.timers), name);
        Ok(())
    }

    pub fn has_timer(&self, name: &MemberName) -> bool {
        lock(&self.inner.timers).pending.contains_key(name)
    }
}

impl Drop for SuspectTimers {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl Observer for Inner {
    fn observe(&self, event: &Event) {
        let mut timers = lock(&self.timers);

        match event {
            Event::Suspected(state) => {
                self.arm(&mut timers, state.name());
            }
            Event::Joined(state) if state.status().is_suspected() => {
                self.arm(&mut timers, state.name());
            }
            Event::Alive(state) | Event::Dead(state) => {
                self.disarm(&mut timers, state.name());
            }
            Event::Joined(_) => {}
        }
    }
}

impl Inner {
    /// No-op while stopped or when a timer is already pending.
    fn arm(&self, timers: &mut Timers, name: &MemberName) -> bool {
        let runtime = match &timers.runtime {
            Some(runtime) => runtime,
            None => return false,
        };

        if timers.pending.contains_key(name) {
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let members = self.members.clone();
        let pending = self.timers.clone();
        let deadline = self.deadline;
        let target = name.clone();
        let span = tracing::debug_span!("suspicion", %name);

        let handle = runtime.spawn(
            async move {
                tokio::time::sleep(deadline).await;
                expire(&members, &pending, &target, id);
            }
            .instrument(span),
        );

        tracing::debug!(%name, deadline = ?self.deadline, "Armed suspicion timer");
        timers.pending.insert(name.clone(), Timer { id, handle });

        true
    }

    fn disarm(&self, timers: &mut Timers, name: &MemberName) -> bool {
        match timers.pending.remove(name) {
            Some(timer) => {
                timer.handle.abort();
                tracing::debug!(%name, "Cancelled suspicion timer");
                true
            }
            None => false,
        }
    }

    fn shutdown(&self) -> usize {
        let mut timers = lock(&self.timers);
        timers.runtime = None;

        let cancelled = timers.pending.len();
        for (_, timer) in timers.pending.drain() {
            timer.handle.abort();
        }

        cancelled
    }
}

fn expire(members: &MemberList, timers: &Mutex<Timers>, name: &MemberName, id: u64) {
    {
        let mut timers = lock(timers);
        match timers.pending.get(name) {
            Some(timer) if timer.id == id => {
                timers.pending.remove(name);
            }
            // Replaced or cancelled while we were waking up.
            _ => return,
        }
    }

    // The timers lock is released, the write below calls back into `observe`.
    if members.make_member_dead(name) {
        tracing::info!(%name, "Suspected member declared dead");
    } else {
        tracing::debug!(%name, "Suspicion expired for a member that is no longer suspected");
    }
}

fn lock(timers: &Mutex<Timers>) -> MutexGuard<'_, Timers> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}
