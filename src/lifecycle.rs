use crate::error::{Error, Result};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initial,
    Started,
    Stopped,
}

/// Guards the `start`/`stop` state machine of a long running component.
///
/// `Initial -> Started`, `Started -> Stopped` and `Stopped -> Started`, so a
/// stopped component can be started again.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    component: &'static str,
    state: Mutex<State>,
}

impl Lifecycle {
    pub(crate) fn new(component: &'static str) -> Self {
        Self {
            component,
            state: Mutex::new(State::Initial),
        }
    }

    pub(crate) fn start(&self) -> Result<()> {
        self.transition(&[State::Initial, State::Stopped], State::Started)
    }

    pub(crate) fn stop(&self) -> Result<()> {
        self.transition(&[State::Started], State::Stopped)
    }

    pub(crate) fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == State::Started
    }

    /// Fail fast unless the component is running.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::new_not_running(self.component))
        }
    }

    fn transition(&self, expected: &[State], next: State) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if !expected.contains(&*state) {
            let msg = format!(
                "{} is {:?}, expected one of {:?}",
                self.component, *state, expected
            );
            return Err(Error::new_lifecycle(Some(msg.into())));
        }

        tracing::debug!(component = self.component, from = ?*state, to = ?next, "Lifecycle change");
        *state = next;

        Ok(())
    }
}
