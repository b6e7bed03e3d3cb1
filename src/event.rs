use crate::state::MemberState;

/// A change to the local view, emitted after the write is applied.
#[derive(Debug, PartialEq, Clone)]
pub enum Event {
    /// A member was seen for the first time, in whatever status it was announced with.
    Joined(MemberState),
    Alive(MemberState),
    Suspected(MemberState),
    Dead(MemberState),
}

impl Event {
    pub fn state(&self) -> &MemberState {
        match self {
            Event::Joined(state)
            | Event::Alive(state)
            | Event::Suspected(state)
            | Event::Dead(state) => state,
        }
    }

    pub(crate) fn status_change(state: MemberState) -> Self {
        use crate::state::Status;

        match state.status() {
            Status::Alive => Event::Alive(state),
            Status::Suspected => Event::Suspected(state),
            Status::Dead => Event::Dead(state),
        }
    }
}
