use crate::{common::MemberName, state::MemberState};
use rand::seq::SliceRandom;

/// Round robin over a shuffled copy of the known members.
///
/// Every member is handed out once per rotation; the order is reshuffled
/// each time the rotation starts over so it is unpredictable from one cycle
/// to the next.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    members: Vec<MemberState>,
    index: usize,
}

impl RoundRobin {
    pub fn new(members: Vec<MemberState>) -> Self {
        Self { members, index: 0 }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn next(&mut self) -> Option<MemberState> {
        if self.members.is_empty() {
            return None;
        }

        // The rotation shrank underneath us, start over.
        if self.index >= self.members.len() {
            self.index = 0;
        }

        if self.index == 0 {
            self.members.shuffle(&mut rand::thread_rng());
        }

        let member = self.members[self.index].clone();
        self.index += 1;

        Some(member)
    }

    /// Moves `member` to the back of the rotation, replacing any older entry.
    pub fn push(&mut self, member: MemberState) {
        self.remove(member.name());
        self.members.push(member);
    }

    /// Swaps in a new value for `member` without moving it.
    pub fn replace(&mut self, member: MemberState) {
        if let Some(slot) = self.members.iter_mut().find(|m| m.name() == member.name()) {
            *slot = member;
        }
    }

    pub fn remove(&mut self, name: &MemberName) -> bool {
        if let Some(pos) = self.members.iter().position(|m| m.name() == name) {
            self.members.remove(pos);

            // Keep pointing at the member that was next in line.
            if pos < self.index {
                self.index -= 1;
            }

            true
        } else {
            false
        }
    }
}
