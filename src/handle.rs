use crate::event::Event;
use tokio::sync::broadcast::{self, error::RecvError};

/// Receives the membership events of a single member.
#[derive(Debug)]
pub struct Handle {
    event_rx: broadcast::Receiver<Event>,
}

impl Handle {
    pub fn new(event_rx: broadcast::Receiver<Event>) -> Self {
        Handle { event_rx }
    }

    /// Wait for the next event, `None` once the member is gone.
    ///
    /// A handle that falls behind skips the events it missed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.event_rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Membership handle lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
