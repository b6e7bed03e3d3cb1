pub mod codec;
pub mod memory;
pub mod proto;

use crate::{
    common::Endpoint,
    error::{Error, Result},
};
use async_trait::async_trait;
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub use self::proto::Message;

/// Moves messages between members.
///
/// Implementations only deal with delivery. A request that is not answered
/// within `timeout` fails with `ErrorKind::Timeout`; the protocol treats every
/// failure the same way, as "no answer".
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The endpoint inbound requests are received on.
    fn local_endpoint(&self) -> &Endpoint;

    async fn send(&self, target: &Endpoint, message: Message, timeout: Duration) -> Result<Message>;

    /// Start accepting requests on `local_endpoint`.
    async fn listen(&self) -> Result<mpsc::Receiver<Request>>;

    /// Stop accepting requests; pending ones are dropped.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Send `message` to every target at once, yielding responses in the
    /// order they complete. Dropping the stream abandons the calls that are
    /// still in flight.
    fn fanout<'a>(
        &'a self,
        targets: &[Endpoint],
        message: &Message,
        timeout: Duration,
    ) -> FuturesUnordered<BoxFuture<'a, (Endpoint, Result<Message>)>> {
        targets
            .iter()
            .cloned()
            .map(|target| {
                let message = message.clone();
                async move {
                    let res = self.send(&target, message, timeout).await;
                    (target, res)
                }
                .boxed()
            })
            .collect()
    }
}

/// An inbound message together with the slot its response goes into.
#[derive(Debug)]
pub struct Request {
    message: Message,
    reply: Reply,
}

/// Single assignment reply slot of a `Request`.
///
/// Dropping it without responding is seen by the requester as
/// `ErrorKind::BrokenPipe`.
#[derive(Debug)]
pub struct Reply {
    tx: oneshot::Sender<Result<Message>>,
}

impl Request {
    pub fn new(tx: oneshot::Sender<Result<Message>>, message: Message) -> Self {
        Self {
            message,
            reply: Reply { tx },
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_parts(self) -> (Message, Reply) {
        (self.message, self.reply)
    }

    pub fn respond(self, message: Message) -> Result<()> {
        self.reply.respond(message)
    }
}

impl Reply {
    pub fn respond(self, message: Message) -> Result<()> {
        self.tx
            .send(Ok(message))
            .map_err(|_| Error::new_broken_pipe(Some("requester went away".into())))
    }

    pub fn reject(self, err: Error) -> Result<()> {
        self.tx
            .send(Err(err))
            .map_err(|_| Error::new_broken_pipe(Some("requester went away".into())))
    }

    /// Resolves once the requester stopped waiting for the response.
    pub async fn closed(&mut self) {
        self.tx.closed().await
    }
}
