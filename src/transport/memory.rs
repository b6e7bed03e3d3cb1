//! An in-process network for simulations and tests.
//!
//! Every message crosses the network encoded, the same way it would on a
//! real wire. Links can be blocked per direction to simulate partitions: a
//! request over a blocked link, or whose response has to travel over one, is
//! never answered.

use crate::{
    common::Endpoint,
    error::{Error, Result},
    transport::{codec, Message, Request, Transport},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};

const INBOUND_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    listeners: HashMap<Endpoint, mpsc::Sender<Request>>,
    blocked: HashSet<(Endpoint, Endpoint)>,
}

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    local: Endpoint,
    network: MemoryNetwork,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self, local: impl Into<Endpoint>) -> MemoryTransport {
        MemoryTransport {
            local: local.into(),
            network: self.clone(),
        }
    }

    /// Drop everything `from` sends to `to`.
    pub fn block(&self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) {
        let link = (from.into(), to.into());
        tracing::debug!(from = %link.0, to = %link.1, "Blocking link");
        self.inner().blocked.insert(link);
    }

    pub fn unblock(&self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) {
        let link = (from.into(), to.into());
        tracing::debug!(from = %link.0, to = %link.1, "Unblocking link");
        self.inner().blocked.remove(&link);
    }

    pub fn is_listening(&self, endpoint: &Endpoint) -> bool {
        self.inner().listeners.contains_key(endpoint)
    }

    async fn deliver(&self, from: &Endpoint, to: &Endpoint, frame: Bytes) -> Result<Message> {
        let listener = {
            let inner = self.inner();

            if inner.is_blocked(from, to) {
                None
            } else {
                Some(
                    inner
                        .listeners
                        .get(to)
                        .cloned()
                        .ok_or_else(|| Error::new_connection_refused(to))?,
                )
            }
        };

        let listener = match listener {
            Some(listener) => listener,
            None => {
                tracing::trace!(%from, %to, "Request lost on a blocked link");
                return future::pending().await;
            }
        };

        let (tx, rx) = oneshot::channel();
        let request = Request::new(tx, codec::decode(&frame[..])?);

        listener
            .send(request)
            .await
            .map_err(|_| Error::new_connection_refused(to))?;

        let response = rx
            .await
            .map_err(|e| Error::new_broken_pipe(Some(e.into())))??;
        let frame = codec::encode(&response)?;

        let lost = self.inner().is_blocked(to, from);
        if lost {
            tracing::trace!(%from, %to, "Response lost on a blocked link");
            return future::pending().await;
        }

        codec::decode(&frame[..])
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn is_blocked(&self, from: &Endpoint, to: &Endpoint) -> bool {
        self.blocked.contains(&(from.clone(), to.clone()))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    async fn send(
        &self,
        target: &Endpoint,
        message: Message,
        timeout: Duration,
    ) -> Result<Message> {
        let frame = codec::encode(&message)?;
        let delivery = self.network.deliver(&self.local, target, frame);

        match tokio::time::timeout(timeout, delivery).await {
            Ok(res) => res,
            Err(_) => Err(Error::new_timeout()),
        }
    }

    async fn listen(&self) -> Result<mpsc::Receiver<Request>> {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);

        if self
            .network
            .inner()
            .listeners
            .insert(self.local.clone(), tx)
            .is_some()
        {
            tracing::debug!(endpoint = %self.local, "Replaced an existing listener");
        }

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.network.inner().listeners.remove(&self.local);
        Ok(())
    }
}
