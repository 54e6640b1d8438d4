use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::repository::{MessageConsumer, MessagePublisher};
use crate::domain::types::MessageEnvelope;
use crate::error::RelayError;

/// A live link to the transport.
#[derive(Debug, Clone)]
pub struct BrokerLink {
    pub established_at: DateTime<Utc>,
    pub generation: u64,
}

/// In-process topic-fanout transport implementing the broker contract.
///
/// The link lifecycle is explicit: nothing is established until the first
/// publish needs it, and a severed link is re-established lazily by the
/// next one. Envelopes travel as serde_json frames so both halves of the
/// contract exercise the real wire shape.
#[derive(Clone, Default)]
pub struct InProcessBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
    link: Mutex<Option<BrokerLink>>,
    generation: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily (re)establish the link.
    fn ensure_link(&self) {
        let mut link = self.inner.link.lock().unwrap();
        if link.is_none() {
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!(generation, "broker link established");
            *link = Some(BrokerLink {
                established_at: Utc::now(),
                generation,
            });
        }
    }

    /// Drop the link; the next publish reconnects.
    pub fn sever_link(&self) {
        *self.inner.link.lock().unwrap() = None;
    }

    /// Current link, if one is established.
    pub fn link(&self) -> Option<BrokerLink> {
        self.inner.link.lock().unwrap().clone()
    }

    /// Bind a consumer to one topic. Drive it with [`MessageConsumer::start`].
    pub fn subscribe(&self, topic: &str) -> InProcessConsumer {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .topics
            .lock()
            .unwrap()
            .entry(topic.to_owned())
            .or_default()
            .push(tx);
        InProcessConsumer {
            inner: Arc::clone(&self.inner),
            topic: topic.to_owned(),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Messages acknowledged by consumer handlers.
    pub fn ack_count(&self) -> u64 {
        self.inner.acked.load(Ordering::SeqCst)
    }

    /// Messages negatively acknowledged (and dropped) by consumer handlers.
    pub fn nack_count(&self) -> u64 {
        self.inner.nacked.load(Ordering::SeqCst)
    }
}

impl MessagePublisher for InProcessBroker {
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), RelayError> {
        self.ensure_link();
        let frame = Bytes::from(
            serde_json::to_vec(envelope)
                .map_err(|e| RelayError::PublishRejected(format!("envelope encode: {e}")))?,
        );
        let mut topics = self.inner.topics.lock().unwrap();
        if let Some(senders) = topics.get_mut(&envelope.topic) {
            // Closed subscriptions are pruned on the way through.
            senders.retain(|tx| tx.send(frame.clone()).is_ok());
        }
        Ok(())
    }
}

/// One topic subscription backed by an unbounded channel.
pub struct InProcessConsumer {
    inner: Arc<BrokerInner>,
    topic: String,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl MessageConsumer for InProcessConsumer {
    fn start<H, Fut>(&self, handler: H) -> Result<JoinHandle<()>, RelayError>
    where
        H: Fn(MessageEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RelayError>> + Send,
    {
        let Some(mut rx) = self.rx.lock().unwrap().take() else {
            return Err(RelayError::Internal(anyhow::anyhow!(
                "consumer already started"
            )));
        };
        let inner = Arc::clone(&self.inner);
        let topic = self.topic.clone();
        Ok(tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let envelope: MessageEnvelope = match serde_json::from_slice(&frame) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        inner.nacked.fetch_add(1, Ordering::SeqCst);
                        warn!(topic = %topic, error = %e, "dropping undecodable frame");
                        continue;
                    }
                };
                match handler(envelope).await {
                    Ok(()) => {
                        inner.acked.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        // Nack without requeue: the producer side owns retries.
                        inner.nacked.fetch_add(1, Ordering::SeqCst);
                        warn!(topic = %topic, error = %e, "consumer handler failed, message dropped");
                    }
                }
            }
        }))
    }
}
