use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::{Acknowledger, JobQueue, MessageStream, QueueMessage};
use crate::config::settings::AckMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected,
}

type SettlementLog = Arc<Mutex<Vec<(String, Settlement)>>>;

struct Channel {
    sender: Option<mpsc::UnboundedSender<QueueMessage>>,
    receiver: Option<mpsc::UnboundedReceiver<QueueMessage>>,
}

pub struct MemoryJobQueue {
    ack_mode: AckMode,
    channels: Mutex<HashMap<String, Channel>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    settlements: SettlementLog,
}

impl MemoryJobQueue {
    pub fn new(ack_mode: AckMode) -> Self {
        Self {
            ack_mode,
            channels: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            settlements: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_channel<T>(&self, queue: &str, f: impl FnOnce(&mut Channel) -> T) -> T {
        let mut channels = self.channels.lock().unwrap();
        let channel = channels.entry(queue.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Channel {
                sender: Some(tx),
                receiver: Some(rx),
            }
        });
        f(channel)
    }

    pub fn close(&self, queue: &str) {
        self.with_channel(queue, |channel| channel.sender = None);
    }

    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn settlements(&self) -> Vec<(String, Settlement)> {
        self.settlements.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn publish(&self, queue: &str, payload: &[u8]) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((queue.to_string(), payload.to_vec()));

        let message = match self.ack_mode {
            AckMode::OnDelivery => QueueMessage::auto_acked(payload.to_vec()),
            AckMode::AfterProcessing => QueueMessage::with_acker(
                payload.to_vec(),
                Box::new(RecordingAcker {
                    payload: String::from_utf8_lossy(payload).into_owned(),
                    log: self.settlements.clone(),
                }),
            ),
        };

        self.with_channel(queue, |channel| match &channel.sender {
            Some(tx) => tx
                .send(message)
                .map_err(|_| anyhow::anyhow!("queue {} has no subscriber", queue)),
            None => Err(anyhow::anyhow!("queue {} is closed", queue)),
        })
    }

    async fn subscribe(&self, queue: &str) -> anyhow::Result<MessageStream> {
        let receiver = self
            .with_channel(queue, |channel| channel.receiver.take())
            .ok_or_else(|| anyhow::anyhow!("queue {} already has a subscriber", queue))?;

        let stream = futures_util::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        Ok(stream.boxed())
    }
}

struct RecordingAcker {
    payload: String,
    log: SettlementLog,
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.payload.clone(), Settlement::Acked));
        Ok(())
    }

    async fn reject(self: Box<Self>) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.payload.clone(), Settlement::Rejected));
        Ok(())
    }
}
