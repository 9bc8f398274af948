use async_trait::async_trait;
use futures_util::stream::BoxStream;

#[cfg(test)]
pub mod memory;
pub mod rabbitmq;

pub type MessageStream = BoxStream<'static, QueueMessage>;

#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> anyhow::Result<()>;
    /// Rejects without requeue; the broker dead-letters the message.
    async fn reject(self: Box<Self>) -> anyhow::Result<()>;
}

/// Auto-acked messages carry no acknowledger.
pub struct QueueMessage {
    pub payload: Vec<u8>,
    acker: Option<Box<dyn Acknowledger>>,
}

impl QueueMessage {
    pub fn auto_acked(payload: Vec<u8>) -> Self {
        Self { payload, acker: None }
    }

    pub fn with_acker(payload: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            payload,
            acker: Some(acker),
        }
    }

    pub fn requires_ack(&self) -> bool {
        self.acker.is_some()
    }

    pub async fn ack(self) -> anyhow::Result<()> {
        match self.acker {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }

    pub async fn reject(self) -> anyhow::Result<()> {
        match self.acker {
            Some(acker) => acker.reject().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> anyhow::Result<()>;

    async fn subscribe(&self, queue: &str) -> anyhow::Result<MessageStream>;
}
