use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    acker::Acker, options::*, publisher_confirm::Confirmation, types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{Acknowledger, JobQueue, MessageStream, QueueMessage};
use crate::config::settings::AckMode;

const CONSUMER_TAG: &str = "transcoder_worker";

#[derive(Clone, Copy, Debug)]
pub struct ConsumerSettings {
    pub ack_mode: AckMode,
    // Only applied when acks are deferred
    pub prefetch: u16,
}

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    settings: ConsumerSettings,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
    // Consumer channels live as long as the service so their streams keep flowing.
    consumer_channels: Arc<Mutex<Vec<Channel>>>,
}

pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead-letter", queue)
}

fn queue_arguments(queue: &str, ack_mode: AckMode) -> FieldTable {
    let mut args = FieldTable::default();
    if ack_mode == AckMode::AfterProcessing {
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString("".into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(dead_letter_queue(queue).as_str().into()),
        );
    }
    args
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        info!("Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str, settings: ConsumerSettings) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            settings,
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
            consumer_channels: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn declare_queue(&self, channel: &Channel, queue: &str) -> Result<()> {
        if self.settings.ack_mode == AckMode::AfterProcessing {
            channel
                .queue_declare(
                    &dead_letter_queue(queue),
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare dead-letter queue: {}", e))?;
        }

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                queue_arguments(queue, self.settings.ack_mode),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;

        Ok(())
    }

    async fn publish_internal(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.channel.lock().await;

        self.declare_queue(&channel, queue).await?;

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        check_confirmation(queue, confirmation)
    }
}

fn check_confirmation(queue: &str, confirmation: Confirmation) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(anyhow!("Broker rejected message for queue '{}'", queue)),
        Confirmation::NotRequested => {
            Err(anyhow!("Publisher confirms not enabled on channel for queue '{}'", queue))
        }
    }
}

#[async_trait]
impl JobQueue for RabbitMqService {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        if let Err(e) = self.publish_internal(queue, payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(queue, payload).await?;
        }

        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<MessageStream> {
        let channel = self
            .conn
            .lock()
            .await
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create consumer channel: {}", e))?;

        self.declare_queue(&channel, queue).await?;

        let auto_ack = self.settings.ack_mode == AckMode::OnDelivery;
        if !auto_ack {
            channel
                .basic_qos(self.settings.prefetch.max(1), BasicQosOptions::default())
                .await
                .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;
        }

        let consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: auto_ack,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        self.consumer_channels.lock().await.push(channel);

        info!(queue = %queue, auto_ack, "RabbitMQ consumer started");

        let queue = queue.to_string();
        let messages = consumer
            .filter_map(move |delivery| {
                let queue = queue.clone();
                async move {
                    match delivery {
                        Ok(delivery) if auto_ack => Some(QueueMessage::auto_acked(delivery.data)),
                        Ok(delivery) => Some(QueueMessage::with_acker(
                            delivery.data,
                            Box::new(RabbitAcker(delivery.acker)),
                        )),
                        Err(e) => {
                            error!(queue = %queue, "Consumer delivery error: {}", e);
                            None
                        }
                    }
                }
            })
            .boxed();

        Ok(messages)
    }
}

struct RabbitAcker(Acker);

#[async_trait]
impl Acknowledger for RabbitAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to ack message: {}", e))
    }

    async fn reject(self: Box<Self>) -> Result<()> {
        self.0
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to reject message: {}", e))
    }
}
