//! Broker plumbing shared by the Gateway (publish-only) and the Executor (declare + consume).
//! Both sides talk to one durable direct exchange, `mlapi_exchange`; each worker owns exactly one
//! auto-delete queue named after its `worker_id`, bound with a routing key of the same name.

use errors::*;

use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use serde_json::Value;

pub const EXCHANGE_NAME: &str = "mlapi_exchange";

pub async fn connect(amqp_addr: &str) -> Result<Connection> {
    Connection::connect(amqp_addr, ConnectionProperties::default())
        .await
        .map_err(Error::from)
}

/// Gateway-side publisher: declares the shared exchange once at startup, then checks (without
/// creating) that a worker's queue exists before every publish.
pub struct Publisher {
    channel: Channel,
}

impl Publisher {
    pub async fn new(conn: &Connection) -> Result<Publisher> {
        let channel = conn.create_channel().await?;
        channel
            .exchange_declare(
                EXCHANGE_NAME,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(Publisher { channel })
    }

    /// Publishes `payload` with routing key `worker_id`. Returns `QueueAbsent` (not a generic
    /// broker error) if no worker is currently listening on that queue, so callers can
    /// distinguish "no workers for this model" from "broker unreachable".
    pub async fn publish(&self, worker_id: &str, payload: &Value) -> Result<()> {
        self.channel
            .queue_declare(
                worker_id,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|_| Error::from(ErrorKind::QueueAbsent(worker_id.to_owned())))?;

        let body = ::serde_json::to_vec(payload)?;
        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                worker_id,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }
}

/// Executor-side setup: declares the exchange, declares this worker's own auto-delete queue,
/// binds it, sets prefetch = 1, and returns a consumer stream of deliveries.
pub async fn declare_worker_queue_and_consume(conn: &Connection, worker_id: &str) -> Result<Consumer> {
    let channel = conn.create_channel().await?;

    channel
        .exchange_declare(
            EXCHANGE_NAME,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            worker_id,
            QueueDeclareOptions {
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            worker_id,
            EXCHANGE_NAME,
            worker_id,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel.basic_qos(1, BasicQosOptions::default()).await?;

    channel
        .basic_consume(
            worker_id,
            worker_id,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(Error::from)
}
