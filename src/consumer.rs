//! NATS request/reply consumer

use crate::config::NatsConfig;
use crate::error::PipelineError;
use crate::producer::{encode_reply, ReplyProducer};
use crate::service::PredictionService;
use anyhow::Result;
use async_nats::{Client, Message};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Request shape, decided by the subject a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Single,
    Batch,
}

/// Consumer answering prediction requests received over NATS
pub struct RequestConsumer {
    client: Client,
    predict_subject: String,
    batch_subject: String,
    workers: usize,
}

impl RequestConsumer {
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            predict_subject: config.predict_subject.clone(),
            batch_subject: config.batch_subject.clone(),
            workers: config.workers,
        }
    }

    /// Serve requests until both subscriptions close.
    ///
    /// At most `workers` requests are scored concurrently.
    pub async fn run(self, service: PredictionService, producer: ReplyProducer) -> Result<()> {
        let single = self.client.subscribe(self.predict_subject.clone()).await?;
        let batch = self.client.subscribe(self.batch_subject.clone()).await?;
        info!(
            predict_subject = %self.predict_subject,
            batch_subject = %self.batch_subject,
            workers = self.workers,
            "Subscribed to prediction subjects"
        );

        let mut messages = futures::stream::select(
            single.map(|m| (RequestKind::Single, m)),
            batch.map(|m| (RequestKind::Batch, m)),
        )
        .boxed();

        let semaphore = Arc::new(Semaphore::new(self.workers));

        while let Some((kind, message)) = messages.next().await {
            if message.reply.is_none() {
                warn!(subject = %message.subject, "Dropping request without reply subject");
                continue;
            }

            let permit = semaphore.clone().acquire_owned().await?;
            let service = service.clone();
            let producer = producer.clone();

            tokio::spawn(async move {
                handle(kind, message, service, producer).await;
                drop(permit);
            });
        }

        info!("NATS subscriptions closed");
        Ok(())
    }
}

async fn handle(
    kind: RequestKind,
    message: Message,
    service: PredictionService,
    producer: ReplyProducer,
) {
    let Some(reply_to) = message.reply else {
        return;
    };
    let request_id = Uuid::new_v4().to_string();
    let payload = message.payload;

    let id = request_id.clone();
    let encoded = tokio::task::spawn_blocking(move || match kind {
        RequestKind::Single => encode_reply(&service.predict_body(&id, &payload)),
        RequestKind::Batch => encode_reply(&service.predict_batch_body(&id, &payload)),
    })
    .await;

    let reply = match encoded {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            error!(request_id = %request_id, error = %e, "Reply encoding failed");
            internal_reply(format!("reply encoding failed: {}", e))
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Scoring task failed");
            internal_reply(format!("prediction task failed: {}", e))
        }
    };

    if let Err(e) = producer.send(reply_to, &request_id, reply).await {
        error!(request_id = %request_id, error = %e, "Failed to publish reply");
    }
}

fn internal_reply(message: String) -> Vec<u8> {
    let outcome: crate::error::Result<()> = Err(PipelineError::Internal(message));
    encode_reply(&outcome).unwrap_or_default()
}
