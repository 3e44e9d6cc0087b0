//! NATS reply publisher

use crate::api::error::error_body;
use crate::error::Result as PipelineResult;
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::debug;

/// Publishes prediction replies to NATS reply subjects
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
}

impl ReplyProducer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish an encoded reply
    pub async fn send(&self, reply_to: Subject, request_id: &str, payload: Vec<u8>) -> Result<()> {
        let bytes = payload.len();
        self.client.publish(reply_to.clone(), payload.into()).await?;

        debug!(
            request_id = %request_id,
            reply_to = %reply_to,
            bytes = bytes,
            "Published reply"
        );

        Ok(())
    }
}

/// Encode a request outcome as the JSON reply body.
///
/// Success bodies match the HTTP responses; failures use the HTTP error
/// body, including its `status` field.
pub fn encode_reply<T: Serialize>(outcome: &PipelineResult<T>) -> serde_json::Result<Vec<u8>> {
    match outcome {
        Ok(body) => serde_json::to_vec(body),
        Err(e) => serde_json::to_vec(&error_body(e).1),
    }
}
