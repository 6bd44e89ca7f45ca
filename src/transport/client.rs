//! Outbound delivery of updates to subscribers.

use anyhow::Result;
use std::time::Duration;

use super::protocol::ENDPOINT_UPDATE;
use crate::coordinator::dispatcher::{DeliveryFuture, UpdateSink};
use crate::coordinator::types::SubscriberUpdate;

/// Posts each update as JSON to `http://{address}/update`. Any 2xx reply is
/// taken as confirmation that the subscriber applied it.
pub struct HttpUpdateSink {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpUpdateSink {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { http_client, timeout })
    }

    async fn post_update(&self, address: &str, update: &SubscriberUpdate) -> Result<()> {
        let response = self
            .http_client
            .post(format!("http://{}{}", address, ENDPOINT_UPDATE))
            .json(update)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Update rejected by {}: {}", address, response.status()));
        }

        tracing::trace!(
            "Delivered {} topic delta(s) to {}",
            update.topic_deltas.len(),
            address
        );

        Ok(())
    }
}

impl UpdateSink for HttpUpdateSink {
    fn deliver<'a>(&'a self, address: &'a str, update: SubscriberUpdate) -> DeliveryFuture<'a> {
        Box::pin(async move { self.post_update(address, &update).await })
    }
}
