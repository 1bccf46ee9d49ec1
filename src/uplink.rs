use std::time::Duration;

use tracing::debug;

use crate::config::UPLINK_TIMEOUT_SECS;
use crate::error::Result;
use crate::types::{NodeIdentity, UplinkReport};

/// Posts telemetry reports to the core's uplink endpoint. Best-effort:
/// the caller logs failures and keeps sampling; a dead core never stops
/// local display.
pub struct UplinkClient {
    client: reqwest::Client,
    url: String,
}

impl UplinkClient {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLINK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one report. Non-2xx responses are errors so the caller can log
    /// the rejection reason.
    pub async fn report(
        &self,
        identity: &NodeIdentity,
        avg_mw: f64,
        total_valor: f64,
    ) -> Result<()> {
        let payload = UplinkReport::new(&identity.node_id, avg_mw, total_valor);
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        debug!(status = %resp.status(), "uplink accepted");
        Ok(())
    }
}
