// Outbound SMS via the tenant-configured HTTP gateway

use crate::stores::SmsGatewayConfig;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMS gateway returned status {0}")]
    Gateway(u16),
}

#[derive(Debug, Serialize)]
struct OutboundSms<'a> {
    to: &'a str,
    from: &'a str,
    body: &'a str,
}

#[derive(Clone)]
pub struct SmsService {
    client: reqwest::Client,
}

impl SmsService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn send(
        &self,
        gateway: &SmsGatewayConfig,
        to: &str,
        body: &str,
    ) -> Result<(), SmsError> {
        let response = self
            .client
            .post(&gateway.api_url)
            .bearer_auth(&gateway.api_key)
            .json(&OutboundSms {
                to,
                from: &gateway.from_number,
                body,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SmsError::Gateway(response.status().as_u16()));
        }

        info!("SMS sent to {}", to);
        Ok(())
    }
}
