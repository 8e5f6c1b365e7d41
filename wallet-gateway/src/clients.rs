//! External service clients
//!
//! The explorer, the channel-verification service, the messaging relay and
//! the transfer rail are all HTTP black boxes. Each one sits behind a trait
//! so handlers and the withdrawal coordinator are testable with in-process
//! fakes, and each HTTP impl carries the bounded retry policy for transient
//! upstream failures.

use crate::errors::{GatewayError, Result};
use crate::models::{ChannelOwnership, MessageReceipt, MAX_MESSAGE_LEN};
use async_trait::async_trait;
use ledger_core::RetryPolicy;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

fn upstream_retryable(err: &GatewayError) -> bool {
    matches!(err, GatewayError::Upstream(_))
}

// Chain explorer

#[async_trait]
pub trait ChainExplorer: Send + Sync {
    /// Nano-denominated on-chain balance for an address
    async fn nano_balance(&self, address: &str) -> Result<u64>;
}

pub struct TonExplorerClient {
    base_url: String,
    http: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ExplorerBalanceResponse {
    balance: u64,
}

impl TonExplorerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            http,
            retry,
        }
    }
}

#[async_trait]
impl ChainExplorer for TonExplorerClient {
    async fn nano_balance(&self, address: &str) -> Result<u64> {
        let url = format!("{}/v2/addresses/{}/balance", self.base_url, address);

        self.retry
            .run("explorer balance", upstream_retryable, || async {
                let response = self.http.get(&url).send().await?;

                if !response.status().is_success() {
                    return Err(GatewayError::Upstream(format!(
                        "explorer returned {}",
                        response.status()
                    )));
                }

                let body: ExplorerBalanceResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Upstream(format!("explorer body: {}", e)))?;
                Ok(body.balance)
            })
            .await
    }
}

// Channel-ownership verification

#[async_trait]
pub trait ChannelVerifier: Send + Sync {
    async fn verify(&self, channel: &str, telegram_user_id: i64) -> Result<ChannelOwnership>;
}

pub struct ChannelVerifyClient {
    base_url: String,
    http: Client,
}

impl ChannelVerifyClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl ChannelVerifier for ChannelVerifyClient {
    async fn verify(&self, channel: &str, telegram_user_id: i64) -> Result<ChannelOwnership> {
        let url = format!("{}/verify", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&json!({
                "channel": channel,
                "telegram_user_id": telegram_user_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "channel verifier returned {}",
                response.status()
            )));
        }

        let ownership: ChannelOwnership = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("channel verifier body: {}", e)))?;
        Ok(ownership)
    }
}

// Messaging relay

#[async_trait]
pub trait MessageRelay: Send + Sync {
    async fn send(&self, to: i64, message: &str) -> Result<MessageReceipt>;
}

pub struct MessageRelayClient {
    base_url: String,
    http: Client,
}

impl MessageRelayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl MessageRelay for MessageRelayClient {
    async fn send(&self, to: i64, message: &str) -> Result<MessageReceipt> {
        // Relay hard-rejects oversized messages; fail before the network call
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(GatewayError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let url = format!("{}/send", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&json!({ "to": to, "message": message }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "relay returned {}",
                response.status()
            )));
        }

        let receipt: MessageReceipt = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("relay body: {}", e)))?;
        Ok(receipt)
    }
}

// Withdrawal transfer rail

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub entry_id: Uuid,
    pub destination: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub external_ref: String,
}

#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Initiate the external TON transfer for a reserved withdrawal
    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferResult>;
}

/// Mock transfer rail with configurable latency and success rate
///
/// Stands in for the real chain until a confirmation source is wired up;
/// also drives coordinator tests.
pub struct MockTransferClient {
    latency: Duration,
    success_rate: f64,
}

impl MockTransferClient {
    pub fn new(latency_ms: u64, success_rate: f64) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            success_rate,
        }
    }
}

#[async_trait]
impl TransferClient for MockTransferClient {
    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferResult> {
        tokio::time::sleep(self.latency).await;

        if rand::random::<f64>() < self.success_rate {
            Ok(TransferResult {
                external_ref: format!("mock-{}", request.entry_id),
            })
        } else {
            Err(GatewayError::Upstream("mock transfer rail failure".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transfer_always_succeeds_at_full_rate() {
        let client = MockTransferClient::new(0, 1.0);
        let request = TransferRequest {
            entry_id: Uuid::now_v7(),
            destination: "EQdest".to_string(),
            amount: Decimal::ONE,
        };

        let result = client.initiate_transfer(&request).await.unwrap();
        assert!(result.external_ref.starts_with("mock-"));
    }

    #[tokio::test]
    async fn test_mock_transfer_always_fails_at_zero_rate() {
        let client = MockTransferClient::new(0, 0.0);
        let request = TransferRequest {
            entry_id: Uuid::now_v7(),
            destination: "EQdest".to_string(),
            amount: Decimal::ONE,
        };

        let result = client.initiate_transfer(&request).await;
        assert!(matches!(result, Err(GatewayError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_relay_rejects_oversized_message_without_network() {
        // Unroutable base URL: the length check must fire first
        let relay = MessageRelayClient::new("http://127.0.0.1:1", Duration::from_millis(100));
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);

        let result = relay.send(1, &long).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }
}
