//! Inbound callback authentication.
//!
//! A callback arrives with the job ID and token as query parameters and a
//! JSON body. The token check is mandatory; when a shared secret and a
//! signature header are both present, the body is additionally authenticated
//! with HMAC-SHA256 before being trusted.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use recap_models::{JobEvent, JobId, WebhookPayload};

use crate::bridge::NotificationBridge;
use crate::error::{NotifyError, NotifyResult};
use crate::token::WebhookTokens;

type HmacSha256 = Hmac<Sha256>;

/// Webhook gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Shared secret for HMAC signature verification, if configured.
    pub shared_secret: Option<String>,
}

impl WebhookConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            shared_secret: std::env::var("RECAP_WEBHOOK_SECRET").ok(),
        }
    }
}

/// Authenticates callbacks and turns them into bridge events.
#[derive(Clone)]
pub struct WebhookGateway {
    tokens: WebhookTokens,
    bridge: NotificationBridge,
    config: WebhookConfig,
}

impl WebhookGateway {
    /// Create a new gateway.
    pub fn new(tokens: WebhookTokens, bridge: NotificationBridge, config: WebhookConfig) -> Self {
        Self {
            tokens,
            bridge,
            config,
        }
    }

    /// Authenticate and process one callback.
    ///
    /// On success the payload is published on the job's channel and
    /// returned. Authentication failures never publish.
    pub async fn handle_callback(
        &self,
        job_id: &JobId,
        token: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> NotifyResult<WebhookPayload> {
        if !self.tokens.verify(job_id, token).await? {
            warn!(job_id = %job_id, "Callback rejected: bad webhook token");
            return Err(NotifyError::InvalidToken);
        }

        match (&self.config.shared_secret, signature) {
            (Some(secret), Some(signature)) => {
                verify_signature(secret, body, signature)?;
            }
            (Some(_), None) => {
                // Signature verification is additive; the token already
                // authenticated the caller.
                warn!(job_id = %job_id, "Callback carried no signature header");
            }
            _ => {}
        }

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;

        info!(
            job_id = %job_id,
            status = %payload.status,
            "Accepted webhook callback"
        );
        self.bridge
            .publish(job_id, &JobEvent::callback(&payload))
            .await?;

        Ok(payload)
    }
}

/// Verify a base64-encoded HMAC-SHA256 signature over the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> NotifyResult<()> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| NotifyError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| NotifyError::InvalidSignature)?;
    mac.update(body);

    // verify_slice is constant-time.
    mac.verify_slice(&expected)
        .map_err(|_| NotifyError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"status":"completed"}"#;
        let signature = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &signature).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"status":"completed"}"#;
        let signature = sign("other", body);
        assert!(matches!(
            verify_signature("topsecret", body, &signature),
            Err(NotifyError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign("topsecret", br#"{"status":"completed"}"#);
        assert!(matches!(
            verify_signature("topsecret", br#"{"status":"failed"}"#, &signature),
            Err(NotifyError::InvalidSignature)
        ));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(verify_signature("topsecret", b"body", "not base64!!!").is_err());
    }
}
