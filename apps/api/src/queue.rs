//! QStash queue collaborator: publishes units of work to the push queue and
//! verifies inbound webhook signatures.
//!
//! The `Upstash-Signature` header is a compact JWS (HS256). Verification
//! accepts both the current and the next signing key so in-flight key
//! rotation never drops deliveries. The signature check runs before the body
//! is deserialized or acted upon.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Publishes JSON payloads to QStash with a target callback URL. The queue
/// guarantees at-least-once delivery to the callback.
#[derive(Clone)]
pub struct QstashClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl QstashClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
            token,
        }
    }

    /// Serializes `payload` and hands it to the queue. Returns once the
    /// queue has accepted the message; delivery happens out of band.
    pub async fn publish_json<T: Serialize>(
        &self,
        target_url: &str,
        payload: &T,
    ) -> Result<(), AppError> {
        let url = format!("{}/v2/publish/{}", self.base_url, target_url);
        debug!("Publishing to queue: {target_url}");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Queue(format!(
                "queue publish returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SignatureClaims {
    iss: String,
    /// Base64url-encoded SHA-256 of the delivered body.
    body: String,
    exp: i64,
}

/// Verifies inbound webhook deliveries against the rotating signing keys.
#[derive(Clone)]
pub struct QstashReceiver {
    current_key: String,
    next_key: String,
}

impl QstashReceiver {
    pub fn new(current_key: String, next_key: String) -> Self {
        Self {
            current_key,
            next_key,
        }
    }

    /// Verifies `signature` against the raw request body. Tries the current
    /// key first, then the next key; fails with `SignatureInvalid` if neither
    /// verifies.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), AppError> {
        if self.verify_with_key(&self.current_key, body, signature) {
            return Ok(());
        }
        if self.verify_with_key(&self.next_key, body, signature) {
            debug!("Webhook verified with next signing key (rotation in flight)");
            return Ok(());
        }
        warn!("Webhook signature verification failed under both keys");
        Err(AppError::SignatureInvalid)
    }

    fn verify_with_key(&self, key: &str, body: &[u8], token: &str) -> bool {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(sig) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
            return false;
        };
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        if mac.verify_slice(&sig_bytes).is_err() {
            return false;
        }

        // Signature checks out; now pin the claims to this delivery.
        let Ok(claims_bytes) = URL_SAFE_NO_PAD.decode(payload) else {
            return false;
        };
        let Ok(claims) = serde_json::from_slice::<SignatureClaims>(&claims_bytes) else {
            return false;
        };

        if claims.iss != "Upstash" {
            return false;
        }
        if claims.exp < chrono::Utc::now().timestamp() {
            return false;
        }

        let body_hash = URL_SAFE_NO_PAD.encode(Sha256::digest(body));
        claims.body.trim_end_matches('=') == body_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Builds a compact JWS the way QStash signs deliveries. Test-only; the
    /// production path only ever verifies.
    fn sign(key: &str, body: &[u8], exp: i64, iss: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = json!({
            "iss": iss,
            "body": URL_SAFE_NO_PAD.encode(Sha256::digest(body)),
            "exp": exp,
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{header}.{payload}");

        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(signing_input.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{signing_input}.{sig}")
    }

    fn receiver() -> QstashReceiver {
        QstashReceiver::new("current-key".to_string(), "next-key".to_string())
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 300
    }

    #[test]
    fn test_valid_signature_with_current_key() {
        let body = br#"{"file_id":"abc"}"#;
        let token = sign("current-key", body, future_exp(), "Upstash");
        assert!(receiver().verify(body, &token).is_ok());
    }

    #[test]
    fn test_valid_signature_with_next_key() {
        let body = br#"{"file_id":"abc"}"#;
        let token = sign("next-key", body, future_exp(), "Upstash");
        assert!(receiver().verify(body, &token).is_ok());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let body = br#"{"file_id":"abc"}"#;
        let token = sign("some-other-key", body, future_exp(), "Upstash");
        assert!(matches!(
            receiver().verify(body, &token),
            Err(AppError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let token = sign("current-key", br#"{"file_id":"abc"}"#, future_exp(), "Upstash");
        assert!(matches!(
            receiver().verify(br#"{"file_id":"evil"}"#, &token),
            Err(AppError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let body = b"{}";
        let token = sign("current-key", body, chrono::Utc::now().timestamp() - 10, "Upstash");
        assert!(receiver().verify(body, &token).is_err());
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let body = b"{}";
        let token = sign("current-key", body, future_exp(), "NotUpstash");
        assert!(receiver().verify(body, &token).is_err());
    }

    #[test]
    fn test_garbage_signature_is_rejected() {
        assert!(receiver().verify(b"{}", "not-a-jwt").is_err());
        assert!(receiver().verify(b"{}", "a.b").is_err());
        assert!(receiver().verify(b"{}", "a.b.c.d").is_err());
    }
}
