//! `Stripe-Signature` header verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// How old a signed timestamp may be.
const DEFAULT_TOLERANCE_SECS: i64 = 300;
/// How far in the future a signed timestamp may be.
const CLOCK_SKEW_SECS: i64 = 60;

/// Verifies `t=<unix>,v1=<hex hmac>` signatures computed over
/// `"{t}.{payload}"` with the endpoint secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, secs: i64) -> Self {
        self.tolerance_secs = secs;
        self
    }

    /// Checks `header` against `payload` at unix time `now`.
    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
                Some(("v1", sig)) => candidates.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::InvalidSignature)?;
        if now - timestamp > self.tolerance_secs || timestamp - now > CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidSignature);
        }

        for candidate in candidates {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|_| WebhookError::InvalidSignature)?;
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(WebhookError::InvalidSignature)
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(SECRET, payload, NOW);

        assert!(SignatureVerifier::new(SECRET).verify(payload, &header, NOW).is_ok());
    }

    #[test]
    fn accepts_any_matching_v1() {
        let payload = b"{}";
        let good = sign(SECRET, payload, NOW);
        let sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={sig}");

        assert!(SignatureVerifier::new(SECRET).verify(payload, &header, NOW).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = b"{}";
        let header = sign("other", payload, NOW);

        assert!(SignatureVerifier::new(SECRET).verify(payload, &header, NOW).is_err());
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = sign(SECRET, b"{}", NOW);

        assert!(
            SignatureVerifier::new(SECRET)
                .verify(b"{\"x\":1}", &header, NOW)
                .is_err()
        );
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let payload = b"{}";
        let verifier = SignatureVerifier::new(SECRET);

        let stale = sign(SECRET, payload, NOW - 600);
        assert!(verifier.verify(payload, &stale, NOW).is_err());

        let future = sign(SECRET, payload, NOW + 300);
        assert!(verifier.verify(payload, &future, NOW).is_err());
    }

    #[test]
    fn rejects_missing_parts() {
        let verifier = SignatureVerifier::new(SECRET);
        assert!(verifier.verify(b"{}", "v1=abc", NOW).is_err());
        assert!(verifier.verify(b"{}", &format!("t={NOW}"), NOW).is_err());
    }
}
