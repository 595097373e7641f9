use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

/// Resolves a bearer token presented at the console-relay handshake to a
/// principal id. Token issuance and expiry live with the identity provider,
/// not here.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Uuid>;
}

/// Fixed token table used by development wiring and tests.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Uuid>,
}

impl StaticTokens {
    pub fn new() -> Self {
        StaticTokens::default()
    }

    pub fn grant(mut self, token: &str, user: Uuid) -> Self {
        self.tokens.insert(token.to_string(), user);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Option<Uuid> {
        self.tokens.get(token).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaProof {
    pub ip: String,
    pub key: String,
}

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, proof: &CaptchaProof) -> bool;
}

const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Checks a reCAPTCHA proof against the verify endpoint. Any transport or
/// decode failure counts as a failed check.
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    endpoint: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct RecaptchaResponse {
    success: Option<bool>,
}

impl RecaptchaVerifier {
    pub fn new(secret: &str) -> Self {
        Self::with_endpoint(secret, RECAPTCHA_VERIFY_URL)
    }

    pub fn with_endpoint(secret: &str, endpoint: &str) -> Self {
        RecaptchaVerifier {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, proof: &CaptchaProof) -> bool {
        let url = format!(
            "{}?secret={}&response={}&remoteip={}",
            self.endpoint, self.secret, proof.key, proof.ip
        );

        let res = match self.client.get(&url).send().await {
            Ok(res) => res,
            Err(_) => return false,
        };
        match res.json::<RecaptchaResponse>().await {
            Ok(body) => body.success.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Captcha verifier that always answers the same; test and dev wiring.
#[derive(Debug)]
pub struct FixedCaptcha(pub bool);

#[async_trait]
impl CaptchaVerifier for FixedCaptcha {
    async fn verify(&self, _proof: &CaptchaProof) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_tokens_resolve_known_tokens_only() {
        let user = Uuid::new_v4();
        let tokens = StaticTokens::new().grant("tok-1", user);
        assert_eq!(tokens.verify("tok-1").await, Some(user));
        assert_eq!(tokens.verify("tok-2").await, None);
    }

    #[tokio::test]
    async fn unreachable_captcha_endpoint_fails_closed() {
        let verifier = RecaptchaVerifier::with_endpoint("secret", "http://127.0.0.1:1/verify");
        let proof = CaptchaProof {
            ip: "10.0.0.1".to_string(),
            key: "response-token".to_string(),
        };
        assert!(!verifier.verify(&proof).await);
    }
}
