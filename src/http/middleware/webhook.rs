//! Webhook step: signed callbacks skip rate limiting and CSRF and are
//! admitted only with a valid signature.

use axum::{
    body::{to_bytes, Body},
    http::Request,
};

use crate::http::pipeline::GuardSettings;
use crate::http::request::request_id;
use crate::http::response::GuardRejection;
use crate::observability::{logging, metrics};
use crate::security::{now_millis, WebhookSignatureVerifier};

/// Verify the signature of a callback, returning the request with its body restored.
///
/// Payloads and secrets are never logged.
pub async fn enforce_webhook_signature(
    verifier: &WebhookSignatureVerifier,
    settings: &GuardSettings,
    origin: &str,
    req: Request<Body>,
) -> Result<Request<Body>, GuardRejection> {
    let path = req.uri().path().to_string();

    if settings.webhook_secrets.is_empty() {
        tracing::error!(
            path = %path,
            "Webhook secret is not configured; refusing signed callback"
        );
        metrics::record_webhook_verification("misconfigured");
        return Err(GuardRejection::WebhookMisconfigured);
    }

    let signature = match req
        .headers()
        .get(&settings.webhook_header)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty())
    {
        Some(signature) => signature,
        None => {
            tracing::warn!(
                client = %logging::display_origin(origin),
                path = %path,
                "Webhook signature header missing"
            );
            metrics::record_webhook_verification("missing");
            return Err(GuardRejection::WebhookSignatureMissing);
        }
    };

    let request_id = request_id(&req);
    let (parts, body) = req.into_parts();
    let payload = to_bytes(body, settings.max_body_bytes)
        .await
        .map_err(|_| GuardRejection::PayloadTooLarge)?;

    let secrets: Vec<&str> = settings.webhook_secrets.iter().map(String::as_str).collect();
    match verifier.check(&payload, &signature, &secrets, now_millis()) {
        Ok(()) => {
            metrics::record_webhook_verification("valid");
            tracing::debug!(request_id = %request_id, path = %path, "Webhook signature verified");
            Ok(Request::from_parts(parts, Body::from(payload)))
        }
        Err(reason) => {
            metrics::record_webhook_verification(reason.as_str());
            tracing::warn!(
                request_id = %request_id,
                client = %logging::display_origin(origin),
                path = %path,
                payload_bytes = payload.len(),
                reason = %reason,
                "Webhook signature rejected"
            );
            Err(GuardRejection::WebhookSignatureInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::security::webhook::sign_payload;

    const SECRET: &str = "whsec_test";

    fn settings(secret: Option<&str>) -> GuardSettings {
        let mut config = GuardConfig::default();
        config.webhook.secret = secret.map(str::to_string);
        config.webhook.secret_env = "REQUEST_GUARD_TEST_UNSET_WEBHOOK_SECRET".into();
        GuardSettings::from_config(&config).unwrap()
    }

    fn callback(signature: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/webhooks/stripe");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_signature_passes_with_body() {
        let body = r#"{"type":"product.created","data":{"id":"123"}}"#;
        let header = sign_payload(body.as_bytes(), SECRET, now_millis() / 1000);
        let verifier = WebhookSignatureVerifier::default();

        let req = enforce_webhook_signature(&verifier, &settings(Some(SECRET)), "o", callback(Some(&header), body))
            .await
            .unwrap();
        let forwarded = to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(forwarded, body.as_bytes());
    }

    #[tokio::test]
    async fn test_rejections() {
        let verifier = WebhookSignatureVerifier::default();
        let stale = sign_payload(b"{}", SECRET, 1_000);

        let cases = [
            (settings(None), Some("t=1,v1=ab"), GuardRejection::WebhookMisconfigured),
            (settings(Some(SECRET)), None, GuardRejection::WebhookSignatureMissing),
            (settings(Some(SECRET)), Some(stale.as_str()), GuardRejection::WebhookSignatureInvalid),
            (settings(Some(SECRET)), Some("v1=not-hex"), GuardRejection::WebhookSignatureInvalid),
        ];

        for (settings, signature, expected) in cases {
            let result = enforce_webhook_signature(&verifier, &settings, "o", callback(signature, "{}")).await;
            assert_eq!(result.unwrap_err(), expected);
        }
    }
}
