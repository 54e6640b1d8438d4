//! End-to-end webhook delivery against a local mock HTTP server: real
//! reqwest transport, real HMAC signer, bounded retry loop.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use courier_relay::domain::types::WebhookRequest;
use courier_relay::infra::signer::HmacSigner;
use courier_relay::infra::webhook::HttpWebhookTransport;
use courier_relay::usecase::webhook::{SIGNATURE_HEADER, WebhookDispatcher};

fn dispatcher() -> WebhookDispatcher<HttpWebhookTransport, HmacSigner> {
    WebhookDispatcher {
        transport: HttpWebhookTransport::default(),
        signer: HmacSigner,
    }
}

fn request(endpoint: String, max_attempts: u32, secret: Option<&str>) -> WebhookRequest {
    WebhookRequest {
        endpoint,
        secret: secret.map(str::to_owned),
        tenant_id: None,
        event_type: "order.created".into(),
        payload: r#"{"order_id":42}"#.into(),
        headers: Vec::new(),
        timeout: Duration::from_secs(2),
        max_attempts,
    }
}

#[tokio::test]
async fn delivers_after_two_bad_gateway_responses() {
    let server = MockServer::start().await;
    // First two POSTs hit the 502 mock; once it is used up the fallback
    // answers 200.
    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let delivery = dispatcher()
        .dispatch(
            request(format!("{}/hooks", server.uri()), 3, None),
            &CancellationToken::new(),
        )
        .await;

    assert!(delivery.delivered);
    assert_eq!(delivery.attempts, 3);
    assert_eq!(delivery.last_status_code, Some(200));
    assert_eq!(delivery.failure_reasons.len(), 2);
}

#[tokio::test]
async fn reports_failure_when_endpoint_never_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let delivery = dispatcher()
        .dispatch(
            request(format!("{}/hooks", server.uri()), 2, None),
            &CancellationToken::new(),
        )
        .await;

    assert!(!delivery.delivered);
    assert_eq!(delivery.attempts, 2);
    assert_eq!(delivery.last_status_code, Some(502));
    assert!(delivery.delivered_at.is_none());
    assert_eq!(delivery.failure_reasons.len(), 2);
}

#[tokio::test]
async fn sends_hex_hmac_signature_over_the_payload() {
    let payload = r#"{"order_id":42}"#;
    let mut mac = Hmac::<Sha256>::new_from_slice(b"topsecret").unwrap();
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks"))
        .and(header(SIGNATURE_HEADER, expected.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let delivery = dispatcher()
        .dispatch(
            request(format!("{}/hooks", server.uri()), 1, Some("topsecret")),
            &CancellationToken::new(),
        )
        .await;

    assert!(delivery.delivered);
    assert_eq!(delivery.attempts, 1);
}
