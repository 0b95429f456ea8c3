//! End-to-end flows against a running server (`cargo run` with a migrated
//! database on 127.0.0.1:3000).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Shared test context
struct TestContext {
    client: reqwest::Client,
    base_url: String,
    ws_base_url: String,
}

impl TestContext {
    fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .unwrap(),
            base_url: "http://127.0.0.1:3000".to_string(),
            ws_base_url: "ws://127.0.0.1:3000".to_string(),
        }
    }

    /// Registers a fresh user, returning `(uid, session_token)`.
    async fn register(&self) -> (String, String) {
        let response = self
            .client
            .post(format!("{}/api/auth/register", self.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Registration failed");
        let body: Value = response.json().await.unwrap();
        (
            body["uid"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a push frame")
            .expect("push channel closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Opens the push channel and consumes the `connected` acknowledgement.
async fn connect_push(ctx: &TestContext, token: &str, expected_uid: &str) -> WsStream {
    let (mut ws, _) = connect_async(format!("{}/ws?token={}", ctx.ws_base_url, token))
        .await
        .expect("push upgrade failed");
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "connected");
    assert_eq!(ack["uid"], expected_uid);
    ws
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_me_and_logout() {
        let ctx = TestContext::new();
        let (uid, _token) = ctx.register().await;

        let me = ctx
            .client
            .get(format!("{}/api/auth/me", ctx.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(me.status().as_u16(), 200);
        let body: Value = me.json().await.unwrap();
        assert_eq!(body["uid"], uid);
        assert_eq!(body["created_via"], "signup");

        let logout = ctx
            .client
            .post(format!("{}/api/auth/logout", ctx.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(logout.status().as_u16(), 200);

        // The revoked session is invalid immediately.
        let me_again = ctx
            .client
            .get(format!("{}/api/auth/me", ctx.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(me_again.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_two_sessions_are_independently_valid() {
        let ctx_a = TestContext::new();
        let (uid, token_a) = ctx_a.register().await;

        // A second login path for the same user: redeem a connect token.
        let issued = ctx_a
            .client
            .post(format!("{}/api/connect-tokens", ctx_a.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(issued.status().as_u16(), 201);
        let issued_body: Value = issued.json().await.unwrap();

        let ctx_b = TestContext::new();
        let redeemed = ctx_b
            .client
            .post(format!("{}/api/connect-tokens/redeem", ctx_b.base_url))
            .json(&json!({ "code": issued_body["code"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(redeemed.status().as_u16(), 200);
        let redeemed_body: Value = redeemed.json().await.unwrap();
        assert_eq!(redeemed_body["uid"], uid);
        let token_b = redeemed_body["token"].as_str().unwrap().to_string();

        assert_ne!(token_a, token_b, "Each issuance must produce a distinct token");

        // Both sessions authenticate push upgrades concurrently.
        let ws_a = connect_push(&ctx_a, &token_a, &uid).await;
        let ws_b = connect_push(&ctx_b, &token_b, &uid).await;
        drop(ws_a);
        drop(ws_b);
    }

    #[tokio::test]
    async fn test_link_code_is_single_use() {
        let ctx = TestContext::new();
        let (uid, _token) = ctx.register().await;

        let issued = ctx
            .client
            .post(format!("{}/api/link-codes", ctx.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(issued.status().as_u16(), 201);
        let issued_body: Value = issued.json().await.unwrap();
        let code = issued_body["code"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 6);

        let browser = TestContext::new();
        let redeemed = browser
            .client
            .post(format!("{}/api/link-codes/redeem", browser.base_url))
            .json(&json!({ "code": code }))
            .send()
            .await
            .unwrap();
        assert_eq!(redeemed.status().as_u16(), 200);
        let redeemed_body: Value = redeemed.json().await.unwrap();
        assert_eq!(redeemed_body["uid"], uid);

        // Replay fails: the code was consumed by the first redemption.
        let replay = TestContext::new();
        let replayed = replay
            .client
            .post(format!("{}/api/link-codes/redeem", replay.base_url))
            .json(&json!({ "code": code }))
            .send()
            .await
            .unwrap();
        assert_eq!(replayed.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_mutations_fan_out_to_all_connections() {
        let ctx = TestContext::new();
        let (uid, token) = ctx.register().await;

        let mut ws_1 = connect_push(&ctx, &token, &uid).await;
        let mut ws_2 = connect_push(&ctx, &token, &uid).await;

        let created = ctx
            .client
            .post(format!("{}/api/medications", ctx.base_url))
            .json(&json!({
                "name": "Ibuprofen",
                "dose": "200mg",
                "schedule_time": "08:30"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status().as_u16(), 201);
        let medication: Value = created.json().await.unwrap();

        for ws in [&mut ws_1, &mut ws_2] {
            let event = recv_json(ws).await;
            assert_eq!(event["type"], "event");
            assert_eq!(event["uid"], uid);
            assert_eq!(event["data"]["kind"], "medication_created");
            assert_eq!(event["data"]["payload"]["medication_id"], medication["id"]);
        }

        // After one socket closes, only the other receives further events.
        ws_1.close(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let taken = ctx
            .client
            .post(format!(
                "{}/api/medications/{}/taken",
                ctx.base_url,
                medication["id"].as_str().unwrap()
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(taken.status().as_u16(), 200);

        let event = recv_json(&mut ws_2).await;
        assert_eq!(event["data"]["kind"], "medication_taken");
    }

    #[tokio::test]
    async fn test_push_channel_answers_pings() {
        let ctx = TestContext::new();
        let (uid, token) = ctx.register().await;
        let mut ws = connect_push(&ctx, &token, &uid).await;

        ws.send(Message::Text(r#"{"type":"ping"}"#.into()))
            .await
            .unwrap();
        let pong = recv_json(&mut ws).await;
        assert_eq!(pong["type"], "pong");

        // Junk is ignored, not an error: the channel stays up.
        ws.send(Message::Text("not json at all".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"shutdown"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"ping"}"#.into()))
            .await
            .unwrap();
        let pong = recv_json(&mut ws).await;
        assert_eq!(pong["type"], "pong");
    }

    #[tokio::test]
    async fn test_push_upgrade_rejects_bad_credentials() {
        let ctx = TestContext::new();

        // Missing token: policy-violation close.
        let (mut ws, _) = connect_async(format!("{}/ws", ctx.ws_base_url))
            .await
            .expect("upgrade itself completes");
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1008),
            other => panic!("expected a close frame, got {:?}", other),
        }

        // Unknown token: authentication-failure close.
        let (mut ws, _) = connect_async(format!("{}/ws?token=not-a-session", ctx.ws_base_url))
            .await
            .expect("upgrade itself completes");
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 4401),
            other => panic!("expected a close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_revoked_session_cannot_open_push_channel() {
        let ctx = TestContext::new();
        let (_uid, token) = ctx.register().await;

        let logout = ctx
            .client
            .post(format!("{}/api/auth/logout", ctx.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(logout.status().as_u16(), 200);

        let (mut ws, _) = connect_async(format!("{}/ws?token={}", ctx.ws_base_url, token))
            .await
            .expect("upgrade itself completes");
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 4401),
            other => panic!("expected a close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discord_identity_conflict() {
        let discord_id = format!(
            "12345{:013}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_millis() as u64
                % 10_000_000_000_000
        );

        // First user claims the identity via login.
        let ctx_a = TestContext::new();
        let login = ctx_a
            .client
            .post(format!("{}/api/auth/discord", ctx_a.base_url))
            .json(&json!({ "discord_id": discord_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(login.status().as_u16(), 201);

        // A different user cannot link the same identity.
        let ctx_b = TestContext::new();
        let _ = ctx_b.register().await;
        let link = ctx_b
            .client
            .put(format!("{}/api/auth/discord", ctx_b.base_url))
            .json(&json!({ "discord_id": discord_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(link.status().as_u16(), 409);
    }
}
