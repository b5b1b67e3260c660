//! Integration tests for the WhatsApp bridge channel.
//!
//! Each test starts a fake bridge on a random port, runs the full bot
//! against it (in-memory store, real router and runtime), and drives the
//! JSON protocol from the bridge side.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use receipt_bot::bot::{BotRuntime, MessageRouter, RuntimeConfig};
use receipt_bot::channels::WhatsAppChannel;
use receipt_bot::conversation::{ConversationState, Profile, profile_keys, prompts};
use receipt_bot::error::{ChannelError, Error};
use receipt_bot::store::{LibSqlBackend, UserStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Bridge = WebSocketStream<TcpStream>;

struct Harness {
    bridge: Bridge,
    store: Arc<dyn UserStore>,
    stop: Option<oneshot::Sender<()>>,
    bot: JoinHandle<Result<(), Error>>,
}

impl Harness {
    async fn stop(mut self) -> Result<(), Error> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.bot.await.unwrap()
    }
}

/// Bind a fake bridge, start the bot against it, return once connected.
async fn start_bot() -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let store: Arc<dyn UserStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let router = Arc::new(
        MessageRouter::new(Arc::clone(&store), Duration::from_secs(2))
            .with_first_contact_window(Duration::ZERO),
    );
    let channel = Arc::new(WhatsAppChannel::new(format!("ws://{addr}")));
    let runtime = BotRuntime::new(router, channel, RuntimeConfig::default());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let bot = tokio::spawn(runtime.run_until(async move {
        let _ = stop_rx.await;
    }));

    let (tcp, _) = listener.accept().await.unwrap();
    let bridge = accept_async(tcp).await.unwrap();

    Harness {
        bridge,
        store,
        stop: Some(stop_tx),
        bot,
    }
}

async fn send_frame(bridge: &mut Bridge, frame: Value) {
    bridge
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

async fn send_message(bridge: &mut Bridge, from: &str, body: &str) {
    send_frame(bridge, json!({"type": "message", "from": from, "body": body})).await;
}

/// Read frames until the next `send` command; return `(to, body)`.
async fn next_send(bridge: &mut Bridge) -> (String, String) {
    loop {
        let frame = bridge
            .next()
            .await
            .expect("bot closed the connection")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).expect("invalid JSON from bot");
            assert_eq!(value["type"], "send", "unexpected frame: {value}");
            return (
                value["to"].as_str().unwrap().to_string(),
                value["body"].as_str().unwrap().to_string(),
            );
        }
    }
}

#[tokio::test]
async fn lifecycle_frames_then_first_message_is_welcomed() {
    timeout(TEST_TIMEOUT, async {
        let mut h = start_bot().await;

        send_frame(&mut h.bridge, json!({"type": "qr", "code": "2@pairing-code"})).await;
        send_frame(&mut h.bridge, json!({"type": "authenticated"})).await;
        send_frame(&mut h.bridge, json!({"type": "ready"})).await;
        send_message(&mut h.bridge, "15550001111@c.us", "hi").await;

        let (to, body) = next_send(&mut h.bridge).await;
        assert_eq!(to, "15550001111@c.us");
        assert_eq!(body, prompts::WELCOME);

        let user = h
            .store
            .find_by_identity("15550001111@c.us")
            .await
            .unwrap()
            .expect("user created");
        assert_eq!(user.conversation_state, ConversationState::AwaitingBrandName);
        assert!(user.profile.is_empty());
        assert!(!user.is_paid);

        h.stop().await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn onboarding_round_trip_over_the_bridge() {
    timeout(TEST_TIMEOUT, async {
        let mut h = start_bot().await;
        let who = "15550002222@c.us";

        send_message(&mut h.bridge, who, "hello").await;
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::WELCOME);

        send_message(&mut h.bridge, who, "  Acme Co  ").await;
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::ask_category("Acme Co"));

        send_message(&mut h.bridge, who, "Bakery").await;
        let expected = Profile::new()
            .with(profile_keys::BRAND_NAME, "Acme Co")
            .with(profile_keys::CATEGORY, "Bakery");
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::setup_complete(&expected));

        send_message(&mut h.bridge, who, "ping").await;
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::PONG);

        let user = h.store.find_by_identity(who).await.unwrap().unwrap();
        assert_eq!(user.conversation_state, ConversationState::Completed);
        assert_eq!(user.profile, expected);

        h.stop().await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn blank_brand_name_is_reprompted() {
    timeout(TEST_TIMEOUT, async {
        let mut h = start_bot().await;
        let who = "15550003333@c.us";

        send_message(&mut h.bridge, who, "hi").await;
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::WELCOME);

        send_message(&mut h.bridge, who, "   ").await;
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::BRAND_NAME_REPROMPT);

        let user = h.store.find_by_identity(who).await.unwrap().unwrap();
        assert_eq!(user.conversation_state, ConversationState::AwaitingBrandName);
        assert!(user.profile.brand_name().is_none());

        h.stop().await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn contacts_progress_independently() {
    timeout(TEST_TIMEOUT, async {
        let mut h = start_bot().await;
        let alice = "15550004444@c.us";
        let bob = "15550005555@c.us";

        send_message(&mut h.bridge, alice, "hi").await;
        assert_eq!(next_send(&mut h.bridge).await, (alice.to_string(), prompts::WELCOME.to_string()));

        send_message(&mut h.bridge, alice, "Alice Bakes").await;
        assert_eq!(next_send(&mut h.bridge).await.1, prompts::ask_category("Alice Bakes"));

        send_message(&mut h.bridge, bob, "hey").await;
        assert_eq!(next_send(&mut h.bridge).await, (bob.to_string(), prompts::WELCOME.to_string()));

        let alice_user = h.store.find_by_identity(alice).await.unwrap().unwrap();
        let bob_user = h.store.find_by_identity(bob).await.unwrap().unwrap();
        assert_eq!(alice_user.conversation_state, ConversationState::AwaitingCategory);
        assert_eq!(bob_user.conversation_state, ConversationState::AwaitingBrandName);
        assert_eq!(h.store.count_users().await.unwrap(), 2);

        h.stop().await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unrecognized_frames_are_ignored() {
    timeout(TEST_TIMEOUT, async {
        let mut h = start_bot().await;

        send_frame(&mut h.bridge, json!({"type": "typing", "from": "x@c.us"})).await;
        h.bridge
            .send(Message::Text("not json".into()))
            .await
            .unwrap();
        send_message(&mut h.bridge, "15550006666@c.us", "hi").await;

        assert_eq!(next_send(&mut h.bridge).await.1, prompts::WELCOME);
        h.stop().await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bridge_closing_stops_the_bot() {
    timeout(TEST_TIMEOUT, async {
        let mut h = start_bot().await;

        send_frame(&mut h.bridge, json!({"type": "ready"})).await;
        h.bridge.close(None).await.unwrap();

        // No stop signal: the runtime exits because the event stream ends,
        // and reports the lost bridge to its caller.
        let err = (&mut h.bot).await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Channel(ChannelError::Disconnected { ref name, .. }) if name == "whatsapp"
        ));
    })
    .await
    .expect("test timed out");
}
