//! dialog-echo — echo bot built with dialog-client.
//!
//! Replies to every text message with the same text plus a "Test" button,
//! and logs button presses.  Runs against the in-memory transport, which is
//! scripted below with a short conversation.
//!
//! Credentials come from the environment (`ENDPOINT`, `USERNAME`,
//! `PASSWORD`, or `PHONE` + `CODE`); demo values are used when unset.
//!
//!   cargo run -p dialog-echo

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dialog_client::memory::{MemoryConnector, MemoryTransport, Sent};
use dialog_client::update::{UpdateInteractiveMediaEvent, UpdateMessage};
use dialog_client::{
    BoxError, Client, Config, Credential, InteractiveAction, InteractiveActionGroup, Peer, RawUpdate,
    peer::RawPeer,
};

const BOT_UID:  i64 = 7;
const USER_UID: i64 = 42;

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "dialog_client=info,dialog_echo=info"); }
    }
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env();
    if config.endpoints.is_empty() {
        config.endpoints = vec!["memory://local".into()];
    }
    if config.credential().is_err() {
        config.username = Some("echo-bot".into());
        config.password = Some("secret".into());
    }

    let transport = MemoryTransport::new(BOT_UID);
    let transport = match config.credential()? {
        Credential::Sms { phone, code }           => transport.accept_sms(phone, code),
        Credential::Password { username, password } => transport.accept_password(username, password),
    };
    let transport = Arc::new(transport);

    println!("🔌 Connecting…");
    let client = Client::builder(config, MemoryConnector::new(transport.clone()))
        .on_error(|error| {
            eprintln!("✗ {error}");
            std::process::exit(1);
        })
        .on_interactive_event(|event| async move {
            println!("🔘 uid={} pressed {:?} on {}", event.uid, event.id, event.message_ref.rid);
            Ok::<_, BoxError>(())
        })
        .start()?;

    // Needs the running client to reply.
    let replier = client.clone();
    client.on_message(move |peer, message| {
        let client = replier.clone();
        async move {
            println!("📩 {peer}: {:?}", message.content);
            if let Some(text) = message.text() {
                let actions = vec![InteractiveActionGroup {
                    title:   Some("Example".into()),
                    actions: vec![InteractiveAction::button("test", "test", "Test")],
                    ..Default::default()
                }];
                client
                    .send_interactive_message(peer, text, actions, Some(message.reply_attach()))
                    .await?;
            }
            Ok::<_, BoxError>(())
        }
    });

    client.ready().await?;
    println!("✅ Logged in (uid={})", client.own_id().await?);

    // ── Scripted conversation ─────────────────────────────────────────────
    let user = Peer::user(USER_UID);
    transport.insert_text(user, "m1", USER_UID, format!("hello at {}", Utc::now().format("%H:%M:%S")));
    transport.push_update(RawUpdate::Message(UpdateMessage {
        peer:       RawPeer::User { id: USER_UID },
        mid:        "m1".into(),
        sender_uid: USER_UID,
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;

    // The bot's own reply comes back as an update and is ignored.
    let reply_rid = transport.sent().iter().find_map(|s| match s {
        Sent::Interactive { rid, .. } => Some(rid.clone()),
        _ => None,
    });
    if let Some(rid) = reply_rid {
        transport.insert_text(user, "m2", BOT_UID, "echo");
        transport.push_update(RawUpdate::Message(UpdateMessage {
            peer:       RawPeer::User { id: USER_UID },
            mid:        "m2".into(),
            sender_uid: BOT_UID,
        }));
        println!("↩️  replied with rid {rid}");
    }

    transport.push_update(RawUpdate::InteractiveMediaEvent(UpdateInteractiveMediaEvent {
        mid:   "m1".into(),
        id:    "test".into(),
        value: Some("test".into()),
        uid:   USER_UID,
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("👋 {} outbound request(s), done.", transport.sent().len());
    Ok(())
}
