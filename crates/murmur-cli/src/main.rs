//! Loopback demo: two chat peers in one process over the in-memory hive.
//!
//! Lines typed on stdin are sent into the chat; an echo peer answers
//! every message, which exercises the full gossip → feed → fetch →
//! checkpoint cycle. Commands: `/users`, `/prev`, `/quit`.
//!
//! Configuration (environment):
//! - `MURMUR_CHAT` — chat room name (default `lobby`)
//! - `MURMUR_USERNAME` — display name (default `local`)
//! - `MURMUR_DELIVERY` — `push` (default) or `poll`

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use murmur_net::{Ed25519Signer, MemoryHive};
use murmur_proto::MessageKind;
use murmur_session::{ChatSession, DeliveryMode, SessionConfig, SessionEvent};

fn config_from_env() -> (String, String, DeliveryMode) {
    let chat = std::env::var("MURMUR_CHAT").unwrap_or_else(|_| "lobby".to_string());
    let username = std::env::var("MURMUR_USERNAME").unwrap_or_else(|_| "local".to_string());
    let delivery = match std::env::var("MURMUR_DELIVERY").as_deref() {
        Ok("poll") => DeliveryMode::Poll,
        _ => DeliveryMode::Push,
    };
    (chat, username, delivery)
}

fn session(hive: &MemoryHive, chat: &str, username: &str, delivery: DeliveryMode) -> ChatSession {
    ChatSession::new(
        SessionConfig::fast(chat, username).with_delivery(delivery),
        Arc::new(hive.clone()),
        Arc::new(hive.clone()),
        Arc::new(Ed25519Signer::generate()),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (chat_name, username, delivery) = config_from_env();
    let hive = MemoryHive::new();

    let me = session(&hive, &chat_name, &username, delivery);
    let echo = session(&hive, &chat_name, "echo-bot", delivery);

    echo.start().await?;
    me.start().await?;
    info!(chat = %chat_name, address = %me.address(), "joined chat");

    // The echo peer answers everything that is not its own.
    {
        let echo = echo.clone();
        let mut events = echo.events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let SessionEvent::MessageReceived(msg) = event {
                    if msg.address != echo.address() && msg.kind == MessageKind::Text {
                        echo.send_message(
                            format!("echo: {}", msg.text),
                            MessageKind::Thread,
                            Some(msg.id.clone()),
                            None,
                        )
                        .await;
                    }
                }
            }
        });
    }

    // Print what our session observes.
    {
        let me = me.clone();
        let mut events = me.events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::MessageReceived(msg) if msg.address != me.address() => {
                        println!("<{}> {}", msg.username, msg.text);
                    }
                    SessionEvent::UserJoined(user) => {
                        println!("* {} joined", user.username);
                    }
                    SessionEvent::UserLeft(address) => {
                        println!("* {address} left");
                    }
                    SessionEvent::RequestError { reason, .. } => {
                        println!("! {reason}");
                    }
                    SessionEvent::CheckpointPublished { generation } => {
                        println!("* checkpoint {generation} published");
                    }
                    _ => {}
                }
            }
        });
    }

    println!("type a message and press enter; /users, /prev, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/users" => {
                for user in me.active_users().await {
                    println!("* {} ({})", user.username, user.address);
                }
            }
            "/prev" => match me.fetch_previous_messages().await {
                Ok(messages) => {
                    for msg in messages {
                        println!("[prev] <{}> {}", msg.username, msg.text);
                    }
                }
                Err(err) => println!("! {err}"),
            },
            text => {
                me.send_message(text.to_string(), MessageKind::Text, None, None)
                    .await;
            }
        }
    }

    me.stop().await;
    echo.stop().await;
    Ok(())
}
