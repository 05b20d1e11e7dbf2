//! Notification sink
//!
//! Drains the bounded notification queue and delivers each message to every
//! persisted monitor chat through the bot API: plain text via `sendMessage`,
//! image attachments via multipart `sendPhoto`. Delivery failures are logged
//! and never retried. The queue guards the recording path, not the network.

use crate::constants::MONITOR_KEYS;
use crate::domain::notification::Notification;
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;
use std::path::Path;
use tokio::sync::{mpsc, Mutex};

pub struct NotifierJob {
    rx: Mutex<Option<mpsc::Receiver<Notification>>>,
}

impl NotifierJob {
    pub fn new(rx: mpsc::Receiver<Notification>) -> Self {
        Self {
            rx: Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl Job for NotifierJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        let token = runtime.config.telegram_bot.token.clone();

        let mut rx = match self.rx.lock().await.take() {
            Some(rx) => rx,
            // the queue cannot be re-attached after a restart
            None => return Ok(()),
        };

        loop {
            tokio::select! {
                () = stop.wait() => return Ok(()),
                notification = rx.recv() => match notification {
                    Some(notification) => deliver(&runtime, &token, notification).await,
                    None => return Ok(()),
                },
            }
        }
    }
}

async fn deliver(runtime: &Runtime, token: &str, notification: Notification) {
    let chats = runtime.kv.get_array(&MONITOR_KEYS).await;

    if chats.is_empty() {
        debug!("no monitor chats registered, dropping notification");
        return;
    }

    for chat in &chats {
        if let Err(e) = send_message(runtime, token, chat, &notification.text).await {
            warn!("error sending notification to chat {}: {}", chat, e);
            continue;
        }

        for image in &notification.images {
            if let Err(e) = send_photo(runtime, token, chat, image).await {
                warn!("error sending photo to chat {}: {}", chat, e);
            }
        }
    }
}

async fn send_message(
    runtime: &Runtime,
    token: &str,
    chat: &str,
    text: &str,
) -> Result<(), reqwest::Error> {
    runtime
        .http
        .post(format!("https://api.telegram.org/bot{}/sendMessage", token))
        .json(&json!({ "chat_id": chat, "text": text }))
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

async fn send_photo(runtime: &Runtime, token: &str, chat: &str, image: &Path) -> Result<()> {
    let bytes = tokio::fs::read(image).await?;

    let file_name = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot.jpg".to_owned());

    let form = reqwest::multipart::Form::new()
        .text("chat_id", chat.to_owned())
        .part(
            "photo",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

    runtime
        .http
        .post(format!("https://api.telegram.org/bot{}/sendPhoto", token))
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}
