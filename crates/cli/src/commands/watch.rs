// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use offsync_core::{ConnectionState, Envelope, Error as CoreError};
use tokio::sync::watch;

use super::Session;
use crate::channel::ANY_EVENT;
use crate::engine::SyncEngine;
use crate::error::{Error, Result};

pub async fn run(session: &Session, topics: Vec<String>) -> Result<()> {
    let mut config = session.config.clone();
    if config.channel.url.is_none() {
        return Err(Error::NoChannelUrl(session.config_path.display().to_string()));
    }
    if !topics.is_empty() {
        config.channel.topics = topics;
    }

    let engine = SyncEngine::new(&config, session.offline_context()?).await?;
    let Some(channel) = engine.channel() else {
        return Err(Error::NoChannelUrl(session.config_path.display().to_string()));
    };
    channel.add_event_listener(
        ANY_EVENT,
        Arc::new(|envelope: &Envelope| {
            let now = chrono::Local::now().format("%H:%M:%S");
            println!("{now}  {}", format_event(envelope));
        }),
    );
    let mut states = channel.subscribe_state();

    // The queue stays offline; only the channel goes live.
    let (_connectivity, offline) = watch::channel(false);
    engine.start(offline);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let result: Result<()> = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                let status = channel.status();
                match (state, &status.last_error) {
                    (ConnectionState::Disconnected, Some(error)) => eprintln!("{state}: {error}"),
                    _ => eprintln!("{state}"),
                }
                if status.exhausted {
                    break Err(CoreError::ChannelExhausted { attempts: status.reconnect_attempts }.into());
                }
            }
        }
    };
    engine.shutdown();
    result
}

/// `<type>  <data>` with data as compact JSON.
pub(crate) fn format_event(envelope: &Envelope) -> String {
    format!("{}  {}", envelope.kind, envelope.data)
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
