//! Hardware events and the console event source
//!
//! The real device transport is outside this crate. For running the bridge
//! without hardware, [`spawn_console_source`] reads one event per line from
//! stdin:
//!
//! ```text
//! down <context>
//! up <context>
//! rotate <context> <ticks>     negative ticks turn left
//! dialdown <context>
//! dialup <context>
//! tap <context>
//! ```

use super::error::BridgeError;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    Down { context: String },
    Up { context: String },
    DialRotate { context: String, ticks: i32 },
    DialDown { context: String },
    DialUp { context: String },
    TouchTap { context: String },
}

impl HardwareEvent {
    pub fn context(&self) -> &str {
        match self {
            HardwareEvent::Down { context }
            | HardwareEvent::Up { context }
            | HardwareEvent::DialRotate { context, .. }
            | HardwareEvent::DialDown { context }
            | HardwareEvent::DialUp { context }
            | HardwareEvent::TouchTap { context } => context,
        }
    }
}

impl FromStr for HardwareEvent {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidEvent(s.trim().to_string());
        let mut parts = s.split_whitespace();
        let verb = parts.next().ok_or_else(invalid)?.to_ascii_lowercase();
        let context = parts.next().ok_or_else(invalid)?.to_string();

        let event = match verb.as_str() {
            "down" => HardwareEvent::Down { context },
            "up" => HardwareEvent::Up { context },
            "rotate" => {
                let ticks = parts
                    .next()
                    .and_then(|t| t.parse::<i32>().ok())
                    .ok_or_else(invalid)?;
                HardwareEvent::DialRotate { context, ticks }
            }
            "dialdown" => HardwareEvent::DialDown { context },
            "dialup" => HardwareEvent::DialUp { context },
            "tap" => HardwareEvent::TouchTap { context },
            _ => return Err(invalid()),
        };

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(event)
    }
}

/// Reads events from stdin until EOF or until the receiver is dropped
pub fn spawn_console_source(events: mpsc::Sender<HardwareEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Reading hardware events from stdin");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<HardwareEvent>() {
                Ok(event) => {
                    debug!("Console event: {:?}", event);
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }

        info!("Console event source finished");
    })
}
