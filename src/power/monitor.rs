// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background reader of HDMI power events.

use std::fmt;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{PowerState, PowerWatch};

/// Prefix of every event line printed by the watcher.
const EVENT_MARKER: char = '[';

/// Events buffered for each subscriber.
const EVENT_CAPACITY: usize = 16;

/// A power transition reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// The HDMI cable reads as unplugged: the TV is off.
    Unplugged,
    /// A display is attached: the TV is on.
    Attached,
}

impl PowerEvent {
    /// Returns the power reading this event implies.
    #[must_use]
    pub const fn powered(&self) -> bool {
        matches!(self, Self::Attached)
    }
}

/// Classification of one watcher output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// A recognized power event.
    Event(PowerEvent),
    /// An event line that is not about power.
    Unrecognized,
    /// Not an event line at all.
    Ignored,
}

impl LineKind {
    /// Classifies a line of watcher output.
    ///
    /// # Examples
    ///
    /// ```
    /// use bedtime_tv::power::{LineKind, PowerEvent};
    ///
    /// assert_eq!(
    ///     LineKind::classify("[I] HDMI cable is unplugged"),
    ///     LineKind::Event(PowerEvent::Unplugged)
    /// );
    /// assert_eq!(
    ///     LineKind::classify("[I] HDMI is attached"),
    ///     LineKind::Event(PowerEvent::Attached)
    /// );
    /// assert_eq!(LineKind::classify("[I] HDMI in DVI mode"), LineKind::Unrecognized);
    /// assert_eq!(LineKind::classify("Starting to monitor"), LineKind::Ignored);
    /// ```
    #[must_use]
    pub fn classify(line: &str) -> Self {
        let line = line.trim().to_lowercase();
        if !line.starts_with(EVENT_MARKER) {
            return Self::Ignored;
        }
        if line.contains("unplugged") {
            Self::Event(PowerEvent::Unplugged)
        } else if line.contains("is attached") {
            Self::Event(PowerEvent::Attached)
        } else {
            Self::Unrecognized
        }
    }
}

/// Where the power monitor reads its events from.
pub enum PowerEventSource {
    /// Spawn a watcher process and read its standard output.
    Command {
        /// Executable to run.
        program: String,
        /// Arguments passed to the executable.
        args: Vec<String>,
    },
    /// Read from an already open stream.
    Reader(Box<dyn AsyncBufRead + Send + Unpin>),
}

impl PowerEventSource {
    /// The Raspberry Pi `tvservice -M` monitor.
    #[must_use]
    pub fn tvservice() -> Self {
        Self::command("tvservice", vec!["-M".to_string()])
    }

    /// A watcher process.
    #[must_use]
    pub fn command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self::Command {
            program: program.into(),
            args,
        }
    }

    /// An open stream of watcher lines.
    #[must_use]
    pub fn reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }
}

impl fmt::Debug for PowerEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { program, args } => f
                .debug_struct("Command")
                .field("program", program)
                .field("args", args)
                .finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Writer of the shared [`PowerState`].
///
/// Created together with its [`PowerWatch`]; nothing is read until
/// [`spawn`](Self::spawn) is called.
#[derive(Debug)]
pub struct PowerMonitor {
    state: Publisher,
    source: PowerEventSource,
}

impl PowerMonitor {
    /// Creates a monitor and the watch handle that reads its state.
    #[must_use]
    pub fn new(source: PowerEventSource, initially_powered: bool) -> (Self, PowerWatch) {
        let (state, rx) = watch::channel(PowerState::new(initially_powered));
        let (events, events_rx) = broadcast::channel(EVENT_CAPACITY);
        let monitor = Self {
            state: Publisher { state, events },
            source,
        };
        (monitor, PowerWatch::new(rx, events_rx))
    }

    /// Starts reading events on a background task.
    ///
    /// The task ends when the stream ends or fails; the watch handle then
    /// reports the monitor as stopped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Applies one line of watcher output to the state.
    ///
    /// Returns the event the line carried, if any.
    pub fn observe(&self, line: &str) -> Option<PowerEvent> {
        apply_line(&self.state, line)
    }

    async fn run(self) {
        let Self { state, source } = self;
        tracing::info!(?source, "Starting power monitor");

        match source {
            PowerEventSource::Reader(reader) => read_lines(&state, reader).await,
            PowerEventSource::Command { program, args } => {
                let spawned = Command::new(&program)
                    .args(&args)
                    .stdout(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn();
                let mut child = match spawned {
                    Ok(child) => child,
                    Err(e) => {
                        tracing::error!(%program, error = %e, "Failed to start power watcher");
                        return;
                    }
                };
                let Some(stdout) = child.stdout.take() else {
                    tracing::error!(%program, "Power watcher has no stdout");
                    return;
                };
                read_lines(&state, BufReader::new(stdout)).await;
            }
        }

        tracing::error!("Power monitor stopped; power state will no longer update");
    }
}

/// Both channels written for every event.
#[derive(Debug)]
struct Publisher {
    state: watch::Sender<PowerState>,
    events: broadcast::Sender<PowerState>,
}

impl Publisher {
    fn publish(&self, powered: bool) {
        self.state
            .send_modify(|state| state.record(powered, Instant::now()));
        // Fails only when nobody subscribed.
        let _ = self.events.send(*self.state.borrow());
    }
}

fn apply_line(publisher: &Publisher, line: &str) -> Option<PowerEvent> {
    match LineKind::classify(line) {
        LineKind::Event(event) => {
            let powered = event.powered();
            publisher.publish(powered);
            if powered {
                tracing::info!("Watcher reported the TV turned on");
            } else {
                tracing::info!("Watcher reported the TV turned off");
            }
            Some(event)
        }
        LineKind::Unrecognized => {
            tracing::warn!(line = %line.trim(), "Unexpected power monitor message");
            None
        }
        LineKind::Ignored => None,
    }
}

async fn read_lines<R: AsyncBufRead + Unpin>(publisher: &Publisher, mut reader: R) {
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                tracing::warn!("Power event stream closed");
                break;
            }
            Ok(_) => {
                // Watcher output is not guaranteed to be UTF-8.
                apply_line(publisher, &String::from_utf8_lossy(&line));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read power event stream");
                break;
            }
        }
    }
}
