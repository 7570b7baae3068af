// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state snapshot and reader handle.

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Latest power reading reported by the power monitor.
///
/// `last_change` and `sequence` advance on every reported event, even when
/// the reading repeats the previous value: the power-on protocol waits for
/// events, not for value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    /// Whether the TV was last reported as powered.
    pub powered: bool,
    /// When the last event was observed.
    pub last_change: Instant,
    /// Number of events observed so far.
    pub sequence: u64,
}

impl PowerState {
    /// Creates a state that has seen no events yet.
    #[must_use]
    pub fn new(powered: bool) -> Self {
        Self {
            powered,
            last_change: Instant::now(),
            sequence: 0,
        }
    }

    /// Records an event observed at `at`.
    pub fn record(&mut self, powered: bool, at: Instant) {
        self.powered = powered;
        self.last_change = at;
        self.sequence += 1;
    }
}

/// Read side of the power state.
///
/// Cheap to clone; every clone sees the same state.
#[derive(Debug)]
pub struct PowerWatch {
    rx: watch::Receiver<PowerState>,
    events: broadcast::Receiver<PowerState>,
}

impl Clone for PowerWatch {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            events: self.events.resubscribe(),
        }
    }
}

impl PowerWatch {
    pub(crate) fn new(
        rx: watch::Receiver<PowerState>,
        events: broadcast::Receiver<PowerState>,
    ) -> Self {
        Self { rx, events }
    }

    /// Starts receiving every event reported from now on.
    ///
    /// Unlike [`wait_for_change`](Self::wait_for_change), a subscription
    /// keeps events that arrive close together apart.
    #[must_use]
    pub fn subscribe(&self) -> PowerEvents {
        PowerEvents {
            rx: self.events.resubscribe(),
        }
    }

    /// Returns the current state without waiting.
    #[must_use]
    pub fn snapshot(&self) -> PowerState {
        *self.rx.borrow()
    }

    /// Returns whether the TV was last reported as powered.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.rx.borrow().powered
    }

    /// Waits for the first event after `since` (a previously seen
    /// [`PowerState::sequence`]) and returns the state it produced.
    ///
    /// Returns immediately if such an event has already happened. There is no
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::PowerMonitorStopped` if the monitor exits before an
    /// event arrives.
    pub async fn wait_for_change(&self, since: u64) -> Result<PowerState> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|state| state.sequence != since)
            .await
            .map_err(|_| Error::PowerMonitorStopped)?;
        Ok(*state)
    }
}

/// Ordered stream of power readings, one per reported event.
#[derive(Debug)]
pub struct PowerEvents {
    rx: broadcast::Receiver<PowerState>,
}

impl PowerEvents {
    /// Waits for the next event and returns the state it produced.
    ///
    /// # Errors
    ///
    /// Returns `Error::PowerMonitorStopped` once the monitor has exited and
    /// every buffered event has been read.
    pub async fn next(&mut self) -> Result<PowerState> {
        loop {
            match self.rx.recv().await {
                Ok(state) => return Ok(state),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Power events dropped before they were read");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::PowerMonitorStopped);
                }
            }
        }
    }
}
