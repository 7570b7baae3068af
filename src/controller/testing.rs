// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test double recording every key press.

use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{DeviceError, Result};
use crate::transmitter::Transmit;

#[derive(Debug, Default)]
pub(crate) struct RecordingTransmit {
    sent: Mutex<Vec<(String, Duration)>>,
    fail_after: Option<usize>,
    prepared: Mutex<bool>,
}

impl RecordingTransmit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lets `count` presses through and rejects every later one.
    pub(crate) fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub(crate) fn sent(&self) -> Vec<(String, Duration)> {
        self.sent.lock().clone()
    }

    pub(crate) fn count(&self, command: &str) -> usize {
        self.sent.lock().iter().filter(|(name, _)| name == command).count()
    }

    pub(crate) fn is_prepared(&self) -> bool {
        *self.prepared.lock()
    }
}

impl Transmit for RecordingTransmit {
    async fn transmit(&self, command: &str, end_delay: Duration) -> Result<()> {
        {
            let mut sent = self.sent.lock();
            if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
                return Err(DeviceError::Rejected {
                    command: "WVCHA",
                    code: -1,
                }
                .into());
            }
            sent.push((command.to_string(), end_delay));
        }
        tokio::time::sleep(end_delay).await;
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        *self.prepared.lock() = true;
        Ok(())
    }
}
