// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Infrared command transmission.
//!
//! [`TransmissionScheduler`] sends one command at a time: it encodes the
//! command's marks and spaces, registers each distinct waveform once, chains
//! them for playback, waits for the device to drain, releases the waveforms
//! and finally holds for the caller's settle time.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use bedtime_tv::command::CommandTable;
//! use bedtime_tv::protocol::MemoryOutput;
//! use bedtime_tv::transmitter::TransmissionScheduler;
//!
//! # async fn example() -> bedtime_tv::Result<()> {
//! let commands = CommandTable::new().with_command("KEY_POWER", vec![9000, 4500, 560, 560]);
//! let scheduler = TransmissionScheduler::new(MemoryOutput::new(), commands);
//!
//! scheduler.transmit("KEY_POWER", Duration::from_millis(100)).await?;
//! assert_eq!(scheduler.device().chains(), vec![vec![9000, 4500, 560, 560]]);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::command::{CommandCode, CommandTable};
use crate::error::{Error, Result};
use crate::protocol::PulseOutput;
use crate::waveform::{CarrierEncoder, WaveHandle, WaveformCache};

/// Capability to send a named command with a trailing settle time.
///
/// The controller only depends on this trait, so its state machines can be
/// driven by anything that can press a key.
#[allow(async_fn_in_trait)]
pub trait Transmit {
    /// Sends `command` and then waits `end_delay`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownCommand` if the command does not exist, or the
    /// error of the underlying device.
    async fn transmit(&self, command: &str, end_delay: Duration) -> Result<()>;

    /// Prepares the hardware before the first transmission.
    ///
    /// # Errors
    ///
    /// Returns error if the hardware cannot be configured.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }
}

/// What to do when the device refuses to register a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Send nothing and report `Error::WaveformAllocation`.
    #[default]
    Abort,
    /// Leave the waveform out of the chain and send the rest.
    ///
    /// The transmitted code is incomplete and will usually not be understood
    /// by the TV.
    SkipWaveform,
}

/// Sends infrared commands through a [`PulseOutput`].
///
/// Transmissions are serialized: a second `transmit` waits until the first
/// has finished, including its end delay.
///
/// A transmission whose future is dropped cannot release its waveforms on
/// the spot. They are kept in an orphan list and released at the start of
/// the next transmission, or by [`release_orphaned`](Self::release_orphaned).
#[derive(Debug)]
pub struct TransmissionScheduler<D> {
    device: D,
    commands: CommandTable,
    encoder: CarrierEncoder,
    policy: AllocationPolicy,
    busy_poll: Duration,
    in_flight: Mutex<()>,
    orphaned: parking_lot::Mutex<Vec<WaveHandle>>,
}

/// Waveforms of the running transmission.
///
/// Whatever is still registered when this is dropped goes to the orphan
/// list.
struct Registered<'a> {
    cache: WaveformCache,
    orphaned: &'a parking_lot::Mutex<Vec<WaveHandle>>,
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        if self.cache.is_empty() {
            return;
        }
        let handles = self.cache.take_handles();
        tracing::warn!(
            count = handles.len(),
            "Transmission cancelled; waveforms will be released by the next one"
        );
        self.orphaned.lock().extend(handles);
    }
}

impl<D: PulseOutput> TransmissionScheduler<D> {
    /// Default interval between playback-finished polls.
    pub const DEFAULT_BUSY_POLL: Duration = Duration::from_millis(2);

    /// Creates a scheduler with the default encoder and policy.
    #[must_use]
    pub fn new(device: D, commands: CommandTable) -> Self {
        Self {
            device,
            commands,
            encoder: CarrierEncoder::default(),
            policy: AllocationPolicy::default(),
            busy_poll: Self::DEFAULT_BUSY_POLL,
            in_flight: Mutex::new(()),
            orphaned: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Sets the carrier encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: CarrierEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Sets the allocation failure policy.
    #[must_use]
    pub fn with_allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the interval between playback-finished polls.
    #[must_use]
    pub fn with_busy_poll(mut self, interval: Duration) -> Self {
        self.busy_poll = interval;
        self
    }

    /// Returns the output device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Returns the command table.
    #[must_use]
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Returns the carrier encoder.
    #[must_use]
    pub fn encoder(&self) -> &CarrierEncoder {
        &self.encoder
    }

    /// Returns the names of all commands that can be sent.
    pub fn supported_commands(&self) -> impl Iterator<Item = &str> {
        self.commands.names()
    }

    /// Returns how many waveforms cancelled transmissions left registered.
    #[must_use]
    pub fn orphaned_count(&self) -> usize {
        self.orphaned.lock().len()
    }

    /// Releases the waveforms left registered by cancelled transmissions.
    ///
    /// Waits for a running transmission to finish first. Returns the number
    /// released successfully.
    pub async fn release_orphaned(&self) -> usize {
        let _in_flight = self.in_flight.lock().await;
        self.reclaim().await
    }

    /// Sends one command and waits `end_delay` afterwards.
    ///
    /// Every waveform registered for the command is released before this
    /// returns, whether or not the transmission succeeded. Waveforms left
    /// behind by an earlier cancelled transmission are released first.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownCommand` if the command is not in the table,
    /// `Error::WaveformAllocation` if a waveform cannot be registered under
    /// [`AllocationPolicy::Abort`], or `Error::Device` if chaining or polling
    /// fails.
    pub async fn transmit(&self, command: &str, end_delay: Duration) -> Result<()> {
        let code = self
            .commands
            .get(command)
            .ok_or_else(|| Error::UnknownCommand(command.to_string()))?;

        let _in_flight = self.in_flight.lock().await;
        self.reclaim().await;

        let mut registered = Registered {
            cache: WaveformCache::new(),
            orphaned: &self.orphaned,
        };
        let outcome = self.send(command, code, &mut registered.cache).await;
        let released = registered.cache.release_all(&self.device).await;
        drop(registered);
        tracing::trace!(command, released, "Released waveforms");
        outcome?;

        if !end_delay.is_zero() {
            tokio::time::sleep(end_delay).await;
        }
        Ok(())
    }

    /// Releases orphaned waveforms; the caller holds `in_flight`.
    async fn reclaim(&self) -> usize {
        let mut released = 0;
        loop {
            let Some(handle) = self.orphaned.lock().last().copied() else {
                break;
            };
            let result = self.device.release(handle).await;
            self.orphaned.lock().pop();
            match result {
                Ok(()) => released += 1,
                Err(e) => tracing::warn!(
                    handle = %handle,
                    error = %e,
                    "Failed to release orphaned waveform"
                ),
            }
        }
        if released > 0 {
            tracing::debug!(released, "Released waveforms of a cancelled transmission");
        }
        released
    }

    async fn send(
        &self,
        command: &str,
        code: &CommandCode,
        cache: &mut WaveformCache,
    ) -> Result<()> {
        let emit_at = Instant::now();
        let chain = self.compile(command, code, cache).await?;
        let lag = emit_at.elapsed();

        if chain.is_empty() {
            tracing::debug!(command, "Nothing to send");
            return Ok(());
        }

        tracing::debug!(
            command,
            waves = chain.len(),
            distinct = cache.len(),
            lag_us = u64::try_from(lag.as_micros()).unwrap_or(u64::MAX),
            "Sending command"
        );

        self.device.chain(&chain).await?;
        while self.device.is_busy().await? {
            tokio::time::sleep(self.busy_poll).await;
        }
        Ok(())
    }

    async fn compile(
        &self,
        command: &str,
        code: &CommandCode,
        cache: &mut WaveformCache,
    ) -> Result<Vec<WaveHandle>> {
        let mut chain = Vec::with_capacity(code.len());

        for (kind, duration_us) in code.entries() {
            if duration_us == 0 {
                continue;
            }
            match cache
                .get_or_define(&self.device, &self.encoder, kind, duration_us)
                .await
            {
                Ok(handle) => chain.push(handle),
                Err(source) => {
                    tracing::error!(
                        command,
                        %kind,
                        duration_us,
                        error = %source,
                        "Failed to generate waveform"
                    );
                    match self.policy {
                        AllocationPolicy::Abort => {
                            return Err(Error::WaveformAllocation {
                                command: command.to_string(),
                                kind,
                                duration_us,
                                source,
                            });
                        }
                        AllocationPolicy::SkipWaveform => {}
                    }
                }
            }
        }

        Ok(chain)
    }
}

impl<D: PulseOutput> Transmit for TransmissionScheduler<D> {
    async fn transmit(&self, command: &str, end_delay: Duration) -> Result<()> {
        TransmissionScheduler::transmit(self, command, end_delay).await
    }

    async fn prepare(&self) -> Result<()> {
        self.device.set_output_mode(self.encoder.pin()).await?;
        tracing::debug!(pin = self.encoder.pin(), "Configured infrared output pin");
        Ok(())
    }
}
