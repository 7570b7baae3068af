// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory pulse output.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::DeviceError;
use crate::protocol::PulseOutput;
use crate::waveform::{Pulse, WaveHandle};

/// Error code reported when the simulated waveform capacity is exceeded.
const CAPACITY_EXCEEDED: i32 = -67;

/// A pulse output that keeps everything in memory.
///
/// Every chain is recorded as the total length of each of its waveforms, so a
/// recorded chain for a command with no zero-length entries reads back as the
/// command's own timing code.
///
/// # Examples
///
/// ```
/// use bedtime_tv::protocol::{MemoryOutput, PulseOutput};
/// use bedtime_tv::waveform::Pulse;
///
/// # async fn example() -> Result<(), bedtime_tv::error::DeviceError> {
/// let output = MemoryOutput::new();
/// let handle = output.define_waveform(&[Pulse::idle(4500)]).await?;
/// output.chain(&[handle]).await?;
/// assert_eq!(output.chains(), vec![vec![4500]]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryOutput {
    inner: Mutex<MemoryOutputInner>,
}

#[derive(Debug, Default)]
struct MemoryOutputInner {
    next_id: u32,
    waves: HashMap<WaveHandle, Vec<Pulse>>,
    capacity: Option<usize>,
    busy_polls: u32,
    remaining_busy: u32,
    reject_chains: bool,
    chains: Vec<Vec<u32>>,
    defined: usize,
    released: usize,
    busy_checks: usize,
    output_pin: Option<u8>,
}

impl MemoryOutput {
    /// Creates an output with unlimited capacity that finishes chains instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits how many waveforms may be registered at once.
    #[must_use]
    pub fn with_capacity(self, capacity: usize) -> Self {
        self.inner.lock().capacity = Some(capacity);
        self
    }

    /// Reports busy for this many polls after each chain.
    #[must_use]
    pub fn with_busy_polls(self, polls: u32) -> Self {
        self.inner.lock().busy_polls = polls;
        self
    }

    /// Rejects every chain request.
    #[must_use]
    pub fn rejecting_chains(self) -> Self {
        self.inner.lock().reject_chains = true;
        self
    }

    /// Returns every chain played so far, as waveform lengths in microseconds.
    #[must_use]
    pub fn chains(&self) -> Vec<Vec<u32>> {
        self.inner.lock().chains.clone()
    }

    /// Returns the number of waveforms currently registered.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.inner.lock().waves.len()
    }

    /// Returns how many waveforms were ever registered.
    #[must_use]
    pub fn defined_count(&self) -> usize {
        self.inner.lock().defined
    }

    /// Returns how many waveforms were released.
    #[must_use]
    pub fn released_count(&self) -> usize {
        self.inner.lock().released
    }

    /// Returns how many times the busy state was queried.
    #[must_use]
    pub fn busy_checks(&self) -> usize {
        self.inner.lock().busy_checks
    }

    /// Returns the pin last configured as output.
    #[must_use]
    pub fn output_pin(&self) -> Option<u8> {
        self.inner.lock().output_pin
    }
}

impl PulseOutput for MemoryOutput {
    async fn define_waveform(&self, pulses: &[Pulse]) -> Result<WaveHandle, DeviceError> {
        let mut inner = self.inner.lock();
        if inner.capacity.is_some_and(|cap| inner.waves.len() >= cap) {
            return Err(DeviceError::ResourceExhausted {
                code: CAPACITY_EXCEEDED,
            });
        }

        let handle = WaveHandle::new(inner.next_id);
        inner.next_id += 1;
        inner.defined += 1;
        inner.waves.insert(handle, pulses.to_vec());
        Ok(handle)
    }

    async fn chain(&self, handles: &[WaveHandle]) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        if inner.reject_chains {
            return Err(DeviceError::Rejected {
                command: "chain",
                code: -1,
            });
        }

        let mut lengths: Vec<u32> = Vec::with_capacity(handles.len());
        for handle in handles {
            let pulses = inner
                .waves
                .get(handle)
                .ok_or(DeviceError::InvalidHandle(handle.id()))?;
            lengths.push(pulses.iter().map(|p| p.duration_us).sum());
        }

        inner.chains.push(lengths);
        inner.remaining_busy = inner.busy_polls;
        Ok(())
    }

    async fn is_busy(&self) -> Result<bool, DeviceError> {
        let mut inner = self.inner.lock();
        inner.busy_checks += 1;
        if inner.remaining_busy > 0 {
            inner.remaining_busy -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release(&self, handle: WaveHandle) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        inner
            .waves
            .remove(&handle)
            .ok_or(DeviceError::InvalidHandle(handle.id()))?;
        inner.released += 1;
        Ok(())
    }

    async fn set_output_mode(&self, pin: u8) -> Result<(), DeviceError> {
        self.inner.lock().output_pin = Some(pin);
        Ok(())
    }
}
