// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-transmission waveform registry.

use std::collections::HashMap;

use crate::error::DeviceError;
use crate::protocol::PulseOutput;

use super::{CarrierEncoder, PulseKind, WaveHandle};

/// Waveforms registered with the device during one transmission.
///
/// Infrared codes repeat the same few durations many times, so each distinct
/// (kind, duration) pair is encoded and registered once and its handle reused
/// in the chain. Marks and spaces live in separate namespaces: a 560 us mark
/// and a 560 us space are different waveforms.
///
/// A cache must not outlive the transmission that filled it; call
/// [`release_all`](Self::release_all) before dropping it, or hand its
/// handles to someone who will with [`take_handles`](Self::take_handles).
#[derive(Debug, Default)]
pub struct WaveformCache {
    entries: HashMap<(PulseKind, u32), WaveHandle>,
}

impl WaveformCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered waveforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a registered waveform.
    #[must_use]
    pub fn get(&self, kind: PulseKind, duration_us: u32) -> Option<WaveHandle> {
        self.entries.get(&(kind, duration_us)).copied()
    }

    /// Returns the handle for `(kind, duration_us)`, encoding and registering
    /// the waveform on first use.
    ///
    /// # Errors
    ///
    /// Returns the device error if registration fails. Nothing is cached in
    /// that case.
    pub async fn get_or_define<D: PulseOutput>(
        &mut self,
        device: &D,
        encoder: &CarrierEncoder,
        kind: PulseKind,
        duration_us: u32,
    ) -> Result<WaveHandle, DeviceError> {
        if let Some(handle) = self.get(kind, duration_us) {
            return Ok(handle);
        }

        let pulses = match kind {
            PulseKind::Mark => encoder.encode_mark(duration_us),
            PulseKind::Space => encoder.encode_space(duration_us),
        };
        let handle = device.define_waveform(&pulses).await?;
        tracing::trace!(
            %kind,
            duration_us,
            pulses = pulses.len(),
            handle = %handle,
            "Registered waveform"
        );

        self.entries.insert((kind, duration_us), handle);
        Ok(handle)
    }

    /// Removes every handle without releasing it.
    pub fn take_handles(&mut self) -> Vec<WaveHandle> {
        self.entries.drain().map(|(_, handle)| handle).collect()
    }

    /// Releases every registered waveform and empties the cache.
    ///
    /// Release failures are logged and skipped. Returns the number of
    /// waveforms released successfully. If the future is dropped part way,
    /// the handles not yet released stay in the cache.
    pub async fn release_all<D: PulseOutput>(&mut self, device: &D) -> usize {
        let mut released = 0;
        loop {
            let Some((&(kind, duration_us), &handle)) = self.entries.iter().next() else {
                break;
            };
            let result = device.release(handle).await;
            self.entries.remove(&(kind, duration_us));
            match result {
                Ok(()) => released += 1,
                Err(e) => tracing::warn!(
                    %kind,
                    duration_us,
                    handle = %handle,
                    error = %e,
                    "Failed to release waveform"
                ),
            }
        }
        released
    }
}
