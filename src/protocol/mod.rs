// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pulse-output device implementations.
//!
//! A pulse-output device plays back GPIO pulse sequences with microsecond
//! timing. The transmitter only needs the handful of operations in
//! [`PulseOutput`]; this module provides two implementations:
//!
//! - [`PigpioClient`]: talks to a `pigpiod` daemon over its socket interface
//! - [`MemoryOutput`]: records everything in memory, for dry runs and tests

mod memory;
mod pigpio;

pub use memory::MemoryOutput;
pub use pigpio::{PigpioClient, PigpioConfig};

use crate::error::DeviceError;
use crate::waveform::{Pulse, WaveHandle};

/// Trait for devices that can register and play back pulse waveforms.
///
/// Only one chain may play at a time. Handles are only valid until released.
#[allow(async_fn_in_trait)]
pub trait PulseOutput {
    /// Registers a waveform and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ResourceExhausted` if the device has no room for
    /// another waveform, or a transport error.
    async fn define_waveform(&self, pulses: &[Pulse]) -> Result<WaveHandle, DeviceError>;

    /// Starts playing the given waveforms back to back.
    ///
    /// # Errors
    ///
    /// Returns error if a handle is unknown or the device rejects the chain.
    async fn chain(&self, handles: &[WaveHandle]) -> Result<(), DeviceError>;

    /// Returns `true` while a chain is still playing.
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be queried.
    async fn is_busy(&self) -> Result<bool, DeviceError>;

    /// Frees a registered waveform.
    ///
    /// # Errors
    ///
    /// Returns error if the handle is unknown or the device cannot be reached.
    async fn release(&self, handle: WaveHandle) -> Result<(), DeviceError>;

    /// Configures `pin` as an output.
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the pin.
    async fn set_output_mode(&self, pin: u8) -> Result<(), DeviceError>;
}
