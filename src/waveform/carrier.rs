// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Carrier square-wave generation.

use crate::error::ConfigError;

use super::Pulse;

/// Encodes mark and space durations into GPIO pulses.
///
/// Marks become a square wave at the carrier frequency on the output pin;
/// spaces become a single idle pulse.
///
/// # Examples
///
/// ```
/// use bedtime_tv::waveform::CarrierEncoder;
///
/// let encoder = CarrierEncoder::new(18, 36.0).unwrap();
/// assert_eq!(encoder.pin(), 18);
/// assert!(CarrierEncoder::new(18, 0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrierEncoder {
    pin: u8,
    frequency_khz: f64,
}

impl CarrierEncoder {
    /// Default output GPIO.
    pub const DEFAULT_PIN: u8 = 17;
    /// Default carrier frequency, in kHz.
    pub const DEFAULT_FREQUENCY_KHZ: f64 = 38.0;
    /// Highest carrier frequency accepted, in kHz.
    pub const MAX_FREQUENCY_KHZ: f64 = 500.0;

    /// Creates an encoder for the given output pin and carrier frequency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPin` if `pin` is above 31, or
    /// `ConfigError::InvalidFrequency` if the frequency is not a positive,
    /// finite value up to [`Self::MAX_FREQUENCY_KHZ`].
    pub fn new(pin: u8, frequency_khz: f64) -> Result<Self, ConfigError> {
        if pin > 31 {
            return Err(ConfigError::InvalidPin(pin));
        }
        if !frequency_khz.is_finite()
            || frequency_khz <= 0.0
            || frequency_khz > Self::MAX_FREQUENCY_KHZ
        {
            return Err(ConfigError::InvalidFrequency(frequency_khz));
        }
        Ok(Self { pin, frequency_khz })
    }

    /// Returns the output GPIO.
    #[must_use]
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Returns the carrier frequency in kHz.
    #[must_use]
    pub fn frequency_khz(&self) -> f64 {
        self.frequency_khz
    }

    /// Returns the GPIO bit mask of the output pin.
    #[must_use]
    pub fn pin_mask(&self) -> u32 {
        1 << self.pin
    }

    /// Generates the carrier for a mark of `duration_us`.
    ///
    /// Cycle boundaries are placed at the rounded cumulative cycle time, so
    /// truncation in individual pulse lengths never accumulates. The last
    /// cycle is cut short at `duration_us`; the pulse lengths always sum to
    /// exactly the requested duration. Boundaries are capped at
    /// `duration_us`, so the float casts stay within `u32`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode_mark(&self, duration_us: u32) -> Vec<Pulse> {
        let mask = self.pin_mask();
        let cycle = 1000.0 / self.frequency_khz;
        let half = ((cycle / 2.0).round() as u32).max(1);
        let cycles = (f64::from(duration_us) / cycle).ceil() as u32;

        let mut pulses = Vec::with_capacity(cycles as usize * 2);
        let mut elapsed: u32 = 0;

        for c in 0..cycles {
            if elapsed >= duration_us {
                break;
            }
            let target = ((f64::from(c + 1) * cycle).round() as u32).min(duration_us);
            let length = target.saturating_sub(elapsed);
            if length == 0 {
                continue;
            }
            let on = half.min(length);
            let off = length - on;

            pulses.push(Pulse::new(mask, 0, on));
            if off > 0 {
                pulses.push(Pulse::new(0, mask, off));
            }
            elapsed = target;
        }

        pulses
    }

    /// Generates the idle pulse for a space of `duration_us`.
    #[must_use]
    pub fn encode_space(&self, duration_us: u32) -> Vec<Pulse> {
        if duration_us == 0 {
            Vec::new()
        } else {
            vec![Pulse::idle(duration_us)]
        }
    }
}

impl Default for CarrierEncoder {
    fn default() -> Self {
        Self {
            pin: Self::DEFAULT_PIN,
            frequency_khz: Self::DEFAULT_FREQUENCY_KHZ,
        }
    }
}
