// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pulse waveforms for infrared transmission.
//!
//! An infrared command is a list of alternating mark (carrier on) and space
//! (carrier off) durations. This module turns each duration into a list of
//! [`Pulse`]s that a pulse-output device can play back, and keeps track of the
//! waveforms registered with the device during a single transmission.
//!
//! # Examples
//!
//! ```
//! use bedtime_tv::waveform::CarrierEncoder;
//!
//! let encoder = CarrierEncoder::default();
//! let mark = encoder.encode_mark(560);
//! let total: u32 = mark.iter().map(|p| p.duration_us).sum();
//! assert_eq!(total, 560);
//! ```

mod cache;
mod carrier;

pub use cache::WaveformCache;
pub use carrier::CarrierEncoder;

use std::fmt;

/// A single GPIO pulse: pins to assert, pins to deassert, then hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pulse {
    /// Bit mask of GPIOs switched on at the start of the pulse.
    pub on_mask: u32,
    /// Bit mask of GPIOs switched off at the start of the pulse.
    pub off_mask: u32,
    /// How long to hold before the next pulse, in microseconds.
    pub duration_us: u32,
}

impl Pulse {
    /// Creates a new pulse.
    #[must_use]
    pub const fn new(on_mask: u32, off_mask: u32, duration_us: u32) -> Self {
        Self {
            on_mask,
            off_mask,
            duration_us,
        }
    }

    /// A pulse that changes no pins and only waits.
    #[must_use]
    pub const fn idle(duration_us: u32) -> Self {
        Self::new(0, 0, duration_us)
    }
}

/// Whether a timing entry is a carrier burst or a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PulseKind {
    /// Carrier on.
    Mark,
    /// Carrier off.
    Space,
}

impl PulseKind {
    /// Kind of the entry at `index` in a mark-first timing code.
    #[must_use]
    pub const fn at(index: usize) -> Self {
        if index % 2 == 0 { Self::Mark } else { Self::Space }
    }

    /// Returns the lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mark => "mark",
            Self::Space => "space",
        }
    }
}

impl fmt::Display for PulseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a waveform registered with a pulse-output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveHandle(u32);

impl WaveHandle {
    /// Wraps a device-assigned waveform id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the device-assigned id.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WaveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
