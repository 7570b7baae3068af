// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `bedtime_tv` library.
//!
//! The hierarchy separates local request errors (unknown command, controller
//! not ready), transport failures of the pulse-output device, configuration
//! problems, and the fatal power-synchronization violation.

use thiserror::Error;

use crate::waveform::PulseKind;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested command is not present in the command table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The output device refused to register a waveform.
    #[error("failed to allocate {kind} waveform of {duration_us} us for {command}: {source}")]
    WaveformAllocation {
        /// Command being transmitted.
        command: String,
        /// Whether the waveform was a mark or a space.
        kind: PulseKind,
        /// Duration of the offending waveform.
        duration_us: u32,
        /// Underlying device error.
        #[source]
        source: DeviceError,
    },

    /// The TV did not follow the expected boot flicker while powering on.
    ///
    /// This is fatal: the power-state model can no longer be trusted.
    #[error("power sync violation during {stage}: expected powered={expected_powered}")]
    PowerSyncViolation {
        /// The power reading the protocol expected.
        expected_powered: bool,
        /// Which step of the boot flicker was being observed.
        stage: &'static str,
    },

    /// A public operation was called before `initialize()` completed.
    #[error("controller is not initialized")]
    NotInitialized,

    /// `initialize()` was called twice.
    #[error("controller is already initialized")]
    AlreadyInitialized,

    /// The controller stopped accepting commands after a fatal error.
    #[error("controller halted after a fatal error")]
    Halted,

    /// The power event stream ended while a caller was waiting on it.
    #[error("power monitor stopped")]
    PowerMonitorStopped,

    /// Error reported by the pulse-output device.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A value outside its allowed range.
    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

impl Error {
    /// Returns `true` if the error means the process should terminate.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PowerSyncViolation { .. })
    }
}

/// Errors reported by a pulse-output device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device has no room for another waveform.
    #[error("waveform resources exhausted (code {code})")]
    ResourceExhausted {
        /// Device-specific error code.
        code: i32,
    },

    /// The device rejected a request.
    #[error("{command} rejected with code {code}")]
    Rejected {
        /// Name of the rejected request.
        command: &'static str,
        /// Device-specific error code.
        code: i32,
    },

    /// A waveform handle that the device cannot address.
    #[error("invalid waveform handle {0}")]
    InvalidHandle(u32),

    /// A request took longer than the configured timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// I/O error talking to the device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Carrier frequency must be finite, positive and at most 500 kHz.
    #[error("invalid carrier frequency: {0} kHz")]
    InvalidFrequency(f64),

    /// Output pin must address a GPIO in the first bank (0-31).
    #[error("invalid output pin: {0}")]
    InvalidPin(u8),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u16,
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },

    /// An unrecognized remote key name.
    #[error("invalid remote key: {0}")]
    InvalidKey(String),

    /// An unrecognized display mode name.
    #[error("invalid display mode: {0}")]
    InvalidDisplayMode(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
