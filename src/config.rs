// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller configuration.
//!
//! Every field has a default, so a configuration file only needs the values
//! that differ. Durations are written in milliseconds.
//!
//! ```
//! use bedtime_tv::config::ControllerConfig;
//!
//! let config = ControllerConfig::from_json_str(
//!     r#"{"bedtime_volume": 10, "timings": {"boot_settle": 8000}}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.bedtime_volume.value(), 10);
//! assert_eq!(config.daytime_volume.value(), 25);
//! assert_eq!(config.timings.boot_settle.as_secs(), 8);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{DisplayMode, Volume};
use crate::error::ConfigError;
use crate::power::PowerEventSource;
use crate::protocol::PigpioConfig;
use crate::transmitter::AllocationPolicy;
use crate::waveform::CarrierEncoder;

/// Top-level configuration for a [`DeviceController`](crate::DeviceController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// GPIO driving the infrared LED.
    pub output_pin: u8,
    /// Carrier frequency in kHz.
    pub carrier_khz: f64,
    /// Volume set when switching to bedtime.
    pub bedtime_volume: Volume,
    /// Volume set when switching to daytime.
    pub daytime_volume: Volume,
    /// Volume the TV is assumed to be at on startup.
    ///
    /// Defaults to the daytime volume, which the TV is assumed never to
    /// exceed.
    pub assumed_start_volume: Option<Volume>,
    /// Picture mode the TV is assumed to be in on startup.
    pub initial_display_mode: DisplayMode,
    /// What to do when the output device cannot register a waveform.
    pub allocation_policy: AllocationPolicy,
    /// External process reporting HDMI power events.
    pub power_events: WatcherCommand,
    /// Host running `pigpiod`.
    pub pigpio_host: String,
    /// Port of `pigpiod`.
    pub pigpio_port: u16,
    /// Per-request timeout for `pigpiod`.
    #[serde(with = "millis")]
    pub pigpio_timeout: Duration,
    /// Delays and settle times.
    pub timings: Timings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            output_pin: CarrierEncoder::DEFAULT_PIN,
            carrier_khz: CarrierEncoder::DEFAULT_FREQUENCY_KHZ,
            bedtime_volume: Volume::clamped(15),
            daytime_volume: Volume::clamped(25),
            assumed_start_volume: None,
            initial_display_mode: DisplayMode::Standard,
            allocation_policy: AllocationPolicy::Abort,
            power_events: WatcherCommand::default(),
            pigpio_host: "localhost".to_string(),
            pigpio_port: PigpioConfig::DEFAULT_PORT,
            pigpio_timeout: PigpioConfig::DEFAULT_TIMEOUT,
            timings: Timings::default(),
        }
    }
}

impl ControllerConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the text is invalid or a value is out
    /// of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or
    /// `ConfigError::Json` if it is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Sets the output pin.
    #[must_use]
    pub fn with_output_pin(mut self, pin: u8) -> Self {
        self.output_pin = pin;
        self
    }

    /// Sets the carrier frequency.
    #[must_use]
    pub fn with_carrier_khz(mut self, khz: f64) -> Self {
        self.carrier_khz = khz;
        self
    }

    /// Sets the bedtime and daytime volumes.
    #[must_use]
    pub fn with_volumes(mut self, bedtime: Volume, daytime: Volume) -> Self {
        self.bedtime_volume = bedtime;
        self.daytime_volume = daytime;
        self
    }

    /// Sets the volume the TV is assumed to be at on startup.
    #[must_use]
    pub fn with_assumed_start_volume(mut self, volume: Volume) -> Self {
        self.assumed_start_volume = Some(volume);
        self
    }

    /// Sets the picture mode the TV is assumed to be in on startup.
    #[must_use]
    pub fn with_initial_display_mode(mut self, mode: DisplayMode) -> Self {
        self.initial_display_mode = mode;
        self
    }

    /// Sets the allocation failure policy.
    #[must_use]
    pub fn with_allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.allocation_policy = policy;
        self
    }

    /// Sets the timings.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Returns the volume the volume estimator starts from.
    #[must_use]
    pub fn start_volume(&self) -> Volume {
        self.assumed_start_volume.unwrap_or(self.daytime_volume)
    }

    /// Builds the carrier encoder for the configured pin and frequency.
    ///
    /// # Errors
    ///
    /// Returns error if the pin or frequency is invalid.
    pub fn encoder(&self) -> Result<CarrierEncoder, ConfigError> {
        CarrierEncoder::new(self.output_pin, self.carrier_khz)
    }

    /// Returns the `pigpiod` connection settings.
    #[must_use]
    pub fn pigpio(&self) -> PigpioConfig {
        PigpioConfig::new(self.pigpio_host.clone())
            .with_port(self.pigpio_port)
            .with_timeout(self.pigpio_timeout)
    }

    /// Returns the power event source described by `power_events`.
    #[must_use]
    pub fn power_event_source(&self) -> PowerEventSource {
        PowerEventSource::command(
            self.power_events.program.clone(),
            self.power_events.args.clone(),
        )
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherCommand {
    /// Executable to run.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
}

impl Default for WatcherCommand {
    fn default() -> Self {
        Self {
            program: "tvservice".to_string(),
            args: vec!["-M".to_string()],
        }
    }
}

/// Delays and settle times used by the controller.
///
/// The TV gives no feedback on key presses, so every delay here is a
/// conservative guess at how long the TV needs before the next press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Interval between playback-finished polls.
    #[serde(with = "millis")]
    pub busy_poll: Duration,
    /// Pause after the power key.
    #[serde(with = "millis")]
    pub power_key_delay: Duration,
    /// Hold after the boot flicker before sending anything else.
    #[serde(with = "millis")]
    pub boot_settle: Duration,
    /// Hold when the TV did not report power after the power key.
    #[serde(with = "millis")]
    pub wake_timeout: Duration,
    /// Pause after a volume press that only opens the indicator.
    #[serde(with = "millis")]
    pub volume_wake_delay: Duration,
    /// Pause after a volume press that changes the level.
    #[serde(with = "millis")]
    pub volume_step_delay: Duration,
    /// Extra pause after the wake press of a volume burst.
    #[serde(with = "millis")]
    pub volume_wake_settle: Duration,
    /// Hold after a volume burst until the indicator disappears.
    #[serde(with = "millis")]
    pub volume_indicator_settle: Duration,
    /// Pause after opening the menu.
    #[serde(with = "millis")]
    pub menu_open_delay: Duration,
    /// Pause after each menu navigation press.
    #[serde(with = "millis")]
    pub menu_step_delay: Duration,
    /// Pause after leaving the menu.
    #[serde(with = "millis")]
    pub menu_exit_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            busy_poll: Duration::from_millis(2),
            power_key_delay: Duration::from_millis(100),
            boot_settle: Duration::from_secs(5),
            wake_timeout: Duration::from_secs(10),
            volume_wake_delay: Duration::from_millis(500),
            volume_step_delay: Duration::from_millis(100),
            volume_wake_settle: Duration::from_millis(500),
            volume_indicator_settle: Duration::from_secs(4),
            menu_open_delay: Duration::from_millis(500),
            menu_step_delay: Duration::from_millis(250),
            menu_exit_delay: Duration::from_secs(1),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
