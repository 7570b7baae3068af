// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Volume level type and the key-press counting estimator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::RemoteKey;
use crate::config::Timings;
use crate::error::{Result, ValueError};
use crate::transmitter::Transmit;

/// TV volume level (0-100).
///
/// # Examples
///
/// ```
/// use bedtime_tv::controller::Volume;
///
/// let volume = Volume::new(25).unwrap();
/// assert_eq!(volume.value(), 25);
/// assert_eq!(volume.to_string(), "25");
///
/// assert!(Volume::new(101).is_err());
/// assert_eq!(Volume::clamped(180), Volume::MAX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Volume(u8);

impl Volume {
    /// Muted.
    pub const MIN: Self = Self(0);

    /// Loudest level the TV accepts.
    pub const MAX: Self = Self(100);

    /// Creates a volume level.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value exceeds 100.
    pub fn new(value: u8) -> std::result::Result<Self, ValueError> {
        if value > Self::MAX.0 {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: 100,
                actual: u16::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Creates a volume level, clamping values above 100.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value > 100 { Self(100) } else { Self(value) }
    }

    /// Returns the level.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// One step louder, saturating at [`Volume::MAX`].
    #[must_use]
    pub const fn step_up(self) -> Self {
        Self::clamped(self.0.saturating_add(1))
    }

    /// One step quieter, saturating at [`Volume::MIN`].
    #[must_use]
    pub const fn step_down(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Number of steps between two levels.
    #[must_use]
    pub const fn distance(self, other: Self) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Volume {
    type Error = ValueError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Volume> for u8 {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}

/// Direction of a volume key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    const fn key(self) -> RemoteKey {
        match self {
            Self::Up => RemoteKey::VolumeUp,
            Self::Down => RemoteKey::VolumeDown,
        }
    }

    const fn apply(self, volume: Volume) -> Volume {
        match self {
            Self::Up => volume.step_up(),
            Self::Down => volume.step_down(),
        }
    }
}

/// Tracks the TV volume by counting key presses.
///
/// The TV never reports its volume, so the estimate is only as good as the
/// assumption that every press was received. Drift is not detected.
///
/// The first volume press after a pause only opens the on-screen indicator.
/// Single steps therefore send two presses; [`set_volume`](Self::set_volume)
/// sends one wake press for the whole burst.
#[derive(Debug, Clone)]
pub struct VolumeEstimator {
    current: Volume,
    batch: bool,
    timings: Timings,
}

impl VolumeEstimator {
    /// Creates an estimator that assumes the TV is at `current`.
    #[must_use]
    pub fn new(current: Volume, timings: Timings) -> Self {
        Self {
            current,
            batch: false,
            timings,
        }
    }

    /// Returns the estimated volume.
    #[must_use]
    pub fn current(&self) -> Volume {
        self.current
    }

    /// Raises the volume by one step.
    ///
    /// # Errors
    ///
    /// Returns the transmission error; the estimate is unchanged.
    pub async fn increase_volume<T: Transmit>(&mut self, transmitter: &T) -> Result<()> {
        self.step(transmitter, Direction::Up).await
    }

    /// Lowers the volume by one step.
    ///
    /// # Errors
    ///
    /// Returns the transmission error; the estimate is unchanged.
    pub async fn decrease_volume<T: Transmit>(&mut self, transmitter: &T) -> Result<()> {
        self.step(transmitter, Direction::Down).await
    }

    /// Drives the volume to `target`.
    ///
    /// Sends `|current - target| + 1` presses and then waits for the
    /// indicator to close. Does nothing when already at `target`.
    ///
    /// # Errors
    ///
    /// Returns the first transmission error. Steps sent before the failure
    /// stay counted.
    pub async fn set_volume<T: Transmit>(&mut self, transmitter: &T, target: Volume) -> Result<()> {
        if self.current == target {
            tracing::debug!(volume = %target, "Volume already at target");
            return Ok(());
        }

        let direction = if target > self.current {
            Direction::Up
        } else {
            Direction::Down
        };
        tracing::debug!(current = %self.current, %target, ?direction, "Adjusting volume");

        // Opens the indicator only; not counted.
        transmitter
            .transmit(direction.key().as_str(), self.timings.volume_step_delay)
            .await?;
        tokio::time::sleep(self.timings.volume_wake_settle).await;

        self.batch = true;
        let outcome = self.step_to(transmitter, direction, target).await;
        self.batch = false;
        outcome?;

        tokio::time::sleep(self.timings.volume_indicator_settle).await;
        tracing::info!(volume = %self.current, "Volume set");
        Ok(())
    }

    async fn step_to<T: Transmit>(
        &mut self,
        transmitter: &T,
        direction: Direction,
        target: Volume,
    ) -> Result<()> {
        while self.current != target {
            tracing::trace!(current = %self.current, %target, "Volume step");
            self.step(transmitter, direction).await?;
        }
        Ok(())
    }

    async fn step<T: Transmit>(&mut self, transmitter: &T, direction: Direction) -> Result<()> {
        let key = direction.key().as_str();
        if !self.batch {
            transmitter
                .transmit(key, self.timings.volume_wake_delay)
                .await?;
        }
        transmitter
            .transmit(key, self.timings.volume_step_delay)
            .await?;
        self.current = direction.apply(self.current);
        Ok(())
    }
}

/// Volumes applied by the bedtime and daytime routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTargets {
    /// Volume after switching to bedtime.
    pub bedtime: Volume,
    /// Volume after switching to daytime.
    pub daytime: Volume,
}

impl VolumeTargets {
    /// Applies a partial update, keeping fields it leaves out.
    pub fn apply(&mut self, update: &ConfigurationUpdate) {
        if let Some(bedtime) = update.bedtime_volume {
            self.bedtime = bedtime;
        }
        if let Some(daytime) = update.daytime_volume {
            self.daytime = daytime;
        }
    }
}

/// Partial update of the volume targets.
///
/// # Examples
///
/// ```
/// use bedtime_tv::controller::ConfigurationUpdate;
///
/// let update: ConfigurationUpdate = serde_json::from_str(r#"{"bedtime_volume": 8}"#).unwrap();
/// assert_eq!(update.bedtime_volume.map(|v| v.value()), Some(8));
/// assert!(update.daytime_volume.is_none());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationUpdate {
    /// New bedtime volume.
    pub bedtime_volume: Option<Volume>,
    /// New daytime volume.
    pub daytime_volume: Option<Volume>,
}

impl ConfigurationUpdate {
    /// Sets the bedtime volume.
    #[must_use]
    pub fn with_bedtime_volume(mut self, volume: Volume) -> Self {
        self.bedtime_volume = Some(volume);
        self
    }

    /// Sets the daytime volume.
    #[must_use]
    pub fn with_daytime_volume(mut self, volume: Volume) -> Self {
        self.daytime_volume = Some(volume);
        self
    }
}
