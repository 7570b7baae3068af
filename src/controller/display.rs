// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Picture mode tracking.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::RemoteKey;
use crate::config::Timings;
use crate::error::{Result, ValueError};
use crate::transmitter::Transmit;

/// Picture mode of the TV.
///
/// # Examples
///
/// ```
/// use bedtime_tv::controller::DisplayMode;
///
/// let mode: DisplayMode = "custom".parse().unwrap();
/// assert_eq!(mode, DisplayMode::Custom);
/// assert_eq!(mode.as_str(), "CUSTOM");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayMode {
    /// Factory picture settings.
    #[default]
    Standard,
    /// Dimmed settings used at night.
    Custom,
}

impl DisplayMode {
    /// Returns the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Custom => "CUSTOM",
        }
    }

    /// Key that moves the mode selector from the other mode to this one.
    const fn selector_key(self) -> RemoteKey {
        match self {
            Self::Standard => RemoteKey::Up,
            Self::Custom => RemoteKey::Down,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = ValueError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STANDARD" => Ok(Self::Standard),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(ValueError::InvalidDisplayMode(s.to_string())),
        }
    }
}

/// Switches the picture mode through the on-screen menu.
///
/// The menu sequence is sent blind. If a press is lost the TV ends up in a
/// different mode than the one recorded here.
#[derive(Debug, Clone)]
pub struct DisplayModeMachine {
    mode: DisplayMode,
    timings: Timings,
}

impl DisplayModeMachine {
    /// Creates a machine that assumes the TV is in `mode`.
    #[must_use]
    pub fn new(mode: DisplayMode, timings: Timings) -> Self {
        Self { mode, timings }
    }

    /// Returns the recorded mode.
    #[must_use]
    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Switches to `target` unless already there.
    ///
    /// Returns whether the menu sequence was sent.
    ///
    /// # Errors
    ///
    /// Returns the transmission error. The recorded mode is left unchanged.
    pub async fn ensure<T: Transmit>(
        &mut self,
        transmitter: &T,
        target: DisplayMode,
    ) -> Result<bool> {
        if self.mode == target {
            tracing::debug!(mode = %target, "Display mode already set");
            return Ok(false);
        }

        for (key, delay) in self.macro_for(target) {
            transmitter.transmit(key.as_str(), delay).await?;
        }

        tracing::info!(from = %self.mode, to = %target, "Display mode changed");
        self.mode = target;
        Ok(true)
    }

    fn macro_for(&self, target: DisplayMode) -> [(RemoteKey, Duration); 6] {
        let t = &self.timings;
        [
            (RemoteKey::Menu, t.menu_open_delay),
            (RemoteKey::Down, t.menu_step_delay),
            (RemoteKey::Ok, t.menu_step_delay),
            (target.selector_key(), t.menu_step_delay),
            (RemoteKey::Ok, t.menu_step_delay),
            (RemoteKey::Exit, t.menu_exit_delay),
        ]
    }
}
