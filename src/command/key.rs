// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote keys used by the controller.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// A key on the TV remote, named as in the command table.
///
/// # Examples
///
/// ```
/// use bedtime_tv::command::RemoteKey;
///
/// assert_eq!(RemoteKey::VolumeUp.as_str(), "KEY_VOLUME_UP");
/// assert_eq!("key_power".parse::<RemoteKey>().unwrap(), RemoteKey::Power);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteKey {
    /// Power toggle.
    Power,
    /// Volume up one step.
    VolumeUp,
    /// Volume down one step.
    VolumeDown,
    /// Open the settings menu.
    Menu,
    /// Navigate up.
    Up,
    /// Navigate down.
    Down,
    /// Select.
    Ok,
    /// Leave the menu.
    Exit,
}

impl RemoteKey {
    /// Every key the controller may send.
    pub const ALL: [Self; 8] = [
        Self::Power,
        Self::VolumeUp,
        Self::VolumeDown,
        Self::Menu,
        Self::Up,
        Self::Down,
        Self::Ok,
        Self::Exit,
    ];

    /// Returns the command table name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "KEY_POWER",
            Self::VolumeUp => "KEY_VOLUME_UP",
            Self::VolumeDown => "KEY_VOLUME_DOWN",
            Self::Menu => "KEY_MENU",
            Self::Up => "KEY_UP",
            Self::Down => "KEY_DOWN",
            Self::Ok => "KEY_OK",
            Self::Exit => "KEY_EXIT",
        }
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteKey {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == upper)
            .ok_or_else(|| ValueError::InvalidKey(s.to_string()))
    }
}
