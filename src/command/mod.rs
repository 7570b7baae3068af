// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Infrared command codes.
//!
//! A command table maps remote key names to their timing codes, usually
//! captured from the TV's own remote and stored as JSON:
//!
//! ```
//! use bedtime_tv::command::CommandTable;
//!
//! let table = CommandTable::from_json_str(
//!     r#"{"KEY_POWER": [9000, 4500, 560, 560], "KEY_OK": [9000, 4500, 560, 1690]}"#,
//! )
//! .unwrap();
//!
//! assert!(table.contains("KEY_POWER"));
//! assert_eq!(table.get("KEY_POWER").unwrap().durations(), &[9000, 4500, 560, 560]);
//! ```

mod key;

pub use key::RemoteKey;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::waveform::PulseKind;

/// Timing code of one infrared command.
///
/// Durations are in microseconds and alternate mark, space, mark, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandCode(Vec<u32>);

impl CommandCode {
    /// Creates a code from mark-first durations.
    #[must_use]
    pub fn new(durations: Vec<u32>) -> Self {
        Self(durations)
    }

    /// Returns the raw durations.
    #[must_use]
    pub fn durations(&self) -> &[u32] {
        &self.0
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the code has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries with their mark/space kind.
    pub fn entries(&self) -> impl Iterator<Item = (PulseKind, u32)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(i, &duration)| (PulseKind::at(i), duration))
    }

    /// Returns the total length of the code in microseconds.
    #[must_use]
    pub fn total_us(&self) -> u64 {
        self.0.iter().map(|&d| u64::from(d)).sum()
    }
}

impl From<Vec<u32>> for CommandCode {
    fn from(durations: Vec<u32>) -> Self {
        Self::new(durations)
    }
}

/// Named command codes, immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTable {
    commands: BTreeMap<String, CommandCode>,
}

impl CommandTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a command, returning the table.
    #[must_use]
    pub fn with_command(mut self, name: impl Into<String>, code: impl Into<CommandCode>) -> Self {
        self.commands.insert(name.into(), code.into());
        self
    }

    /// Parses a table from a JSON object of name to duration array.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the text is not such an object.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a table from a JSON reader.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the input is invalid.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads a table from a JSON file.
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
        let table = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), commands = table.len(), "Loaded command table");
        Ok(table)
    }

    /// Looks up a command by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandCode> {
        self.commands.get(name)
    }

    /// Returns `true` if the table has a command with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Returns the supported command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Returns the number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns the keys from `keys` that this table lacks.
    #[must_use]
    pub fn missing(&self, keys: &[RemoteKey]) -> Vec<RemoteKey> {
        keys.iter()
            .copied()
            .filter(|key| !self.contains(key.as_str()))
            .collect()
    }
}
