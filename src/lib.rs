// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `bedtime_tv` - switch a TV between bedtime and daytime settings over
//! infrared.
//!
//! The library plays recorded remote-control codes through a GPIO driven
//! infrared LED and keeps a model of a TV that never answers: power is read
//! from HDMI hot-plug events, volume is estimated from the number of key
//! presses sent and the picture mode is remembered after each menu sequence.
//!
//! # Layers
//!
//! - [`waveform`]: carrier encoding of marks and spaces
//! - [`protocol`]: the [`PulseOutput`](protocol::PulseOutput) device trait,
//!   a `pigpiod` client and an in-memory device
//! - [`transmitter`]: one command at a time, from code to drained output
//! - [`power`]: background power-event monitor
//! - [`controller`]: volume, picture mode and the bedtime/daytime routines
//!
//! # Quick Start
//!
//! ```no_run
//! use bedtime_tv::command::CommandTable;
//! use bedtime_tv::config::ControllerConfig;
//! use bedtime_tv::DeviceController;
//!
//! #[tokio::main]
//! async fn main() -> bedtime_tv::Result<()> {
//!     let config = ControllerConfig::default();
//!     let commands = CommandTable::from_file("insignia_commands.json")?;
//!
//!     let controller = DeviceController::connect(&config, commands).await?;
//!     controller.initialize().await?;
//!
//!     controller.daytime().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Dry Runs
//!
//! [`MemoryOutput`](protocol::MemoryOutput) records what would have been
//! sent, which is enough to run the routines without hardware:
//!
//! ```
//! use std::time::Duration;
//!
//! use bedtime_tv::command::CommandTable;
//! use bedtime_tv::protocol::MemoryOutput;
//! use bedtime_tv::transmitter::TransmissionScheduler;
//!
//! # async fn example() -> bedtime_tv::Result<()> {
//! let commands = CommandTable::from_json_str(r#"{"KEY_MENU": [9000, 4500, 560]}"#)?;
//! let scheduler = TransmissionScheduler::new(MemoryOutput::new(), commands);
//!
//! scheduler.transmit("KEY_MENU", Duration::ZERO).await?;
//! assert_eq!(scheduler.device().chains().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod power;
pub mod protocol;
pub mod transmitter;
pub mod waveform;

pub use command::{CommandCode, CommandTable, RemoteKey};
pub use config::{ControllerConfig, Timings};
pub use controller::{
    ConfigurationUpdate, ControllerStatus, DeviceController, DisplayMode, Period, Volume,
};
pub use error::{ConfigError, DeviceError, Error, Result, ValueError};
pub use power::{PowerEventSource, PowerState};
pub use transmitter::{AllocationPolicy, TransmissionScheduler, Transmit};
