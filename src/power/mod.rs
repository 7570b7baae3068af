// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TV power tracking from HDMI hot-plug events.
//!
//! The TV never answers a key press, but its HDMI link drops and returns as it
//! powers down and up. A background [`PowerMonitor`] reads those events from
//! an external watcher (by default `tvservice -M`) and publishes the latest
//! [`PowerState`] on a watch channel; the controller reads it through a
//! [`PowerWatch`]. Code that must see every event in order, such as the
//! boot flicker check, takes a [`PowerEvents`] subscription instead.
//!
//! # Examples
//!
//! ```
//! use bedtime_tv::power::{PowerEventSource, PowerMonitor};
//!
//! # async fn example() {
//! let lines: &'static [u8] = b"[I] HDMI is attached\n";
//! let (monitor, watch) = PowerMonitor::new(PowerEventSource::reader(lines), false);
//! let task = monitor.spawn();
//!
//! let state = watch.wait_for_change(0).await.unwrap();
//! assert!(state.powered);
//! # task.await.unwrap();
//! # }
//! ```

mod monitor;
mod state;

pub use monitor::{LineKind, PowerEvent, PowerEventSource, PowerMonitor};
pub use state::{PowerEvents, PowerState, PowerWatch};
