// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level TV controller.
//!
//! [`DeviceController`] drives the TV through the bedtime and daytime
//! routines. The TV acknowledges nothing, so the controller keeps its own
//! model of the set:
//!
//! - power comes from HDMI hot-plug events read by the
//!   [`PowerMonitor`](crate::power::PowerMonitor)
//! - volume is estimated by counting key presses ([`VolumeEstimator`])
//! - picture mode is recorded after each menu sequence
//!   ([`DisplayModeMachine`])
//!
//! Operations run one at a time. Each holds the session for its whole
//! duration, so presses from two routines never interleave.
//!
//! # Examples
//!
//! ```no_run
//! use bedtime_tv::command::CommandTable;
//! use bedtime_tv::config::ControllerConfig;
//! use bedtime_tv::DeviceController;
//!
//! # async fn example() -> bedtime_tv::Result<()> {
//! let config = ControllerConfig::from_file("bedtime.json")?;
//! let commands = CommandTable::from_file("insignia_commands.json")?;
//!
//! let controller = DeviceController::connect(&config, commands).await?;
//! controller.initialize().await?;
//! controller.bedtime().await?;
//! # Ok(())
//! # }
//! ```

mod display;
#[cfg(test)]
pub(crate) mod testing;
mod volume;

pub use display::{DisplayMode, DisplayModeMachine};
pub use volume::{ConfigurationUpdate, Volume, VolumeEstimator, VolumeTargets};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::command::{CommandTable, RemoteKey};
use crate::config::{ControllerConfig, Timings};
use crate::error::{Error, Result};
use crate::power::{PowerEventSource, PowerMonitor, PowerState, PowerWatch};
use crate::protocol::PigpioClient;
use crate::transmitter::{TransmissionScheduler, Transmit};

/// Time of day a routine prepares the TV for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Dim picture, low volume.
    Bedtime,
    /// Standard picture, normal volume.
    Daytime,
}

impl Period {
    /// Returns the picture mode used in this period.
    #[must_use]
    pub const fn display_mode(&self) -> DisplayMode {
        match self {
            Self::Bedtime => DisplayMode::Custom,
            Self::Daytime => DisplayMode::Standard,
        }
    }

    /// Returns the volume used in this period.
    #[must_use]
    pub const fn volume(&self, targets: &VolumeTargets) -> Volume {
        match self {
            Self::Bedtime => targets.bedtime,
            Self::Daytime => targets.daytime,
        }
    }

    /// Returns the period name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bedtime => "bedtime",
            Self::Daytime => "daytime",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Whether `initialize` has completed.
    pub initialized: bool,
    /// Whether a fatal error stopped the controller.
    pub halted: bool,
    /// Whether the TV was last reported as powered.
    pub powered: bool,
    /// Estimated volume, or `None` while an operation is running.
    pub volume: Option<Volume>,
    /// Recorded picture mode, or `None` while an operation is running.
    pub display_mode: Option<DisplayMode>,
    /// Configured bedtime and daytime volumes.
    pub targets: VolumeTargets,
}

/// State only touched by the running operation.
#[derive(Debug)]
struct Session {
    volume: VolumeEstimator,
    display: DisplayModeMachine,
}

/// Stateful controller for one TV.
///
/// Generic over the [`Transmit`] capability, so the routines can run against
/// real hardware or a test double.
///
/// Every operation except [`initialize`](Self::initialize) fails with
/// `Error::NotInitialized` until initialization has completed. After a fatal
/// error every operation fails with `Error::Halted`.
#[derive(Debug)]
pub struct DeviceController<T: Transmit> {
    transmitter: T,
    timings: Timings,
    power: PowerWatch,
    monitor: Mutex<Option<PowerMonitor>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    session: tokio::sync::Mutex<Session>,
    targets: RwLock<VolumeTargets>,
    initialized: AtomicBool,
    halted: AtomicBool,
}

impl DeviceController<TransmissionScheduler<PigpioClient>> {
    /// Connects to `pigpiod` and builds a controller from `config`.
    ///
    /// Missing remote keys are logged; routines needing them will fail with
    /// `Error::UnknownCommand`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid pin or carrier frequency, or
    /// `Error::Device` if the daemon cannot be reached.
    pub async fn connect(config: &ControllerConfig, commands: CommandTable) -> Result<Self> {
        let encoder = config.encoder()?;
        let missing = commands.missing(&RemoteKey::ALL);
        if !missing.is_empty() {
            let missing: Vec<_> = missing.iter().map(RemoteKey::as_str).collect();
            tracing::warn!(?missing, "Command table lacks remote keys");
        }

        let client = PigpioClient::connect(&config.pigpio()).await?;
        let scheduler = TransmissionScheduler::new(client, commands)
            .with_encoder(encoder)
            .with_allocation_policy(config.allocation_policy)
            .with_busy_poll(config.timings.busy_poll);

        Ok(Self::new(scheduler, config, config.power_event_source()))
    }
}

impl<T: Transmit> DeviceController<T> {
    /// Creates a controller. Nothing is sent until
    /// [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(transmitter: T, config: &ControllerConfig, power_events: PowerEventSource) -> Self {
        let (monitor, power) = PowerMonitor::new(power_events, false);
        let timings = config.timings;

        Self {
            transmitter,
            timings,
            power,
            monitor: Mutex::new(Some(monitor)),
            monitor_task: Mutex::new(None),
            session: tokio::sync::Mutex::new(Session {
                volume: VolumeEstimator::new(config.start_volume(), timings),
                display: DisplayModeMachine::new(config.initial_display_mode, timings),
            }),
            targets: RwLock::new(VolumeTargets {
                bedtime: config.bedtime_volume,
                daytime: config.daytime_volume,
            }),
            initialized: AtomicBool::new(false),
            halted: AtomicBool::new(false),
        }
    }

    /// Returns the transmitter.
    #[must_use]
    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    /// Returns whether initialization has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Returns whether a fatal error stopped the controller.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Returns the latest power reading.
    #[must_use]
    pub fn power_state(&self) -> PowerState {
        self.power.snapshot()
    }

    /// Returns the configured volumes.
    #[must_use]
    pub fn targets(&self) -> VolumeTargets {
        *self.targets.read()
    }

    /// Returns a snapshot of the controller state.
    ///
    /// Volume and display mode are only available between operations.
    #[must_use]
    pub fn status(&self) -> ControllerStatus {
        let (volume, display_mode) = match self.session.try_lock() {
            Ok(session) => (Some(session.volume.current()), Some(session.display.mode())),
            Err(_) => (None, None),
        };

        ControllerStatus {
            initialized: self.is_initialized(),
            halted: self.is_halted(),
            powered: self.power.is_powered(),
            volume,
            display_mode,
            targets: self.targets(),
        }
    }

    /// Prepares the hardware, starts the power monitor, turns the TV on and
    /// mutes it.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyInitialized` on a second call, `Error::Halted`
    /// after a fatal error, or the error of the failed step. A non-fatal
    /// failure can be retried.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_not_halted()?;
        let mut session = self.session.lock().await;
        self.ensure_not_halted()?;
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }

        tracing::info!("Initializing TV controller");
        self.transmitter.prepare().await?;
        self.start_monitor();

        let outcome = async {
            self.power_on_locked().await?;
            session
                .volume
                .set_volume(&self.transmitter, Volume::MIN)
                .await
        }
        .await;
        self.guard(outcome)?;

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("TV controller initialized and ready for commands");
        Ok(())
    }

    /// Switches the TV to the bedtime picture and volume.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`, or the error of the
    /// failed step.
    pub async fn bedtime(&self) -> Result<()> {
        self.run_period(Period::Bedtime).await
    }

    /// Switches the TV to the daytime picture and volume.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`, or the error of the
    /// failed step.
    pub async fn daytime(&self) -> Result<()> {
        self.run_period(Period::Daytime).await
    }

    /// Runs the routine for `period`.
    ///
    /// The TV is turned on and muted first, so the volume estimate starts
    /// from a known floor before the menu is opened.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`, or the error of the
    /// failed step.
    pub async fn run_period(&self, period: Period) -> Result<()> {
        self.ensure_ready()?;
        let mut session = self.session.lock().await;
        self.ensure_ready()?;

        tracing::info!(%period, "Switching period");
        let outcome = async {
            self.power_on_locked().await?;
            session
                .volume
                .set_volume(&self.transmitter, Volume::MIN)
                .await?;
            session
                .display
                .ensure(&self.transmitter, period.display_mode())
                .await?;
            // Read late so an update made during the routine still applies.
            let target = period.volume(&self.targets.read());
            session.volume.set_volume(&self.transmitter, target).await
        }
        .await;
        self.guard(outcome)?;

        tracing::info!(%period, "Period switch complete");
        Ok(())
    }

    /// Replaces the volume targets named in `update`.
    ///
    /// Does not wait for a running operation.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` or `Error::Halted`.
    pub fn update_configuration(&self, update: &ConfigurationUpdate) -> Result<VolumeTargets> {
        self.ensure_ready()?;

        let targets = {
            let mut targets = self.targets.write();
            targets.apply(update);
            *targets
        };
        tracing::info!(
            bedtime = %targets.bedtime,
            daytime = %targets.daytime,
            "Volume settings updated"
        );
        Ok(targets)
    }

    /// Turns the TV on unless it is already reported as powered.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`,
    /// `Error::PowerSyncViolation`, or a transmission error.
    pub async fn power_on(&self) -> Result<()> {
        self.ensure_ready()?;
        let _session = self.session.lock().await;
        self.ensure_ready()?;
        let outcome = self.power_on_locked().await;
        self.guard(outcome)
    }

    /// Raises the volume by one step.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`, or a transmission
    /// error.
    pub async fn volume_up(&self) -> Result<Volume> {
        self.ensure_ready()?;
        let mut session = self.session.lock().await;
        self.ensure_ready()?;
        session.volume.increase_volume(&self.transmitter).await?;
        Ok(session.volume.current())
    }

    /// Lowers the volume by one step.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`, or a transmission
    /// error.
    pub async fn volume_down(&self) -> Result<Volume> {
        self.ensure_ready()?;
        let mut session = self.session.lock().await;
        self.ensure_ready()?;
        session.volume.decrease_volume(&self.transmitter).await?;
        Ok(session.volume.current())
    }

    /// Drives the volume to `target`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized`, `Error::Halted`, or a transmission
    /// error.
    pub async fn set_volume(&self, target: Volume) -> Result<()> {
        self.ensure_ready()?;
        let mut session = self.session.lock().await;
        self.ensure_ready()?;
        session.volume.set_volume(&self.transmitter, target).await
    }

    fn ensure_not_halted(&self) -> Result<()> {
        if self.is_halted() {
            return Err(Error::Halted);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        self.ensure_not_halted()?;
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    /// Latches `halted` when `result` carries a fatal error.
    fn guard<R>(&self, result: Result<R>) -> Result<R> {
        match result {
            Err(e) if e.is_fatal() => {
                self.halted.store(true, Ordering::SeqCst);
                tracing::error!(
                    error = %e,
                    "Lost power synchronization with the TV; controller halted"
                );
                Err(e)
            }
            other => other,
        }
    }

    fn start_monitor(&self) {
        // Kept running if an earlier initialize failed after starting it.
        if let Some(monitor) = self.monitor.lock().take() {
            *self.monitor_task.lock() = Some(monitor.spawn());
        }
    }

    /// Runs up to two power cycles until the TV is reported as powered.
    ///
    /// The first cycle may have switched off a TV whose state was not yet
    /// known; the second then turns it back on.
    async fn power_on_locked(&self) -> Result<()> {
        for pass in 1..=2 {
            if self.power.is_powered() {
                return Ok(());
            }
            tracing::info!(pass, "Turning the TV on; current power state unknown");
            self.power_cycle().await?;
        }
        if !self.power.is_powered() {
            tracing::warn!("TV still reported off after two power cycles");
        }
        Ok(())
    }

    /// Presses power once and follows the TV through its response.
    ///
    /// A TV that powers up reports on, off and on again while booting; the
    /// cycle waits through that flicker and the settle time after it.
    async fn power_cycle(&self) -> Result<()> {
        // Subscribed before the key goes out, so no reply can be missed.
        let mut events = self.power.subscribe();
        self.transmitter
            .transmit(RemoteKey::Power.as_str(), self.timings.power_key_delay)
            .await?;

        if !events.next().await?.powered {
            tracing::debug!("TV reported off after power key");
            tokio::time::sleep(self.timings.wake_timeout).await;
            return Ok(());
        }

        if events.next().await?.powered {
            return Err(Error::PowerSyncViolation {
                expected_powered: false,
                stage: "boot flicker off",
            });
        }

        if !events.next().await?.powered {
            return Err(Error::PowerSyncViolation {
                expected_powered: true,
                stage: "boot flicker on",
            });
        }

        tracing::info!("TV powered on");
        tokio::time::sleep(self.timings.boot_settle).await;
        Ok(())
    }
}

impl<T: Transmit> Drop for DeviceController<T> {
    fn drop(&mut self) {
        if let Some(task) = self.monitor_task.lock().take() {
            task.abort();
        }
    }
}
