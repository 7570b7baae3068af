// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end controller scenarios against the in-memory pulse output.
//!
//! Time is paused, so settle times elapse instantly; power events are fed
//! through a duplex pipe on a script of delays.

use std::time::Duration;

use bedtime_tv::command::CommandTable;
use bedtime_tv::config::ControllerConfig;
use bedtime_tv::controller::{ConfigurationUpdate, DisplayMode, Volume};
use bedtime_tv::power::PowerEventSource;
use bedtime_tv::protocol::MemoryOutput;
use bedtime_tv::transmitter::{AllocationPolicy, TransmissionScheduler};
use bedtime_tv::{DeviceController, Error};
use tokio::io::{AsyncWriteExt, BufReader};

type Controller = DeviceController<TransmissionScheduler<MemoryOutput>>;

const ATTACHED: &str = "[I] HDMI is attached, HDMI mode";
const UNPLUGGED: &str = "[I] HDMI cable is unplugged";

// ============================================================================
// Helpers
// ============================================================================

const COMMANDS: &str = r#"{
    "KEY_POWER":       [9000, 4500, 560, 560, 560, 1690],
    "KEY_VOLUME_UP":   [9000, 4500, 560, 1690, 560, 560],
    "KEY_VOLUME_DOWN": [9000, 4500, 560, 1690, 560, 1690],
    "KEY_MENU":        [9000, 4500, 560, 560, 560, 560],
    "KEY_UP":          [9000, 4500, 1120, 560, 560, 560],
    "KEY_DOWN":        [9000, 4500, 1120, 1690, 560, 560],
    "KEY_OK":          [9000, 4500, 1120, 560, 560, 1690],
    "KEY_EXIT":        [9000, 4500, 1120, 1690, 560, 1690]
}"#;

fn commands() -> CommandTable {
    CommandTable::from_json_str(COMMANDS).unwrap()
}

/// Writes each line after its delay and keeps the pipe open afterwards.
fn scripted_power(script: Vec<(u64, &'static str)>) -> PowerEventSource {
    let (mut writer, reader) = tokio::io::duplex(1024);
    tokio::spawn(async move {
        for (delay_secs, line) in script {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        }
        std::future::pending::<()>().await;
    });
    PowerEventSource::reader(BufReader::new(reader))
}

fn boot_flicker() -> PowerEventSource {
    scripted_power(vec![(1, ATTACHED), (1, UNPLUGGED), (1, ATTACHED)])
}

fn controller(config: &ControllerConfig, power: PowerEventSource) -> Controller {
    let scheduler = TransmissionScheduler::new(MemoryOutput::new(), commands())
        .with_allocation_policy(config.allocation_policy);
    DeviceController::new(scheduler, config, power)
}

/// Names of the commands played so far, in order.
fn sent(controller: &Controller) -> Vec<String> {
    let scheduler = controller.transmitter();
    scheduler
        .device()
        .chains()
        .iter()
        .map(|chain| {
            scheduler
                .commands()
                .names()
                .find(|name| {
                    scheduler
                        .commands()
                        .get(name)
                        .is_some_and(|code| code.durations() == chain.as_slice())
                })
                .unwrap_or("<unknown>")
                .to_string()
        })
        .collect()
}

fn count(sent: &[String], command: &str) -> usize {
    sent.iter().filter(|name| *name == command).count()
}

// ============================================================================
// Routines
// ============================================================================

mod routines {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn daytime_from_muted_tv() {
        let config = ControllerConfig::default()
            .with_assumed_start_volume(Volume::MIN)
            .with_volumes(Volume::new(15).unwrap(), Volume::new(25).unwrap());
        let controller = controller(&config, boot_flicker());

        controller.initialize().await.unwrap();
        controller.daytime().await.unwrap();

        let sent = sent(&controller);
        assert_eq!(count(&sent, "KEY_POWER"), 1);
        assert_eq!(count(&sent, "KEY_VOLUME_UP"), 26);
        assert_eq!(count(&sent, "KEY_MENU"), 0);
        assert_eq!(sent.len(), 27);

        let device = controller.transmitter().device();
        assert_eq!(device.live_handles(), 0);
        assert_eq!(device.released_count(), device.defined_count());
        assert_eq!(controller.status().volume, Some(Volume::new(25).unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn bedtime_then_daytime() {
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, boot_flicker());

        controller.initialize().await.unwrap();
        controller.bedtime().await.unwrap();
        assert_eq!(controller.status().display_mode, Some(DisplayMode::Custom));

        controller.daytime().await.unwrap();
        assert_eq!(controller.status().display_mode, Some(DisplayMode::Standard));

        let sent = sent(&controller);
        assert_eq!(count(&sent, "KEY_POWER"), 1);
        assert_eq!(count(&sent, "KEY_MENU"), 2);
        assert_eq!(count(&sent, "KEY_UP"), 1);
        assert_eq!(count(&sent, "KEY_EXIT"), 2);
        // bedtime: 16 up; daytime: 16 down to mute, 26 up
        assert_eq!(count(&sent, "KEY_VOLUME_UP"), 42);
        assert_eq!(count(&sent, "KEY_VOLUME_DOWN"), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn bedtime_macro_is_sent_once() {
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, boot_flicker());

        controller.initialize().await.unwrap();
        controller.bedtime().await.unwrap();
        controller.bedtime().await.unwrap();

        let sent = sent(&controller);
        assert_eq!(count(&sent, "KEY_MENU"), 1);
        let menu = sent.iter().position(|name| name == "KEY_MENU").unwrap();
        assert_eq!(
            &sent[menu..menu + 6],
            ["KEY_MENU", "KEY_DOWN", "KEY_OK", "KEY_DOWN", "KEY_OK", "KEY_EXIT"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_update_changes_next_routine() {
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, boot_flicker());
        controller.initialize().await.unwrap();

        let update: ConfigurationUpdate = serde_json::from_str(r#"{"bedtime_volume": 4}"#).unwrap();
        controller.update_configuration(&update).unwrap();
        controller.bedtime().await.unwrap();

        assert_eq!(count(&sent(&controller), "KEY_VOLUME_UP"), 5);
        assert_eq!(controller.targets().daytime.value(), 25);
    }
}

// ============================================================================
// Power synchronization
// ============================================================================

mod power {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn two_pass_power_on() {
        let power = scripted_power(vec![
            (1, UNPLUGGED),
            (11, ATTACHED),
            (1, UNPLUGGED),
            (1, ATTACHED),
        ]);
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, power);

        controller.initialize().await.unwrap();

        assert_eq!(sent(&controller), ["KEY_POWER", "KEY_POWER"]);
        assert!(controller.power_state().powered);
    }

    #[tokio::test(start_paused = true)]
    async fn flicker_arriving_in_one_burst() {
        let burst = "[I] HDMI is attached, HDMI mode\n\
                     [I] HDMI cable is unplugged\n\
                     [I] HDMI is attached, HDMI mode";
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, scripted_power(vec![(1, burst)]));

        controller.initialize().await.unwrap();
        controller.daytime().await.unwrap();

        let sent = sent(&controller);
        assert_eq!(count(&sent, "KEY_POWER"), 1);
        assert!(!controller.is_halted());
        assert_eq!(controller.power_state().sequence, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn tv_already_on_skips_power_key() {
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, boot_flicker());
        controller.initialize().await.unwrap();

        controller.power_on().await.unwrap();
        assert_eq!(count(&sent(&controller), "KEY_POWER"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn boot_flicker_violation_is_fatal() {
        let power = scripted_power(vec![(1, ATTACHED), (1, UNPLUGGED), (1, UNPLUGGED)]);
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, power);

        let err = controller.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            Error::PowerSyncViolation {
                expected_powered: true,
                ..
            }
        ));
        assert!(err.is_fatal());
        assert!(matches!(controller.bedtime().await, Err(Error::Halted)));
        assert!(matches!(controller.volume_up().await, Err(Error::Halted)));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_event_stream_fails_initialize() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(writer);
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let controller = controller(&config, PowerEventSource::reader(BufReader::new(reader)));

        let err = controller.initialize().await.unwrap_err();
        assert!(matches!(err, Error::PowerMonitorStopped));
        assert!(!err.is_fatal());
        assert!(!controller.is_initialized());
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn operations_require_initialize() {
        let controller = controller(&ControllerConfig::default(), scripted_power(Vec::new()));

        assert!(matches!(controller.daytime().await, Err(Error::NotInitialized)));
        assert!(matches!(controller.bedtime().await, Err(Error::NotInitialized)));
        assert!(matches!(controller.power_on().await, Err(Error::NotInitialized)));
        assert!(matches!(
            controller.set_volume(Volume::MIN).await,
            Err(Error::NotInitialized)
        ));
        assert!(sent(&controller).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_key_is_reported() {
        let table = CommandTable::from_json_str(r#"{"KEY_POWER": [9000, 4500]}"#).unwrap();
        let config = ControllerConfig::default().with_assumed_start_volume(Volume::MIN);
        let scheduler = TransmissionScheduler::new(MemoryOutput::new(), table);
        let controller = DeviceController::new(scheduler, &config, boot_flicker());

        controller.initialize().await.unwrap();
        let err = controller.daytime().await.unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(name) if name == "KEY_VOLUME_UP"));
        assert!(!controller.is_halted());
    }

    #[tokio::test(start_paused = true)]
    async fn allocation_failure_aborts_routine() {
        let config = ControllerConfig::default()
            .with_assumed_start_volume(Volume::MIN)
            .with_allocation_policy(AllocationPolicy::Abort);
        let scheduler =
            TransmissionScheduler::new(MemoryOutput::new().with_capacity(3), commands());
        let controller = DeviceController::new(scheduler, &config, boot_flicker());

        let err = controller.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            Error::WaveformAllocation { ref command, .. } if command == "KEY_POWER"
        ));
        assert_eq!(controller.transmitter().device().live_handles(), 0);
        assert!(!controller.is_initialized());
    }
}
