// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the pigpio client against a scripted daemon.

use std::sync::Arc;
use std::time::Duration;

use bedtime_tv::command::CommandTable;
use bedtime_tv::error::DeviceError;
use bedtime_tv::protocol::{PigpioClient, PigpioConfig, PulseOutput};
use bedtime_tv::transmitter::{TransmissionScheduler, Transmit};
use bedtime_tv::waveform::Pulse;
use bedtime_tv::Error;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const MODES: u32 = 0;
const WVAG: u32 = 28;
const WVBSY: u32 = 32;
const WVCRE: u32 = 49;
const WVDEL: u32 = 50;
const WVNEW: u32 = 53;
const WVCHA: u32 = 93;

/// One request as seen by the fake daemon.
#[derive(Debug, Clone)]
struct Request {
    cmd: u32,
    p1: u32,
    p2: u32,
    ext: Vec<u8>,
}

type Log = Arc<Mutex<Vec<Request>>>;

// ============================================================================
// Fake daemon
// ============================================================================

/// Starts a daemon that answers every request with `respond`.
async fn fake_pigpiod<F>(respond: F) -> (PigpioConfig, Log)
where
    F: FnMut(&Request) -> i32 + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: Log = Arc::default();

    let requests = Arc::clone(&log);
    tokio::spawn(async move {
        let mut respond = respond;
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 16];
        while socket.read_exact(&mut header).await.is_ok() {
            let word = |i: usize| {
                u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]])
            };
            let (cmd, p1, p2, p3) = (word(0), word(4), word(8), word(12));
            let mut ext = vec![0u8; p3 as usize];
            socket.read_exact(&mut ext).await.unwrap();

            let request = Request { cmd, p1, p2, ext };
            let result = respond(&request);
            requests.lock().push(request);

            socket.write_all(&reply(cmd, p1, p2, result)).await.unwrap();
        }
    });

    let config = PigpioConfig::new("127.0.0.1")
        .with_port(port)
        .with_timeout(Duration::from_secs(2));
    (config, log)
}

fn reply(cmd: u32, p1: u32, p2: u32, result: i32) -> Vec<u8> {
    let mut response = Vec::with_capacity(16);
    response.extend_from_slice(&cmd.to_le_bytes());
    response.extend_from_slice(&p1.to_le_bytes());
    response.extend_from_slice(&p2.to_le_bytes());
    response.extend_from_slice(&result.to_le_bytes());
    response
}

/// Hands out wave ids from 0 and reports playback finished on the second poll.
fn well_behaved() -> impl FnMut(&Request) -> i32 + Send + 'static {
    let mut next_id = 0;
    let mut polls = 0;
    move |request| match request.cmd {
        WVCRE => {
            next_id += 1;
            next_id - 1
        }
        WVBSY => {
            polls += 1;
            i32::from(polls < 2)
        }
        WVAG => i32::try_from(request.ext.len() / 12).unwrap(),
        _ => 0,
    }
}

fn commands(log: &Log) -> Vec<u32> {
    log.lock().iter().map(|r| r.cmd).collect()
}

// ============================================================================
// Client
// ============================================================================

mod client {
    use super::*;

    #[tokio::test]
    async fn set_output_mode() {
        let (config, log) = fake_pigpiod(well_behaved()).await;
        let client = PigpioClient::connect(&config).await.unwrap();

        client.set_output_mode(17).await.unwrap();

        let requests = log.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cmd, MODES);
        assert_eq!(requests[0].p1, 17);
        assert_eq!(requests[0].p2, 1);
    }

    #[tokio::test]
    async fn define_waveform_sends_pulses() {
        let (config, log) = fake_pigpiod(well_behaved()).await;
        let client = PigpioClient::connect(&config).await.unwrap();

        let handle = client
            .define_waveform(&[Pulse::new(1 << 17, 0, 13), Pulse::new(0, 1 << 17, 13)])
            .await
            .unwrap();
        assert_eq!(handle.id(), 0);

        let requests = log.lock().clone();
        assert_eq!(commands(&log), vec![WVAG, WVCRE]);
        assert_eq!(requests[0].ext.len(), 24);
        assert_eq!(&requests[0].ext[0..4], &(1u32 << 17).to_le_bytes());
        assert_eq!(&requests[0].ext[8..12], &13u32.to_le_bytes());
    }

    #[tokio::test]
    async fn failed_create_clears_pending_pulses() {
        let (config, log) = fake_pigpiod(|request| match request.cmd {
            WVCRE => -67,
            _ => 0,
        })
        .await;
        let client = PigpioClient::connect(&config).await.unwrap();

        let err = client
            .define_waveform(&[Pulse::idle(4500)])
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::ResourceExhausted { code: -67 }));
        assert_eq!(commands(&log), vec![WVAG, WVCRE, WVNEW]);
    }

    #[tokio::test]
    async fn other_errors_are_rejections() {
        let (config, _log) = fake_pigpiod(|_| -2).await;
        let client = PigpioClient::connect(&config).await.unwrap();

        let err = client.set_output_mode(99).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Rejected {
                command: "MODES",
                code: -2
            }
        ));
    }

    #[tokio::test]
    async fn silent_daemon_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let config = PigpioConfig::new("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_millis(50));
        let client = PigpioClient::connect(&config).await.unwrap();

        let err = client.is_busy().await.unwrap_err();
        assert!(matches!(err, DeviceError::Timeout(50)));
    }

    #[tokio::test]
    async fn late_reply_is_not_read_by_next_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut header = [0u8; 16];

            let (mut stale, _) = listener.accept().await.unwrap();
            stale.read_exact(&mut header).await.unwrap();

            // The client gave up; it must come back on a new connection.
            let (mut fresh, _) = listener.accept().await.unwrap();
            stale.write_all(&reply(WVBSY, 0, 0, 0)).await.unwrap();

            fresh.read_exact(&mut header).await.unwrap();
            fresh.write_all(&reply(WVBSY, 0, 0, 1)).await.unwrap();
            std::future::pending::<()>().await;
        });

        let config = PigpioConfig::new("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_millis(50));
        let client = PigpioClient::connect(&config).await.unwrap();

        let err = client.is_busy().await.unwrap_err();
        assert!(matches!(err, DeviceError::Timeout(50)));
        assert!(!client.is_connected().await);

        assert!(client.is_busy().await.unwrap());
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = PigpioConfig::new("127.0.0.1").with_port(port);
        let err = PigpioClient::connect(&config).await.unwrap_err();
        assert!(matches!(err, DeviceError::Io(_)));
    }
}

// ============================================================================
// Transmission
// ============================================================================

mod transmission {
    use super::*;

    fn table() -> CommandTable {
        CommandTable::new().with_command("KEY_POWER", vec![9000, 4500, 560, 560, 560, 1690])
    }

    #[tokio::test]
    async fn transmit_full_sequence() {
        let (config, log) = fake_pigpiod(well_behaved()).await;
        let client = PigpioClient::connect(&config).await.unwrap();
        let scheduler = TransmissionScheduler::new(client, table());

        scheduler.prepare().await.unwrap();
        scheduler
            .transmit("KEY_POWER", Duration::ZERO)
            .await
            .unwrap();

        let requests = log.lock().clone();
        let cmds: Vec<_> = requests.iter().map(|r| r.cmd).collect();

        // mark 9000, space 4500, mark 560, space 560, space 1690
        assert_eq!(cmds.iter().filter(|&&c| c == WVCRE).count(), 5);
        assert_eq!(cmds.iter().filter(|&&c| c == WVAG).count(), 5);
        assert_eq!(cmds.iter().filter(|&&c| c == WVBSY).count(), 2);

        let chain = requests.iter().find(|r| r.cmd == WVCHA).unwrap();
        assert_eq!(chain.ext, vec![0, 1, 2, 3, 2, 4]);

        let mut deleted: Vec<_> = requests
            .iter()
            .filter(|r| r.cmd == WVDEL)
            .map(|r| r.p1)
            .collect();
        deleted.sort_unstable();
        assert_eq!(deleted, vec![0, 1, 2, 3, 4]);

        // Releases follow playback.
        let last_busy = cmds.iter().rposition(|&c| c == WVBSY).unwrap();
        let first_delete = cmds.iter().position(|&c| c == WVDEL).unwrap();
        assert!(last_busy < first_delete);
        assert_eq!(cmds[0], MODES);
    }

    #[tokio::test]
    async fn exhausted_daemon_releases_partial_waveforms() {
        let mut created = 0;
        let (config, log) = fake_pigpiod(move |request| match request.cmd {
            WVCRE if created == 2 => -67,
            WVCRE => {
                created += 1;
                created - 1
            }
            _ => 0,
        })
        .await;
        let client = PigpioClient::connect(&config).await.unwrap();
        let scheduler = TransmissionScheduler::new(client, table());

        let err = scheduler
            .transmit("KEY_POWER", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WaveformAllocation {
                duration_us: 560,
                source: DeviceError::ResourceExhausted { code: -67 },
                ..
            }
        ));

        let cmds = commands(&log);
        assert!(!cmds.contains(&WVCHA));
        assert_eq!(cmds.iter().filter(|&&c| c == WVDEL).count(), 2);
    }
}
