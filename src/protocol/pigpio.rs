// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! pigpio daemon socket client.
//!
//! `pigpiod` accepts fixed 16-byte requests made of four little-endian words
//! `(cmd, p1, p2, p3)`, optionally followed by `p3` bytes of extension data.
//! Every request is answered with 16 bytes whose last word is the signed
//! result; negative results are pigpio error codes.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::DeviceError;
use crate::protocol::PulseOutput;
use crate::waveform::{Pulse, WaveHandle};

// ============================================================================
// Protocol constants
// ============================================================================

const CMD_MODES: u32 = 0;
const CMD_WVAG: u32 = 28;
const CMD_WVBSY: u32 = 32;
const CMD_WVCRE: u32 = 49;
const CMD_WVDEL: u32 = 50;
const CMD_WVNEW: u32 = 53;
const CMD_WVCHA: u32 = 93;

const MODE_OUTPUT: u32 = 1;

const PI_TOO_MANY_PULSES: i32 = -36;
const PI_TOO_MANY_CBS: i32 = -67;
const PI_TOO_MANY_OOL: i32 = -68;
const PI_NO_WAVEFORM_ID: i32 = -70;

/// Wave ids from 250 up collide with the chain control bytes.
const MAX_CHAIN_WAVE_ID: u32 = 249;

// ============================================================================
// PigpioConfig
// ============================================================================

/// Connection settings for a `pigpiod` daemon.
///
/// # Examples
///
/// ```
/// use bedtime_tv::protocol::PigpioConfig;
/// use std::time::Duration;
///
/// let config = PigpioConfig::new("raspberrypi.local")
///     .with_port(8889)
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(config.port(), 8889);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PigpioConfig {
    host: String,
    port: u16,
    timeout: Duration,
}

impl PigpioConfig {
    /// Default daemon port.
    pub const DEFAULT_PORT: u16 = 8888;
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a configuration for the daemon on `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PigpioConfig {
    fn default() -> Self {
        Self::new("localhost")
    }
}

// ============================================================================
// PigpioClient
// ============================================================================

/// Pulse output backed by a `pigpiod` daemon.
///
/// Requests are serialized over a single connection. A request that times
/// out, fails or is cancelled leaves its reply unread, so the connection is
/// dropped and the next request opens a new one.
#[derive(Debug)]
pub struct PigpioClient {
    stream: Mutex<Option<TcpStream>>,
    config: PigpioConfig,
}

impl PigpioClient {
    /// Connects to the daemon described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Timeout` if the connection is not established in
    /// time, or `DeviceError::Io` if it is refused.
    pub async fn connect(config: &PigpioConfig) -> Result<Self, DeviceError> {
        let stream = open(config).await?;
        Ok(Self {
            stream: Mutex::new(Some(stream)),
            config: config.clone(),
        })
    }

    /// Returns whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    async fn command(
        &self,
        name: &'static str,
        cmd: u32,
        p1: u32,
        p2: u32,
        ext: &[u8],
    ) -> Result<u32, DeviceError> {
        let frame = request_frame(cmd, p1, p2, ext);
        let timeout = self.config.timeout();

        let mut slot = self.stream.lock().await;
        // Put back only after a complete exchange.
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => {
                tracing::debug!(command = name, "Reconnecting to pigpio daemon");
                open(&self.config).await?
            }
        };
        let exchange = async {
            stream.write_all(&frame).await?;
            let mut response = [0u8; 16];
            stream.read_exact(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        };
        let response = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(command = name, error = %e, "pigpio connection failed");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(command = name, "pigpio request timed out; dropping connection");
                return Err(DeviceError::Timeout(millis(timeout)));
            }
        };
        *slot = Some(stream);

        let result = i32::from_le_bytes([response[12], response[13], response[14], response[15]]);
        tracing::trace!(command = name, p1, p2, result, "pigpio request");

        if result < 0 {
            return Err(error_for(name, result));
        }
        Ok(result.unsigned_abs())
    }
}

impl PulseOutput for PigpioClient {
    async fn define_waveform(&self, pulses: &[Pulse]) -> Result<WaveHandle, DeviceError> {
        self.command("WVAG", CMD_WVAG, 0, 0, &encode_pulses(pulses))
            .await?;

        match self.command("WVCRE", CMD_WVCRE, 0, 0, &[]).await {
            Ok(id) => Ok(WaveHandle::new(id)),
            Err(e) => {
                // Pulses added before a failed create stay pending and would
                // leak into the next waveform.
                if let Err(clear) = self.command("WVNEW", CMD_WVNEW, 0, 0, &[]).await {
                    tracing::warn!(error = %clear, "Failed to clear pending pulses");
                }
                Err(e)
            }
        }
    }

    async fn chain(&self, handles: &[WaveHandle]) -> Result<(), DeviceError> {
        let ext = encode_chain(handles)?;
        self.command("WVCHA", CMD_WVCHA, 0, 0, &ext).await?;
        Ok(())
    }

    async fn is_busy(&self) -> Result<bool, DeviceError> {
        let busy = self.command("WVBSY", CMD_WVBSY, 0, 0, &[]).await?;
        Ok(busy == 1)
    }

    async fn release(&self, handle: WaveHandle) -> Result<(), DeviceError> {
        self.command("WVDEL", CMD_WVDEL, handle.id(), 0, &[])
            .await?;
        Ok(())
    }

    async fn set_output_mode(&self, pin: u8) -> Result<(), DeviceError> {
        self.command("MODES", CMD_MODES, u32::from(pin), MODE_OUTPUT, &[])
            .await?;
        Ok(())
    }
}

// ============================================================================
// Encoding helpers
// ============================================================================

#[allow(clippy::cast_possible_truncation)]
fn request_frame(cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(16 + ext.len());
    frame.extend_from_slice(&cmd.to_le_bytes());
    frame.extend_from_slice(&p1.to_le_bytes());
    frame.extend_from_slice(&p2.to_le_bytes());
    // Extension lengths are bounded by the pulse and chain sizes we send
    frame.extend_from_slice(&(ext.len() as u32).to_le_bytes());
    frame.extend_from_slice(ext);
    frame
}

fn encode_pulses(pulses: &[Pulse]) -> Vec<u8> {
    let mut ext = Vec::with_capacity(pulses.len() * 12);
    for pulse in pulses {
        ext.extend_from_slice(&pulse.on_mask.to_le_bytes());
        ext.extend_from_slice(&pulse.off_mask.to_le_bytes());
        ext.extend_from_slice(&pulse.duration_us.to_le_bytes());
    }
    ext
}

fn encode_chain(handles: &[WaveHandle]) -> Result<Vec<u8>, DeviceError> {
    handles
        .iter()
        .map(|handle| {
            if handle.id() > MAX_CHAIN_WAVE_ID {
                return Err(DeviceError::InvalidHandle(handle.id()));
            }
            u8::try_from(handle.id()).map_err(|_| DeviceError::InvalidHandle(handle.id()))
        })
        .collect()
}

async fn open(config: &PigpioConfig) -> Result<TcpStream, DeviceError> {
    let connect = TcpStream::connect((config.host(), config.port()));
    let stream = tokio::time::timeout(config.timeout(), connect)
        .await
        .map_err(|_| DeviceError::Timeout(millis(config.timeout())))??;
    stream.set_nodelay(true)?;

    tracing::debug!(
        host = %config.host(),
        port = config.port(),
        "Connected to pigpio daemon"
    );
    Ok(stream)
}

/// Maps a negative pigpio result; running out of wave ids or DMA resources
/// is exhaustion, anything else a rejection.
fn error_for(command: &'static str, code: i32) -> DeviceError {
    match code {
        PI_TOO_MANY_PULSES | PI_NO_WAVEFORM_ID | PI_TOO_MANY_CBS | PI_TOO_MANY_OOL => {
            DeviceError::ResourceExhausted { code }
        }
        _ => DeviceError::Rejected { command, code },
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PigpioConfig::default();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 8888);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn frame_layout() {
        let frame = request_frame(CMD_WVDEL, 3, 0, &[]);
        assert_eq!(frame.len(), 16);
        assert_eq!(&frame[0..4], &50u32.to_le_bytes());
        assert_eq!(&frame[4..8], &3u32.to_le_bytes());
        assert_eq!(&frame[12..16], &0u32.to_le_bytes());
    }

    #[test]
    fn frame_carries_extension_length() {
        let ext = encode_pulses(&[Pulse::new(1 << 17, 0, 13), Pulse::idle(4500)]);
        let frame = request_frame(CMD_WVAG, 0, 0, &ext);
        assert_eq!(frame.len(), 16 + 24);
        assert_eq!(&frame[12..16], &24u32.to_le_bytes());
        assert_eq!(&frame[16..20], &(1u32 << 17).to_le_bytes());
        assert_eq!(&frame[24..28], &13u32.to_le_bytes());
        assert_eq!(&frame[36..40], &4500u32.to_le_bytes());
    }

    #[test]
    fn chain_is_one_byte_per_wave() {
        let ext = encode_chain(&[WaveHandle::new(0), WaveHandle::new(7), WaveHandle::new(0)])
            .unwrap();
        assert_eq!(ext, vec![0, 7, 0]);
    }

    #[test]
    fn chain_rejects_control_byte_ids() {
        let err = encode_chain(&[WaveHandle::new(250)]).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidHandle(250)));
    }

    #[test]
    fn resource_errors_are_classified() {
        assert!(matches!(
            error_for("WVCRE", PI_TOO_MANY_CBS),
            DeviceError::ResourceExhausted { code: -67 }
        ));
        assert!(matches!(
            error_for("WVCRE", PI_NO_WAVEFORM_ID),
            DeviceError::ResourceExhausted { code: -70 }
        ));
        // PI_BAD_WAVE_ID
        assert!(matches!(
            error_for("WVDEL", -66),
            DeviceError::Rejected {
                command: "WVDEL",
                code: -66
            }
        ));
        // PI_EMPTY_WAVEFORM
        assert!(matches!(
            error_for("WVCRE", -69),
            DeviceError::Rejected { code: -69, .. }
        ));
        assert!(matches!(
            error_for("MODES", -2),
            DeviceError::Rejected {
                command: "MODES",
                code: -2
            }
        ));
    }
}
