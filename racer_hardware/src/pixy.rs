//! UART-attached vision sensor and kill-switch line for the Raspberry Pi.

use std::time::{Duration, Instant};

use rppal::uart::{Parity, Uart};
use tracing::debug;

use racer_traits::{Detection, KillSwitch, Vision};

use crate::block_stream::BlockDecoder;
use crate::error::{HwError, Result};

/// Command sync words, sent low byte first.
const SERVO_SYNC: [u8; 2] = [0x00, 0xff];
const BRIGHTNESS_SYNC: [u8; 2] = [0x00, 0xfe];

const READ_CHUNK: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_micros(500);
/// Wire silence longer than this means the sensor is gone, not merely
/// looking at an empty scene.
const SENSOR_SILENCE: Duration = Duration::from_secs(1);

/// Vision backend reading the sensor's object stream over UART.
pub struct UartVision {
    uart: Uart,
    decoder: BlockDecoder,
    pending: Option<Vec<Detection>>,
    /// The sensor has no brightness read-back, so the last written level
    /// is cached here.
    brightness: u8,
    tilt: u16,
    last_byte_at: Instant,
}

impl UartVision {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let mut uart = Uart::with_path(path, baud, Parity::None, 8, 1).map_err(uart_err)?;
        uart.set_read_mode(0, Duration::ZERO).map_err(uart_err)?;
        Ok(Self {
            uart,
            decoder: BlockDecoder::new(),
            pending: None,
            brightness: crate::DEFAULT_BRIGHTNESS,
            tilt: crate::PAN_CENTER,
            last_byte_at: Instant::now(),
        })
    }

    /// Blocks dropped by the decoder since open; a rising count under way
    /// points at wiring or baud trouble.
    pub fn dropped_blocks(&self) -> u64 {
        self.decoder.dropped_blocks()
    }

    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.uart.read(&mut chunk).map_err(uart_err)?;
        if n > 0 {
            self.last_byte_at = Instant::now();
            self.decoder.push(&chunk[..n]);
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < bytes.len() {
            sent += self.uart.write(&bytes[sent..]).map_err(uart_err)?;
        }
        Ok(())
    }
}

impl Vision for UartVision {
    fn wait_frame(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.decoder.has_frame() {
                self.pending = self.decoder.latest_frame();
                return Ok(true);
            }
            let n = self.fill()?;
            if n == 0 {
                if Instant::now() >= deadline {
                    if self.last_byte_at.elapsed() >= SENSOR_SILENCE {
                        return Err(HwError::FrameTimeout.into());
                    }
                    return Ok(false);
                }
                std::thread::sleep(POLL_INTERVAL);
            } else if Instant::now() >= deadline {
                // Bytes are flowing but no frame completed inside the
                // window; report a stale tick rather than spinning.
                return Ok(false);
            }
        }
    }

    fn detections(
        &mut self,
        max: usize,
    ) -> std::result::Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>> {
        let mut out = self.pending.take().unwrap_or_default();
        out.truncate(max);
        Ok(out)
    }

    fn set_pan(
        &mut self,
        pos: u16,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut cmd = [0u8; 6];
        cmd[..2].copy_from_slice(&SERVO_SYNC);
        cmd[2..4].copy_from_slice(&pos.to_le_bytes());
        cmd[4..6].copy_from_slice(&self.tilt.to_le_bytes());
        self.write_all(&cmd)?;
        Ok(())
    }

    fn brightness(&mut self) -> std::result::Result<u8, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.brightness)
    }

    fn set_brightness(
        &mut self,
        level: u8,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_all(&[BRIGHTNESS_SYNC[0], BRIGHTNESS_SYNC[1], level])?;
        self.brightness = level;
        debug!(level, "sensor brightness set");
        Ok(())
    }
}

/// Maximum buffered junk before the line buffer is cleared.
const MAX_LINE: usize = 256;

/// Kill-switch tokens arriving as newline-terminated lines on a second
/// UART, typically wired to a radio receiver.
pub struct UartKillSwitch {
    uart: Uart,
    line: String,
}

impl UartKillSwitch {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let mut uart = Uart::with_path(path, baud, Parity::None, 8, 1).map_err(uart_err)?;
        uart.set_read_mode(0, Duration::ZERO).map_err(uart_err)?;
        Ok(Self {
            uart,
            line: String::new(),
        })
    }
}

impl KillSwitch for UartKillSwitch {
    fn poll(
        &mut self,
    ) -> std::result::Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let mut chunk = [0u8; 32];
        let n = self.uart.read(&mut chunk).map_err(uart_err)?;
        if n > 0 {
            self.line.push_str(&String::from_utf8_lossy(&chunk[..n]));
        }
        if let Some(pos) = self.line.find('\n') {
            let token = self.line[..pos].trim().to_string();
            self.line.drain(..=pos);
            if token.is_empty() {
                return Ok(None);
            }
            return Ok(Some(token));
        }
        if self.line.len() > MAX_LINE {
            self.line.clear();
        }
        Ok(None)
    }
}

fn uart_err(e: rppal::uart::Error) -> HwError {
    HwError::Uart(e.to_string())
}
