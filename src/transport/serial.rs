//! Serial line transport, with line-speed detection.

use std::io::{self, Read, Write};
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, trace, warn};

use super::{Connector, Transport, TransportError};
use crate::command::{ESCAPE, ID_BLOCK_REQ, SET_REQ_ONLY_MODE};
use crate::frame::{parse_header, FrameError, HEADER_LEN, START_BYTE};
use crate::master::{CommError, Master};
use crate::types::BaudRate;

/// Bytes scanned for a start byte before a read is abandoned.
pub const START_SEARCH_WINDOW: usize = 128;
/// Write attempts per frame. The last one is preceded by a wake-up escape.
pub const SEND_ATTEMPTS: usize = 3;

/// A serial port, as seen by [`SerialTransport`].
///
/// Reads are expected to time out with [`io::ErrorKind::TimedOut`].
pub trait SerialLine: Read + Write {
    /// Discard received but unread bytes.
    fn clear_input(&mut self) -> io::Result<()>;

    fn set_baud_rate(&mut self, baud_rate: BaudRate) -> io::Result<()>;
}

#[cfg(feature = "serial")]
impl SerialLine for Box<dyn serialport::SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn set_baud_rate(&mut self, baud_rate: BaudRate) -> io::Result<()> {
        serialport::SerialPort::set_baud_rate(self.as_mut(), *baud_rate).map_err(io::Error::from)
    }
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    /// Fixed line speed. Detected when `None`.
    pub baud_rate: Option<BaudRate>,
    /// Per-byte read timeout.
    pub byte_timeout: Duration,
    /// Pause after the wake-up escape.
    pub wake_delay: Duration,
    /// Pause after sending the authorization block.
    pub auth_delay: Duration,
    /// Pause after the escape sent before the last write attempt.
    pub escape_delay: Duration,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        SerialConfig {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            path: String::from("/dev/ttyS0"),
            baud_rate: None,
            byte_timeout: Duration::from_millis(1000),
            wake_delay: Duration::from_millis(90),
            auth_delay: Duration::from_millis(500),
            escape_delay: Duration::from_millis(250),
        }
    }
}

/// Opens the configured port with [`serialport`], 8N1 without flow control.
#[cfg(feature = "serial")]
#[derive(Debug, Clone)]
pub struct PortConnector {
    config: SerialConfig,
}

#[cfg(feature = "serial")]
impl PortConnector {
    pub fn new(config: SerialConfig) -> Self {
        PortConnector { config }
    }
}

#[cfg(feature = "serial")]
impl Connector for PortConnector {
    type Link = Box<dyn serialport::SerialPort>;

    fn connect(&mut self) -> io::Result<Self::Link> {
        let baud_rate = self.config.baud_rate.unwrap_or_default();
        debug!("opening {} at {} baud", self.config.path, baud_rate);
        serialport::new(&self.config.path, *baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.config.byte_timeout)
            .open()
            .map_err(io::Error::from)
    }
}

pub struct SerialTransport<C: Connector> {
    connector: C,
    line: Option<C::Link>,
    baud_rate: BaudRate,
    config: SerialConfig,
}

#[cfg(feature = "serial")]
impl SerialTransport<PortConnector> {
    /// Open the port named in `config`.
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        SerialTransport::with_connector(PortConnector::new(config.clone()), config)
    }
}

impl<C> SerialTransport<C>
where
    C: Connector,
    C::Link: SerialLine,
{
    pub fn with_connector(mut connector: C, config: SerialConfig) -> Result<Self, TransportError> {
        let line = connector
            .connect()
            .map_err(|source| TransportError::Fatal { source })?;
        Ok(SerialTransport {
            connector,
            line: Some(line),
            baud_rate: config.baud_rate.unwrap_or_default(),
            config,
        })
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud_rate
    }

    pub fn set_baud_rate(&mut self, baud_rate: BaudRate) -> Result<(), TransportError> {
        self.line()?
            .set_baud_rate(baud_rate)
            .map_err(TransportError::from_io)?;
        self.baud_rate = baud_rate;
        Ok(())
    }

    /// Send the wake-up escape and wait for the device to settle.
    pub fn wake(&mut self) -> Result<(), TransportError> {
        let delay = self.config.wake_delay;
        self.line()?
            .write_all(&[ESCAPE])
            .map_err(TransportError::from_io)?;
        sleep(delay);
        Ok(())
    }

    fn line(&mut self) -> Result<&mut C::Link, TransportError> {
        self.line.as_mut().ok_or(TransportError::NotConnected)
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8];
        self.line()?
            .read_exact(&mut byte)
            .map_err(TransportError::from_io)?;
        Ok(byte[0])
    }
}

impl<C> Transport for SerialTransport<C>
where
    C: Connector,
    C::Link: SerialLine,
{
    fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let escape_delay = self.config.escape_delay;
        let mut last_error = None;
        for attempt in 1..=SEND_ATTEMPTS {
            let line = self.line()?;
            if attempt == SEND_ATTEMPTS {
                line.write_all(&[ESCAPE])
                    .map_err(TransportError::from_io)?;
                sleep(escape_delay);
            }
            match line.write(frame) {
                Ok(n) if n == frame.len() => {
                    trace!("sent {:02x?}", frame);
                    return Ok(n);
                }
                Ok(n) => debug!("short write, {} of {} bytes", n, frame.len()),
                Err(err) => {
                    let err = TransportError::from_io(err);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    debug!("write attempt {} failed: {}", attempt, err);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TransportError::Io {
            source: io::Error::new(io::ErrorKind::WriteZero, "short write"),
        }))
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut scanned = 0;
        loop {
            let byte = self.read_byte()?;
            scanned += 1;
            if byte == START_BYTE {
                break;
            }
            if scanned >= START_SEARCH_WINDOW {
                return Err(FrameError::StartNotFound { scanned }.into());
            }
        }
        if scanned > 1 {
            debug!("skipped {} bytes before start byte", scanned - 1);
        }

        let mut frame = vec![START_BYTE; HEADER_LEN];
        self.line()?
            .read_exact(&mut frame[1..])
            .map_err(TransportError::from_io)?;
        let header = parse_header(&frame)?;
        frame.resize(header.frame_len(), 0);
        self.line()?
            .read_exact(&mut frame[HEADER_LEN..])
            .map_err(TransportError::from_io)?;
        trace!("received {:02x?}", frame);
        Ok(frame)
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.line()?.clear_input().map_err(TransportError::from_io)
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.line = None;
        let line = self
            .connector
            .connect()
            .map_err(|source| TransportError::Fatal { source })?;
        self.line = Some(line);
        let baud_rate = self.baud_rate;
        self.set_baud_rate(baud_rate)?;
        self.wake()
    }
}

impl<C> Master<SerialTransport<C>>
where
    C: Connector,
    C::Link: SerialLine,
{
    /// Bring the device into request-only mode, detecting the line speed
    /// unless one is configured.
    ///
    /// At each candidate speed the device is woken with an escape, sent the
    /// authorization block, and asked to enter request-only mode. Devices
    /// that don't support that mode are probed with an identification
    /// request instead.
    pub fn establish_link(&mut self, authorization: &[u8]) -> Result<BaudRate, CommError> {
        let candidates: Vec<BaudRate> = match self.transport().config().baud_rate {
            Some(rate) => vec![rate],
            None => BaudRate::CANDIDATES.to_vec(),
        };
        let auth_delay = self.transport().config().auth_delay;

        for baud_rate in candidates {
            debug!("trying {} baud", baud_rate);
            if let Err(err) = self.transport_mut().set_baud_rate(baud_rate) {
                warn!("cannot set {} baud: {}", baud_rate, err);
                continue;
            }
            if let Err(err) = self.transport_mut().wake() {
                debug!("wake-up failed at {} baud: {}", baud_rate, err);
                continue;
            }
            if let Err(err) = self.send_unacknowledged(authorization) {
                debug!("authorization failed at {} baud: {}", baud_rate, err);
                continue;
            }
            sleep(auth_delay);

            let answered = match self.read(SET_REQ_ONLY_MODE) {
                Ok(_) => true,
                Err(err) => {
                    debug!("request-only mode refused at {} baud: {}", baud_rate, err);
                    self.read(ID_BLOCK_REQ).is_ok()
                }
            };
            if answered {
                info!("connected at {} baud", baud_rate);
                return Ok(baud_rate);
            }
        }
        warn!("no response from device at any line speed");
        Err(CommError::NoResponse)
    }
}
