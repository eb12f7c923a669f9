//! USB transport: commands go out as control transfers, responses arrive on
//! an interrupt endpoint in packets that may hold several frames.

use std::io;
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::{Connector, Transport, TransportError};
use crate::buffer::Buffer;
use crate::frame::{self, Scan};

/// Interrupt IN endpoint the devices answer on.
pub const INTERRUPT_ENDPOINT: u8 = 0x81;
/// Size of one interrupt read.
pub const PACKET_LEN: usize = 128;

/// A claimed USB device, as seen by [`UsbTransport`].
pub trait InterruptLink {
    /// Write one command frame using the device's control-transfer discipline.
    fn send_command(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes from the interrupt endpoint.
    fn read_interrupt(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Clear a halt condition on the interrupt endpoint.
    fn clear_halt(&mut self) -> io::Result<()>;
}

/// USB link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfig {
    /// Overall deadline for one response, counted from the command.
    pub read_timeout: Duration,
    /// Attempts to open and claim a device.
    pub open_attempts: usize,
    /// Pause after resetting a device that could not be claimed.
    pub reset_wait: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        UsbConfig {
            read_timeout: Duration::from_millis(5000),
            open_attempts: 4,
            reset_wait: Duration::from_secs(5),
        }
    }
}

pub struct UsbTransport<C: Connector> {
    connector: C,
    link: Option<C::Link>,
    buffer: Buffer,
    read_timeout: Duration,
    /// End of the wait for the response to the last command sent.
    response_deadline: Option<Instant>,
}

impl<C> UsbTransport<C>
where
    C: Connector,
    C::Link: InterruptLink,
{
    pub fn with_connector(mut connector: C, config: &UsbConfig) -> Result<Self, TransportError> {
        let link = connector
            .connect()
            .map_err(|source| TransportError::Fatal { source })?;
        Ok(UsbTransport {
            connector,
            link: Some(link),
            buffer: Buffer::new(),
            read_timeout: config.read_timeout,
            response_deadline: None,
        })
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn link(&mut self) -> Result<&mut C::Link, TransportError> {
        self.link.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Take the next complete frame out of the receive buffer, if any.
    fn next_buffered_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match frame::scan(self.buffer.as_slice()) {
            Scan::Complete { skipped, len } => {
                if skipped > 0 {
                    debug!("discarding {} bytes before start byte", skipped);
                }
                let frame = self.buffer.as_slice()[skipped..skipped + len].to_vec();
                self.buffer.consume(skipped + len);
                Ok(Some(frame))
            }
            Scan::Incomplete { skipped } => {
                if skipped > 0 {
                    debug!("discarding {} bytes before start byte", skipped);
                }
                self.buffer.consume(skipped);
                Ok(None)
            }
            Scan::Invalid { error, .. } => {
                self.buffer.clear();
                Err(error.into())
            }
        }
    }
}

impl<C> Transport for UsbTransport<C>
where
    C: Connector,
    C::Link: InterruptLink,
{
    fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let sent = self
            .link()?
            .send_command(frame)
            .map_err(TransportError::from_io)?;
        trace!("sent {:02x?}", frame);
        self.response_deadline = Some(Instant::now() + self.read_timeout);
        Ok(sent)
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let read_timeout = self.read_timeout;
        let deadline = *self
            .response_deadline
            .get_or_insert_with(|| Instant::now() + read_timeout);
        loop {
            if let Some(frame) = self.next_buffered_frame()? {
                trace!("received {:02x?}", frame);
                return Ok(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout);
            }

            let mut packet = [0u8; PACKET_LEN];
            let link = self.link()?;
            match link.read_interrupt(&mut packet, deadline - now) {
                // some adapters report empty transfers while idle
                Ok(0) => continue,
                Ok(n) => self.buffer.write(&packet[..n]),
                Err(err) => {
                    if let Err(halt) = link.clear_halt() {
                        debug!("clear halt failed: {}", halt);
                    }
                    return Err(TransportError::from_io(err));
                }
            }
        }
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.buffer.clear();
        self.response_deadline = None;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.link = None;
        self.buffer.clear();
        self.response_deadline = None;
        let link = self
            .connector
            .connect()
            .map_err(|source| TransportError::Fatal { source })?;
        self.link = Some(link);
        Ok(())
    }
}

#[cfg(feature = "usb")]
pub use self::libusb::{DeviceFamily, RusbConnector, RusbLink};

#[cfg(feature = "usb")]
mod libusb {
    use std::io;
    use std::thread::sleep;
    use std::time::Duration;

    use log::{debug, info, warn};
    use rusb::{DeviceHandle, GlobalContext};

    use super::{InterruptLink, UsbConfig, INTERRUPT_ENDPOINT};
    use crate::transport::Connector;

    const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);
    const INTERFACE: u8 = 0;

    /// How a device family expects commands to be written.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum DeviceFamily {
        /// SET_DESCRIPTOR request on the default pipe.
        Powerware,
        /// Vendor class request.
        Phoenixtec,
    }

    const SUPPORTED_DEVICES: [(u16, u16, DeviceFamily); 4] = [
        (0x0592, 0x0002, DeviceFamily::Powerware),
        (0x06DA, 0x0002, DeviceFamily::Phoenixtec),
        (0x03F0, 0x1F01, DeviceFamily::Phoenixtec),
        (0x03F0, 0x1F02, DeviceFamily::Phoenixtec),
    ];

    fn family(vendor_id: u16, product_id: u16) -> Option<DeviceFamily> {
        SUPPORTED_DEVICES
            .iter()
            .find(|(vid, pid, _)| *vid == vendor_id && *pid == product_id)
            .map(|(_, _, family)| *family)
    }

    fn usb_error(err: rusb::Error) -> io::Error {
        let kind = match err {
            rusb::Error::Timeout => io::ErrorKind::TimedOut,
            rusb::Error::Pipe | rusb::Error::Io => io::ErrorKind::BrokenPipe,
            rusb::Error::NoDevice => io::ErrorKind::NotConnected,
            rusb::Error::NotFound => io::ErrorKind::NotFound,
            rusb::Error::Access => io::ErrorKind::PermissionDenied,
            rusb::Error::Busy => io::ErrorKind::WouldBlock,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }

    pub struct RusbLink {
        handle: DeviceHandle<GlobalContext>,
        family: DeviceFamily,
    }

    impl RusbLink {
        pub fn family(&self) -> DeviceFamily {
            self.family
        }
    }

    impl InterruptLink for RusbLink {
        fn send_command(&mut self, frame: &[u8]) -> io::Result<usize> {
            let (request_type, request, value) = match self.family {
                DeviceFamily::Powerware => (
                    rusb::request_type(
                        rusb::Direction::Out,
                        rusb::RequestType::Standard,
                        rusb::Recipient::Device,
                    ),
                    0x07,
                    (0x03 << 8) | 0x04,
                ),
                DeviceFamily::Phoenixtec => (0x42, 0x0D, 0x00),
            };
            self.handle
                .write_control(request_type, request, value, 0, frame, CONTROL_TIMEOUT)
                .map_err(usb_error)
        }

        fn read_interrupt(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
            self.handle
                .read_interrupt(INTERRUPT_ENDPOINT, buf, timeout)
                .map_err(usb_error)
        }

        fn clear_halt(&mut self) -> io::Result<()> {
            self.handle
                .clear_halt(INTERRUPT_ENDPOINT)
                .map_err(usb_error)
        }
    }

    impl Drop for RusbLink {
        fn drop(&mut self) {
            if let Err(err) = self.handle.release_interface(INTERFACE) {
                debug!("release interface failed: {}", err);
            }
        }
    }

    /// Finds and claims the first supported device on the bus.
    #[derive(Debug, Clone, Default)]
    pub struct RusbConnector {
        config: UsbConfig,
    }

    impl RusbConnector {
        pub fn new(config: UsbConfig) -> Self {
            RusbConnector { config }
        }

        fn open_once(&self) -> rusb::Result<Option<RusbLink>> {
            for device in rusb::devices()?.iter() {
                let descriptor = match device.device_descriptor() {
                    Ok(descriptor) => descriptor,
                    Err(err) => {
                        debug!("skipping device without descriptor: {}", err);
                        continue;
                    }
                };
                if descriptor.class_code() != 0 {
                    continue;
                }
                let family = match family(descriptor.vendor_id(), descriptor.product_id()) {
                    Some(family) => family,
                    None => continue,
                };

                let mut handle = device.open()?;
                if let Err(err) = handle
                    .claim_interface(INTERFACE)
                    .and_then(|_| handle.clear_halt(INTERRUPT_ENDPOINT))
                {
                    warn!("cannot claim device: {}", err);
                    let _ = handle.release_interface(INTERFACE);
                    if let Err(err) = handle.reset() {
                        debug!("device reset failed: {}", err);
                    }
                    sleep(self.config.reset_wait);
                    return Err(err);
                }
                info!(
                    "claimed USB device {:04x}:{:04x} ({:?})",
                    descriptor.vendor_id(),
                    descriptor.product_id(),
                    family
                );
                return Ok(Some(RusbLink { handle, family }));
            }
            Ok(None)
        }
    }

    impl Connector for RusbConnector {
        type Link = RusbLink;

        fn connect(&mut self) -> io::Result<RusbLink> {
            let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no supported device");
            for attempt in 1..=self.config.open_attempts {
                match self.open_once() {
                    Ok(Some(link)) => return Ok(link),
                    Ok(None) => {
                        debug!("open attempt {}: no supported device", attempt);
                        last_error =
                            io::Error::new(io::ErrorKind::NotFound, "no supported device");
                    }
                    Err(err) => {
                        debug!("open attempt {} failed: {}", attempt, err);
                        last_error = usb_error(err);
                    }
                }
            }
            Err(last_error)
        }
    }

}
