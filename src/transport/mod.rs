//! Byte links to a device.
//!
//! A [`Transport`] moves whole frames: it writes encoded commands and hands
//! back one complete response frame per call. Which physical link is used is
//! decided once, when the [`Master`](crate::Master) is built.

use std::io;

use snafu::Snafu;

use crate::frame::FrameError;

pub mod serial;
pub mod usb;

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum TransportError {
    #[snafu(display("timed out waiting for the device"))]
    Timeout,
    #[snafu(display("framing error: {}", source))]
    Framing { source: FrameError },
    #[snafu(display("I/O error: {}", source))]
    Io { source: io::Error },
    #[snafu(display("device link lost: {}", source))]
    Fatal { source: io::Error },
    #[snafu(display("device link is not open"))]
    NotConnected,
}

impl TransportError {
    /// Sort an I/O error into timeout, fatal and plain I/O errors.
    pub fn from_io(err: io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            TimedOut | WouldBlock | UnexpectedEof => TransportError::Timeout,
            BrokenPipe | NotConnected | ConnectionReset | ConnectionAborted | NotFound
            | PermissionDenied => TransportError::Fatal { source: err },
            _ => TransportError::Io { source: err },
        }
    }

    /// Fatal errors mean the link has to be reopened before further use.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Fatal { .. } | TransportError::NotConnected
        )
    }
}

impl From<FrameError> for TransportError {
    fn from(source: FrameError) -> Self {
        TransportError::Framing { source }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::from_io(err)
    }
}

/// Frame-level access to one device.
pub trait Transport {
    /// Write one encoded command frame, returning the bytes written.
    fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError>;

    /// Read the next complete response frame, start byte through checksum.
    fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Discard any pending received bytes.
    fn flush_input(&mut self) -> Result<(), TransportError>;

    /// Close and reopen the underlying link.
    fn reconnect(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        (**self).send(frame)
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).recv_frame()
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        (**self).flush_input()
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        (**self).reconnect()
    }
}

/// Opens the physical link behind a transport, initially and on reconnect.
pub trait Connector {
    type Link;

    fn connect(&mut self) -> io::Result<Self::Link>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let timeout = TransportError::from_io(io::Error::new(io::ErrorKind::TimedOut, "t"));
        assert!(matches!(timeout, TransportError::Timeout));
        assert!(!timeout.is_fatal());

        let pipe = TransportError::from_io(io::Error::new(io::ErrorKind::BrokenPipe, "p"));
        assert!(pipe.is_fatal());

        let other = TransportError::from_io(io::Error::new(io::ErrorKind::Other, "o"));
        assert!(matches!(other, TransportError::Io { .. }));
        assert!(!other.is_fatal());

        let framing: TransportError = FrameError::BadLength { length: 0 }.into();
        assert!(!framing.is_fatal());
        assert_eq!(framing.to_string(), "framing error: invalid payload length 0");
    }
}
