//! Command/response exchanges with retries.
//!
//! [`Master`] owns a [`Transport`] and turns one command into one reassembled
//! response payload, resending the command when an attempt fails.

use std::fmt;
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, warn};
use snafu::{ResultExt, Snafu};

use crate::command::ExecStatus;
use crate::frame::{encode_read, encode_write, FrameError};
use crate::ident::IdentError;
use crate::reassembler::{Reassembler, Step};
use crate::transport::{Transport, TransportError};

/// Consecutive failures logged in full before reporting is throttled.
const ERROR_REPORT_LIMIT: u32 = 10;
/// Once throttled, one failure in this many is logged.
const ERROR_REPORT_RATE: u32 = 10;

/// Error type for this module
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum CommError {
    #[snafu(display("no valid response to {:#04x} after {} attempts", command, attempts))]
    Exhausted { command: u8, attempts: usize },
    #[snafu(display("command {:#04x} rejected: {}", command, status))]
    Rejected { command: u8, status: ExecStatus },
    #[snafu(display("reply to {:#04x} too short: {} bytes, need {}", command, len, needed))]
    ShortReply {
        command: u8,
        len: usize,
        needed: usize,
    },
    #[snafu(display("cannot encode command: {}", source))]
    Encode { source: FrameError },
    #[snafu(display("send failed: {}", source))]
    Send { source: TransportError },
    #[snafu(display("reconnect failed: {}", source))]
    Disconnected { source: TransportError },
    #[snafu(display("no response from device"))]
    NoResponse,
    #[snafu(display("invalid identification block: {}", source))]
    Identification { source: IdentError },
    #[snafu(display("malformed {} block", block))]
    Malformed { block: &'static str },
    #[snafu(display("{} is not supported by the device", name))]
    Unsupported { name: String },
    #[snafu(display("{} cannot be set to {}", name, value))]
    InvalidSetting { name: String, value: i16 },
}

/// How hard to try before a command is given up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per command, each a full resend.
    pub attempts: usize,
    /// Input is flushed before every attempt after this many failures.
    pub flush_after: usize,
    /// Pause between sending a multi-byte command and reading its reply.
    pub write_settle: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 5,
            flush_after: 3,
            write_settle: Duration::ZERO,
        }
    }
}

/// Tracks consecutive failures and keeps the log readable while the link is down.
#[derive(Debug, Default)]
struct CommHealth {
    failures: u32,
}

impl CommHealth {
    fn failed(&mut self, command: u8, reason: &dyn fmt::Display) {
        self.failures = self.failures.saturating_add(1);
        if self.failures == ERROR_REPORT_LIMIT {
            warn!("excessive comm failures, limiting error reporting");
        }
        if self.failures < ERROR_REPORT_LIMIT || self.failures % ERROR_REPORT_RATE == 0 {
            warn!("communication error on {:#04x}: {}", command, reason);
        } else {
            debug!("communication error on {:#04x}: {}", command, reason);
        }
    }

    fn ok(&mut self) {
        if self.failures > 0 {
            info!("Communications with UPS re-established");
            self.failures = 0;
        }
    }
}

pub struct Master<T> {
    transport: T,
    policy: RetryPolicy,
    health: CommHealth,
    data_stale: bool,
}

impl<T: Transport> Master<T> {
    pub fn new(transport: T) -> Self {
        Master::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Master {
            transport,
            policy,
            health: CommHealth::default(),
            data_stale: false,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// True unless the last command failed.
    pub fn communication_ok(&self) -> bool {
        self.health.failures == 0
    }

    /// Set when a command ran out of attempts, cleared by the next success.
    pub fn data_stale(&self) -> bool {
        self.data_stale
    }

    /// Send a single-byte request and return the reassembled response payload.
    pub fn read(&mut self, command: u8) -> Result<Vec<u8>, CommError> {
        let frame = encode_read(command);
        self.command_sequence(command, &frame, Duration::ZERO)
    }

    /// Send a multi-byte command, command byte first, and return the reply payload.
    pub fn write(&mut self, command: &[u8]) -> Result<Vec<u8>, CommError> {
        let frame = encode_write(command).context(EncodeSnafu)?;
        let settle = self.policy.write_settle;
        self.command_sequence(command[0], &frame, settle)
    }

    /// Send a command the device does not answer, such as the authorization block.
    pub fn send_unacknowledged(&mut self, command: &[u8]) -> Result<(), CommError> {
        let frame = encode_write(command).context(EncodeSnafu)?;
        match self.transport.send(&frame) {
            Ok(_) => Ok(()),
            Err(err) if err.is_fatal() => {
                self.reconnect()?;
                self.transport.send(&frame).context(SendSnafu)?;
                Ok(())
            }
            Err(err) => Err(err).context(SendSnafu),
        }
    }

    fn command_sequence(
        &mut self,
        command: u8,
        frame: &[u8],
        settle: Duration,
    ) -> Result<Vec<u8>, CommError> {
        for attempt in 1..=self.policy.attempts {
            if attempt > self.policy.flush_after {
                if let Err(err) = self.transport.flush_input() {
                    debug!("flush failed: {}", err);
                }
            }
            match self.exchange(command, frame, settle) {
                Ok(payload) => {
                    self.health.ok();
                    self.data_stale = false;
                    return Ok(payload);
                }
                Err(err) => {
                    self.health.failed(command, &err);
                    if err.is_fatal() {
                        self.reconnect()?;
                    }
                }
            }
        }
        self.data_stale = true;
        ExhaustedSnafu {
            command,
            attempts: self.policy.attempts,
        }
        .fail()
    }

    fn exchange(
        &mut self,
        command: u8,
        frame: &[u8],
        settle: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.transport.send(frame)?;
        if !settle.is_zero() {
            sleep(settle);
        }
        let mut receiver = Reassembler::new(command);
        loop {
            let frame = self.transport.recv_frame()?;
            match receiver.push_frame(&frame) {
                Step::NeedFrame(next) => receiver = next,
                Step::Done(payload) => return Ok(payload),
                Step::Failed(err) => return Err(err.into()),
            }
        }
    }

    fn reconnect(&mut self) -> Result<(), CommError> {
        warn!("device link lost, reconnecting");
        match self.transport.reconnect() {
            Ok(()) => {
                info!("device link reopened");
                Ok(())
            }
            Err(source) => {
                self.data_stale = true;
                Err(CommError::Disconnected { source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_response;
    use std::collections::VecDeque;

    /// Transport that replays scripted receive results and records what was sent.
    #[derive(Default)]
    struct Scripted {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Result<Vec<u8>, TransportError>>,
        flushes: usize,
        reconnects: usize,
    }

    impl Transport for Scripted {
        fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
            self.sent.push(frame.to_vec());
            Ok(frame.len())
        }

        fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
            self.replies
                .pop_front()
                .unwrap_or(Err(TransportError::Timeout))
        }

        fn flush_input(&mut self) -> Result<(), TransportError> {
            self.flushes += 1;
            Ok(())
        }

        fn reconnect(&mut self) -> Result<(), TransportError> {
            self.reconnects += 1;
            Ok(())
        }
    }

    #[test]
    fn test_exhausted() {
        let mut master = Master::new(Scripted::default());
        let err = master.read(0x34).unwrap_err();
        assert!(matches!(
            err,
            CommError::Exhausted {
                command: 0x34,
                attempts: 5
            }
        ));
        assert_eq!(master.transport().sent.len(), 5);
        assert_eq!(master.transport().flushes, 2);
        assert!(master.data_stale());
        assert!(!master.communication_ok());
    }

    #[test]
    fn test_write_exhausted() {
        let mut master = Master::new(Scripted::default());
        let err = master.write(&[0xB2, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            CommError::Exhausted {
                command: 0xB2,
                attempts: 5
            }
        ));
        let sent = &master.transport().sent;
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|f| f[..] == encode_write(&[0xB2, 0x01]).unwrap()[..]));
        assert_eq!(master.transport().flushes, 2);
        assert!(master.data_stale());
    }

    #[test]
    fn test_retry_then_success() {
        let mut transport = Scripted::default();
        let mut bad = encode_response(0x04, 0x81, &[1, 2]).unwrap();
        bad[5] ^= 0xFF;
        transport.replies.push_back(Ok(bad));
        transport
            .replies
            .push_back(Ok(encode_response(0x04, 0x81, &[1, 2]).unwrap()));
        let mut master = Master::new(transport);
        assert_eq!(master.read(0x34).unwrap(), vec![1, 2]);
        assert_eq!(master.transport().sent.len(), 2);
        assert_eq!(master.transport().flushes, 0);
        assert!(master.communication_ok());
        assert!(!master.data_stale());
    }

    #[test]
    fn test_fatal_error_reconnects() {
        let mut transport = Scripted::default();
        transport.replies.push_back(Err(TransportError::Fatal {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        }));
        transport
            .replies
            .push_back(Ok(encode_response(0x01, 0x81, &[7]).unwrap()));
        let mut master = Master::new(transport);
        assert_eq!(master.read(0x31).unwrap(), vec![7]);
        assert_eq!(master.transport().reconnects, 1);
    }

    #[test]
    fn test_write_frames_command() {
        let mut transport = Scripted::default();
        transport
            .replies
            .push_back(Ok(encode_response(0x09, 0x81, &[0x31]).unwrap()));
        let mut master = Master::new(transport);
        assert_eq!(master.write(&[0xB2, 0x01]).unwrap(), vec![0x31]);
        assert_eq!(
            master.transport().sent[0],
            encode_write(&[0xB2, 0x01]).unwrap().to_vec()
        );
        assert!(matches!(
            master.write(&[]),
            Err(CommError::Encode { .. })
        ));
    }

    #[test]
    fn test_health_reporting() {
        let mut health = CommHealth::default();
        for _ in 0..25 {
            health.failed(0x34, &"timeout");
        }
        assert_eq!(health.failures, 25);
        health.ok();
        assert_eq!(health.failures, 0);
    }
}
