//! Wire framing: command encoding and response header parsing.
//!
//! Every frame starts with [`START_BYTE`]. Commands are
//! `[start][length][command bytes][checksum]`, responses are
//! `[start][block][length][sequence][payload][checksum]`.

use arrayvec::ArrayVec;
use nom::bytes::streaming::{tag, take};
use nom::number::streaming::u8 as byte;
use nom::sequence::tuple;
use nom::IResult;
use snafu::{ensure, Snafu};

use crate::checksum::command_checksum;

pub const START_BYTE: u8 = 0xAB;
/// Start, block, length and sequence.
pub const HEADER_LEN: usize = 4;
/// Header plus checksum.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 1;
/// Largest payload a single response frame may carry.
pub const MAX_PAYLOAD_LEN: usize = 140;
/// Largest encoded command frame.
pub const MAX_COMMAND_FRAME: usize = 128;
pub const MAX_COMMAND_LEN: usize = MAX_COMMAND_FRAME - 3;

/// Sequence flag set on the final fragment of a response.
pub const LAST_FRAGMENT: u8 = 0x80;
/// Sequence counter bits.
pub const SEQUENCE_MASK: u8 = 0x07;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum FrameError {
    #[snafu(display("start byte not found after {} bytes", scanned))]
    StartNotFound { scanned: usize },
    #[snafu(display("invalid payload length {}", length))]
    BadLength { length: u8 },
    #[snafu(display(
        "block {:#04x} received for command {:#04x}, expected {:#04x}",
        received,
        command,
        expected
    ))]
    BlockMismatch {
        command: u8,
        expected: u8,
        received: u8,
    },
    #[snafu(display("sequence {} received, expected {}", received, expected))]
    BadSequence { expected: u8, received: u8 },
    #[snafu(display("checksum error, frame sums to {:#04x}", sum))]
    Checksum { sum: u8 },
    #[snafu(display("frame has {} bytes, header announces {}", actual, announced))]
    FrameSize { announced: usize, actual: usize },
    #[snafu(display("response exceeds {} bytes", limit))]
    ResponseTooLong { limit: usize },
    #[snafu(display("command of {} bytes does not fit in a frame", len))]
    CommandTooLong { len: usize },
    #[snafu(display("payload of {} bytes does not fit in a response frame", len))]
    PayloadSize { len: usize },
}

pub type CommandFrame = ArrayVec<u8, MAX_COMMAND_FRAME>;

/// Encode a single-byte request.
///
/// ```
/// assert_eq!(bcmxcp::frame::encode_read(0x31), [0xAB, 0x01, 0x31, 0x23]);
/// ```
pub fn encode_read(command: u8) -> [u8; 4] {
    let mut frame = [START_BYTE, 0x01, command, 0];
    frame[3] = command_checksum(&frame[..3]);
    frame
}

/// Encode a multi-byte command, command byte first.
pub fn encode_write(command: &[u8]) -> Result<CommandFrame, FrameError> {
    ensure!(
        !command.is_empty() && command.len() <= MAX_COMMAND_LEN,
        CommandTooLongSnafu { len: command.len() }
    );
    let mut frame = CommandFrame::new();
    frame.push(START_BYTE);
    frame.push(command.len() as u8);
    frame.extend(command.iter().copied());
    frame.push(command_checksum(&frame));
    Ok(frame)
}

/// Encode one response frame, as sent by a device.
pub fn encode_response(
    block_number: u8,
    sequence: u8,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    ensure!(
        !payload.is_empty() && payload.len() <= MAX_PAYLOAD_LEN,
        PayloadSizeSnafu { len: payload.len() }
    );
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&[START_BYTE, block_number, payload.len() as u8, sequence]);
    frame.extend_from_slice(payload);
    // response checksum makes the whole frame sum to zero
    frame.push(command_checksum(&frame));
    Ok(frame)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub block_number: u8,
    pub length: u8,
    pub sequence: u8,
}

impl FrameHeader {
    /// Total frame length including header and checksum.
    pub fn frame_len(&self) -> usize {
        usize::from(self.length) + FRAME_OVERHEAD
    }

    pub fn is_last(&self) -> bool {
        self.sequence & LAST_FRAGMENT != 0
    }

    pub fn sequence_number(&self) -> u8 {
        self.sequence & SEQUENCE_MASK
    }
}

fn header(buf: &[u8]) -> IResult<&[u8], FrameHeader> {
    let (buf, _) = tag(&[START_BYTE][..])(buf)?;
    let (buf, (block_number, length, sequence)) = tuple((byte, byte, byte))(buf)?;
    Ok((
        buf,
        FrameHeader {
            block_number,
            length,
            sequence,
        },
    ))
}

fn frame(buf: &[u8]) -> IResult<&[u8], FrameHeader> {
    let (buf, header) = header(buf)?;
    let (buf, _) = take(usize::from(header.length) + 1)(buf)?;
    Ok((buf, header))
}

pub fn check_length(length: u8) -> Result<(), FrameError> {
    ensure!(
        length != 0 && usize::from(length) <= MAX_PAYLOAD_LEN,
        BadLengthSnafu { length }
    );
    Ok(())
}

/// Parse and validate the header at the front of `bytes`.
pub fn parse_header(bytes: &[u8]) -> Result<FrameHeader, FrameError> {
    match header(bytes) {
        Ok((_, header)) => {
            check_length(header.length)?;
            Ok(header)
        }
        Err(nom::Err::Incomplete(_)) => FrameSizeSnafu {
            announced: HEADER_LEN,
            actual: bytes.len(),
        }
        .fail(),
        Err(_) => StartNotFoundSnafu { scanned: 0usize }.fail(),
    }
}

/// Result of looking for a frame in a receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan {
    /// A complete frame of `len` bytes follows `skipped` bytes of noise.
    Complete { skipped: usize, len: usize },
    /// More data is needed. The first `skipped` bytes can be discarded.
    Incomplete { skipped: usize },
    /// The header after `skipped` bytes of noise is invalid.
    Invalid { skipped: usize, error: FrameError },
}

/// Locate the next frame in `buf`, resynchronising on the start byte.
pub fn scan(buf: &[u8]) -> Scan {
    let skipped = match buf.iter().position(|b| *b == START_BYTE) {
        Some(pos) => pos,
        None => return Scan::Incomplete { skipped: buf.len() },
    };
    let buf = &buf[skipped..];
    match header(buf) {
        Ok((_, header)) => {
            if let Err(error) = check_length(header.length) {
                return Scan::Invalid { skipped, error };
            }
        }
        Err(_) => return Scan::Incomplete { skipped },
    }
    match frame(buf) {
        Ok((rest, _)) => Scan::Complete {
            skipped,
            len: buf.len() - rest.len(),
        },
        Err(_) => Scan::Incomplete { skipped },
    }
}
