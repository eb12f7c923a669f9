//! Joins the fragments of one response into a single payload.
//!
//! The reassembler does no I/O: the caller feeds it complete frames as the
//! transport delivers them and gets back either the next state or the result.

use log::trace;
use snafu::ensure;

use crate::checksum;
use crate::command::expected_block;
use crate::frame::{
    parse_header, BadSequenceSnafu, BlockMismatchSnafu, ChecksumSnafu, FrameError,
    FrameSizeSnafu, ResponseTooLongSnafu, HEADER_LEN, SEQUENCE_MASK,
};

/// Upper bound on a reassembled response.
pub const MAX_RESPONSE_LEN: usize = 4096;

/// Result of feeding one frame to a [`Reassembler`].
#[derive(Debug)]
#[must_use = "The response is incomplete until Step::Done is returned"]
pub enum Step {
    NeedFrame(Reassembler),
    Done(Vec<u8>),
    Failed(FrameError),
}

#[derive(Debug)]
pub struct Reassembler {
    command: u8,
    previous_sequence: u8,
    payload: Vec<u8>,
}

impl Reassembler {
    /// Start collecting the response to `command`.
    pub fn new(command: u8) -> Self {
        Reassembler {
            command,
            previous_sequence: 0,
            payload: Vec::new(),
        }
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    /// Bytes collected so far.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Feed one complete frame, start byte through checksum.
    pub fn push_frame(mut self, frame: &[u8]) -> Step {
        match self.accept(frame) {
            Ok(true) => Step::Done(self.payload),
            Ok(false) => Step::NeedFrame(self),
            Err(err) => Step::Failed(err),
        }
    }

    fn accept(&mut self, frame: &[u8]) -> Result<bool, FrameError> {
        let header = parse_header(frame)?;
        if let Some(expected) = expected_block(self.command) {
            ensure!(
                header.block_number == expected,
                BlockMismatchSnafu {
                    command: self.command,
                    expected,
                    received: header.block_number,
                }
            );
        }

        let expected = self.previous_sequence.wrapping_add(1) & SEQUENCE_MASK;
        ensure!(
            header.sequence_number() == expected,
            BadSequenceSnafu {
                expected,
                received: header.sequence_number(),
            }
        );
        ensure!(
            frame.len() == header.frame_len(),
            FrameSizeSnafu {
                announced: header.frame_len(),
                actual: frame.len(),
            }
        );
        ensure!(
            checksum::validate(frame),
            ChecksumSnafu {
                sum: checksum::response_sum(frame),
            }
        );

        let length = usize::from(header.length);
        ensure!(
            self.payload.len() + length <= MAX_RESPONSE_LEN,
            ResponseTooLongSnafu {
                limit: MAX_RESPONSE_LEN,
            }
        );
        self.payload
            .extend_from_slice(&frame[HEADER_LEN..HEADER_LEN + length]);
        self.previous_sequence = header.sequence_number();
        trace!(
            "fragment {} of response to {:#04x}: {} bytes{}",
            header.sequence_number(),
            self.command,
            length,
            if header.is_last() { ", last" } else { "" }
        );
        Ok(header.is_last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_response;

    fn feed(command: u8, frames: &[Vec<u8>]) -> Result<Vec<u8>, FrameError> {
        let mut rx = Reassembler::new(command);
        for frame in frames {
            match rx.push_frame(frame) {
                Step::NeedFrame(next) => rx = next,
                Step::Done(payload) => return Ok(payload),
                Step::Failed(err) => return Err(err),
            }
        }
        panic!("response incomplete after {} frames", frames.len());
    }

    #[test]
    fn test_single_frame() {
        let frame = encode_response(0x04, 0x81, &[1, 2, 3, 4]).unwrap();
        assert_eq!(feed(0x34, &[frame]), Ok(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_fragments() {
        let frames = vec![
            encode_response(0x01, 0x01, &[1, 2]).unwrap(),
            encode_response(0x01, 0x02, &[3]).unwrap(),
            encode_response(0x01, 0x83, &[4, 5]).unwrap(),
        ];
        assert_eq!(feed(0x31, &frames), Ok(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_sequence_wraps() {
        let mut frames: Vec<Vec<u8>> = (1..=8u8)
            .map(|n| encode_response(0x04, n & SEQUENCE_MASK, &[n]).unwrap())
            .collect();
        frames.push(encode_response(0x04, 0x81, &[9]).unwrap());
        assert_eq!(feed(0x34, &frames), Ok((1..=9).collect::<Vec<u8>>()));
    }

    #[test]
    fn test_sequence_gap() {
        let frames = vec![
            encode_response(0x01, 0x01, &[1]).unwrap(),
            encode_response(0x01, 0x83, &[3]).unwrap(),
        ];
        assert_eq!(
            feed(0x31, &frames),
            Err(FrameError::BadSequence {
                expected: 2,
                received: 3
            })
        );
        // first fragment must carry sequence 1
        let frames = vec![encode_response(0x01, 0x80, &[1]).unwrap()];
        assert!(matches!(
            feed(0x31, &frames),
            Err(FrameError::BadSequence { .. })
        ));
    }

    #[test]
    fn test_block_mismatch() {
        let frames = vec![encode_response(0x02, 0x81, &[1]).unwrap()];
        assert_eq!(
            feed(0x31, &frames),
            Err(FrameError::BlockMismatch {
                command: 0x31,
                expected: 0x01,
                received: 0x02
            })
        );
        // unconstrained command range
        let frames = vec![encode_response(0x77, 0x81, &[1]).unwrap()];
        assert_eq!(feed(0x50, &frames), Ok(vec![1]));
        let frames = vec![encode_response(0x09, 0x81, &[0x31]).unwrap()];
        assert_eq!(feed(0xB1, &frames), Ok(vec![0x31]));
    }

    #[test]
    fn test_checksum_and_size() {
        let mut frame = encode_response(0x01, 0x81, &[1, 2]).unwrap();
        frame[4] ^= 0x40;
        assert!(matches!(
            feed(0x31, &[frame]),
            Err(FrameError::Checksum { .. })
        ));
        let mut frame = encode_response(0x01, 0x81, &[1, 2]).unwrap();
        frame.push(0);
        assert!(matches!(
            feed(0x31, &[frame]),
            Err(FrameError::FrameSize { .. })
        ));
    }

    #[test]
    fn test_response_limit() {
        let chunk = [0u8; 128];
        let frames: Vec<Vec<u8>> = (1..=40u8)
            .map(|n| encode_response(0x04, n & SEQUENCE_MASK, &chunk).unwrap())
            .collect();
        assert_eq!(
            feed(0x34, &frames),
            Err(FrameError::ResponseTooLong {
                limit: MAX_RESPONSE_LEN
            })
        );
    }
}
