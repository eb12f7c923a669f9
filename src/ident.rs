//! Parser for the identification block (reply to `0x31`).

use nom::combinator::{map, opt};
use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::{le_u16, u8 as byte};
use nom::sequence::tuple;
use nom::IResult;
use snafu::Snafu;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentError {
    #[snafu(display("identification block truncated at byte {}", offset))]
    Truncated { offset: usize },
}

/// Labels of the processors whose firmware versions are reported, in order.
const CPU_NAMES: [&str; 5] = ["Cont", "Inve", "Rect", "Netw", "Disp"];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    pub fn is_present(&self) -> bool {
        self.major != 0 || self.minor != 0
    }
}

/// Device identification and the sizes of the blocks it implements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// One entry per processor, zero when absent.
    pub firmware: Vec<FirmwareVersion>,
    /// Power rating in VA.
    pub rating_va: u32,
    pub phases: u8,
    pub model: String,
    /// One format byte per meter slot, zero when not implemented.
    pub meter_map: Vec<u8>,
    /// One bit per alarm slot.
    pub alarm_map: Vec<u8>,
    pub config_block_len: u16,
    pub statistics_map_len: usize,
    pub alarm_history_len: u16,
    pub custom_event_len: u16,
    pub topology_block_len: u16,
    pub max_command_len: u8,
    pub command_list_len: u16,
    pub outlet_block_len: u16,
    pub alarm_block_len: u16,
}

impl Identification {
    pub fn parse(block: &[u8]) -> Result<Self, IdentError> {
        match identification(block) {
            Ok((_, ident)) => Ok(ident),
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => TruncatedSnafu {
                offset: block.len() - err.input.len(),
            }
            .fail(),
            Err(nom::Err::Incomplete(_)) => TruncatedSnafu {
                offset: block.len(),
            }
            .fail(),
        }
    }

    /// Firmware versions as `Cont:01.20 Inve:02.03`, skipping absent processors.
    pub fn firmware_summary(&self) -> String {
        self.firmware
            .iter()
            .zip(CPU_NAMES.iter())
            .filter(|(version, _)| version.is_present())
            .map(|(version, name)| format!("{}:{:02x}.{:02x}", name, version.major, version.minor))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Model string with the power rating appended in the `1500i` style,
    /// unless the model already carries it.
    pub fn model_name(&self) -> String {
        let rating = format!("{}i", self.rating_va);
        if self.model.contains(&rating) {
            self.model.clone()
        } else if self.model.is_empty() {
            rating
        } else {
            format!("{} {}", self.model, rating)
        }
    }
}

fn firmware(buf: &[u8]) -> IResult<&[u8], Vec<FirmwareVersion>> {
    let (buf, cpus) = byte(buf)?;
    count(
        map(tuple((byte, byte)), |(minor, major)| FirmwareVersion { major, minor }),
        usize::from(cpus),
    )(buf)
}

fn rating(buf: &[u8]) -> IResult<&[u8], u32> {
    let (buf, kva) = byte(buf)?;
    if kva > 0 {
        Ok((buf, u32::from(kva) * 1000))
    } else {
        map(le_u16, |va| u32::from(va) * 50)(buf)
    }
}

/// Length-prefixed field. Running short is an error at the field's first byte.
fn counted(buf: &[u8]) -> IResult<&[u8], &[u8]> {
    let (buf, len) = byte(buf)?;
    take(len)(buf)
}

fn text(raw: &[u8]) -> String {
    let raw = raw.split(|b| *b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(raw).trim_end().to_string()
}

fn identification(buf: &[u8]) -> IResult<&[u8], Identification> {
    let (buf, firmware) = firmware(buf)?;
    let (buf, rating_va) = rating(buf)?;
    // phase angle is skipped
    let (buf, (phases, _)) = tuple((byte, byte))(buf)?;
    let (buf, model) = counted(buf)?;
    let (buf, meter_map) = counted(buf)?;
    let (buf, alarm_map) = counted(buf)?;
    let (buf, config_block_len) = le_u16(buf)?;
    let (buf, statistics_map) = counted(buf)?;
    let (buf, (alarm_history_len, custom_event_len, topology_block_len, max_command_len)) =
        tuple((le_u16, le_u16, le_u16, byte))(buf)?;
    // trailing sizes are missing from older firmware
    let (buf, command_list_len) = opt(le_u16)(buf)?;
    let (buf, outlet_block_len) = opt(le_u16)(buf)?;
    let (buf, alarm_block_len) = opt(le_u16)(buf)?;

    Ok((
        buf,
        Identification {
            firmware,
            rating_va,
            phases,
            model: text(model),
            meter_map: meter_map.to_vec(),
            alarm_map: alarm_map.to_vec(),
            config_block_len,
            statistics_map_len: statistics_map.len(),
            alarm_history_len,
            custom_event_len,
            topology_block_len,
            max_command_len,
            command_list_len: command_list_len.unwrap_or(0),
            outlet_block_len: outlet_block_len.unwrap_or(0),
            alarm_block_len: alarm_block_len.unwrap_or(0),
        },
    ))
}
