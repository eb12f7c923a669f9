//! Per-device layout of the meter and alarm blocks.
//!
//! The identification block tells which meters and alarms a device
//! implements. From that the negotiated [`Schema`] derives where each meter
//! sits in the meter block and which byte of the alarm block belongs to each
//! alarm. The schema is built once per session and is read-only afterwards,
//! so it can be shared freely between threads.

use log::{debug, trace};

use crate::decode::{self, DecodedValue, FORMAT_ABSENT, METER_WIDTH};
use crate::names::{ALARM_NAMES, METER_NAMES};

/// Meter map entries considered.
pub const METER_MAP_MAX: usize = 136;
/// Alarm map entries considered.
pub const ALARM_MAP_MAX: usize = 264;

/// Alarm block index of an alarm the device does not implement.
pub const NOT_PRESENT: i16 = -1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeterEntry {
    pub format: u8,
    /// Byte offset of the value in the meter block.
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeterMap {
    formats: Vec<u8>,
    offsets: Vec<usize>,
}

impl MeterMap {
    /// Build the map from the format bytes of the identification block.
    ///
    /// Present meters are packed in index order, four bytes each.
    pub fn negotiate(formats: &[u8]) -> Self {
        let formats: Vec<u8> = formats.iter().copied().take(METER_MAP_MAX).collect();
        let mut next_offset = 0;
        let offsets = formats
            .iter()
            .map(|format| {
                let offset = next_offset;
                if *format != FORMAT_ABSENT {
                    next_offset += METER_WIDTH;
                }
                offset
            })
            .collect();
        MeterMap { formats, offsets }
    }

    pub fn get(&self, index: usize) -> Option<MeterEntry> {
        match self.formats.get(index) {
            Some(&format) if format != FORMAT_ABSENT => Some(MeterEntry {
                format,
                offset: self.offsets[index],
            }),
            _ => None,
        }
    }

    /// Number of meters the device implements.
    pub fn present(&self) -> usize {
        self.formats.iter().filter(|f| **f != FORMAT_ABSENT).count()
    }

    /// Bytes a full meter block occupies.
    pub fn block_len(&self) -> usize {
        self.present() * METER_WIDTH
    }

    /// Present meters, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, MeterEntry)> + '_ {
        (0..self.formats.len()).filter_map(move |index| Some((index, self.get(index)?)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmMap {
    slots: Vec<i16>,
}

impl AlarmMap {
    /// Build the map from the alarm bitmap of the identification block.
    ///
    /// Bits are taken least significant first within each byte. Every set bit
    /// gets the next alarm block index.
    pub fn negotiate(bitmap: &[u8]) -> Self {
        let mut next: i16 = 0;
        let slots = bitmap
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
            .take(ALARM_MAP_MAX)
            .map(|present| {
                if present {
                    next += 1;
                    next - 1
                } else {
                    NOT_PRESENT
                }
            })
            .collect();
        AlarmMap { slots }
    }

    /// Alarm block index for `alarm`, or [`NOT_PRESENT`].
    pub fn slot(&self, alarm: usize) -> i16 {
        self.slots.get(alarm).copied().unwrap_or(NOT_PRESENT)
    }

    pub fn position(&self, alarm: usize) -> Option<usize> {
        usize::try_from(self.slot(alarm)).ok()
    }

    /// Number of alarms the device implements.
    pub fn present(&self) -> usize {
        self.slots.iter().filter(|s| **s >= 0).count()
    }

    /// Implemented alarms as (alarm, block index) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.slots.len()).filter_map(move |alarm| Some((alarm, self.position(alarm)?)))
    }
}

pub fn meter_index(name: &str) -> Option<usize> {
    METER_NAMES.iter().position(|n| *n == name)
}

pub fn meter_name(index: usize) -> Option<&'static str> {
    METER_NAMES.get(index).copied()
}

pub fn alarm_index(name: &str) -> Option<usize> {
    ALARM_NAMES.iter().position(|n| *n == Some(name))
}

pub fn alarm_name(index: usize) -> Option<&'static str> {
    ALARM_NAMES.get(index).copied().flatten()
}

/// Negotiated meter and alarm layout of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub meters: MeterMap,
    pub alarms: AlarmMap,
}

impl Schema {
    pub fn negotiate(meter_formats: &[u8], alarm_bitmap: &[u8]) -> Self {
        let meters = MeterMap::negotiate(meter_formats);
        let alarms = AlarmMap::negotiate(alarm_bitmap);
        debug!(
            "schema: {} meters ({} byte block), {} alarms",
            meters.present(),
            meters.block_len(),
            alarms.present()
        );
        for (index, entry) in meters.iter() {
            trace!(
                "meter {:3} {:<40} offset {:3} format {:#04x}",
                index,
                meter_name(index).unwrap_or("?"),
                entry.offset,
                entry.format
            );
        }
        Schema { meters, alarms }
    }

    /// Raw bytes of meter `index` in a meter block.
    pub fn meter_bytes<'a>(&self, block: &'a [u8], index: usize) -> Option<(&'a [u8], u8)> {
        let entry = self.meters.get(index)?;
        let raw = block.get(entry.offset..entry.offset + METER_WIDTH)?;
        Some((raw, entry.format))
    }

    /// Decode meter `index` out of a meter block. `None` when the device
    /// lacks the meter or the block is too short to hold it.
    pub fn decode_meter(&self, block: &[u8], index: usize) -> Option<DecodedValue> {
        let (raw, format) = self.meter_bytes(block, index)?;
        Some(decode::decode(raw, format))
    }

    /// State of alarm `index` in an alarm block. `None` when the device lacks
    /// the alarm or the block is too short.
    pub fn alarm_active(&self, block: &[u8], index: usize) -> Option<bool> {
        let position = self.alarms.position(index)?;
        block.get(position).map(|byte| *byte != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_offsets() {
        let map = MeterMap::negotiate(&[0x00, 0xF0, 0x00, 0x32, 0x00]);
        assert_eq!(map.get(0), None);
        assert_eq!(
            map.get(1),
            Some(MeterEntry {
                format: 0xF0,
                offset: 0
            })
        );
        assert_eq!(map.get(2), None);
        assert_eq!(
            map.get(3),
            Some(MeterEntry {
                format: 0x32,
                offset: 4
            })
        );
        assert_eq!(map.get(4), None);
        assert_eq!(map.get(500), None);
        assert_eq!(map.present(), 2);
        assert_eq!(map.block_len(), 8);
    }

    #[test]
    fn test_meter_map_limit() {
        let map = MeterMap::negotiate(&[0xF0; 200]);
        assert_eq!(map.present(), METER_MAP_MAX);
        assert_eq!(map.get(METER_MAP_MAX - 1).unwrap().offset, (METER_MAP_MAX - 1) * 4);
        assert_eq!(map.get(METER_MAP_MAX), None);
    }

    #[test]
    fn test_alarm_slots() {
        let map = AlarmMap::negotiate(&[0b0000_0101, 0x00]);
        assert_eq!(map.slot(0), 0);
        assert_eq!(map.slot(1), NOT_PRESENT);
        assert_eq!(map.slot(2), 1);
        for alarm in 3..16 {
            assert_eq!(map.slot(alarm), NOT_PRESENT);
        }
        assert_eq!(map.slot(16), NOT_PRESENT);
        assert_eq!(map.present(), 2);

        let map = AlarmMap::negotiate(&[0x80, 0x01]);
        assert_eq!(map.position(7), Some(0));
        assert_eq!(map.position(8), Some(1));
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(7, 0), (8, 1)]);
    }

    #[test]
    fn test_names() {
        assert_eq!(meter_index("output_va"), Some(23));
        assert_eq!(meter_name(71), Some("output_va_bar_chart"));
        assert_eq!(alarm_index("ups_on_battery"), Some(168));
        assert_eq!(alarm_name(56), Some("battery_low"));
        assert_eq!(alarm_name(245), None);
        assert_eq!(alarm_name(1000), None);
        assert_eq!(meter_index("no_such_meter"), None);
    }

    #[test]
    fn test_decode_from_block() {
        let schema = Schema::negotiate(&[0x00, 0xF0, 0x00, 0xF1], &[0b11]);
        let block = [10, 0, 0, 0, 25, 0, 0, 0];
        assert_eq!(
            schema.decode_meter(&block, 1),
            Some(DecodedValue::Integer(10))
        );
        assert_eq!(
            schema.decode_meter(&block, 3),
            Some(DecodedValue::Fixed(12.5))
        );
        assert_eq!(schema.decode_meter(&block, 0), None);
        assert_eq!(schema.decode_meter(&block[..6], 3), None);

        assert_eq!(schema.alarm_active(&[0, 1], 0), Some(false));
        assert_eq!(schema.alarm_active(&[0, 1], 1), Some(true));
        assert_eq!(schema.alarm_active(&[0, 1], 2), None);
        assert_eq!(schema.alarm_active(&[0], 1), None);
    }
}
