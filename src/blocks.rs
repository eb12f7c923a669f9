//! Decoders for the fixed-layout blocks: configuration, extended limits,
//! outlet monitoring, status, battery and command list.

use core::fmt;

use crate::command::InstantCommand;
use crate::decode::get_word;
use crate::types::Outlet;

const CONFIG_NOMINAL_OUTPUT_VOLTAGE: usize = 8;
const CONFIG_NOMINAL_OUTPUT_FREQ: usize = 10;
const CONFIG_TOPOLOGY_MASK: usize = 16;
const CONFIG_PART_NUMBER: usize = 48;
const CONFIG_SERIAL_NUMBER: usize = 64;
const CONFIG_TEXT_LEN: usize = 16;

/// Topology bit signalling a low battery.
const TOPOLOGY_LOW_BATTERY: u8 = 0x20;

/// Static configuration (reply to `0x36`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigBlock {
    /// Valid bits of the status topology byte.
    pub topology_mask: u8,
    pub nominal_output_voltage: Option<u16>,
    pub nominal_output_frequency: Option<u16>,
    pub part_number: String,
    pub serial_number: String,
}

fn config_text(block: &[u8], offset: usize) -> String {
    let raw = match block.get(offset..) {
        Some(rest) => &rest[..rest.len().min(CONFIG_TEXT_LEN)],
        None => return String::new(),
    };
    let raw = raw.split(|b| *b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(raw).to_string()
}

impl ConfigBlock {
    /// Decode the fields present in `block`. Missing fields stay empty.
    pub fn parse(block: &[u8]) -> Self {
        let nonzero = |offset: usize| {
            block
                .get(offset..)
                .and_then(get_word)
                .filter(|word| *word != 0)
        };
        let serial_number = config_text(block, CONFIG_SERIAL_NUMBER);
        let serial_number = match serial_number.find(' ') {
            Some(end) => serial_number[..end].to_string(),
            None => serial_number,
        };
        ConfigBlock {
            topology_mask: block.get(CONFIG_TOPOLOGY_MASK).copied().unwrap_or(0),
            nominal_output_voltage: nonzero(CONFIG_NOMINAL_OUTPUT_VOLTAGE),
            nominal_output_frequency: nonzero(CONFIG_NOMINAL_OUTPUT_FREQ),
            part_number: config_text(block, CONFIG_PART_NUMBER).trim_end().to_string(),
            serial_number,
        }
    }
}

const LIMIT_NOMINAL_INPUT_VOLTAGE: usize = 0;
const LIMIT_NOMINAL_INPUT_FREQ: usize = 2;
const LIMIT_FREQ_DEVIATION: usize = 8;
const LIMIT_VOLTAGE_LOW_DEVIATION: usize = 10;
const LIMIT_VOLTAGE_HIGH_DEVIATION: usize = 12;
const LIMIT_LOW_BATTERY_WARNING: usize = 16;
const LIMIT_HORN_STATUS: usize = 17;
const LIMIT_MIN_INPUT_VOLTAGE: usize = 18;
const LIMIT_MAX_INPUT_VOLTAGE: usize = 20;
const LIMIT_AMBIENT_TEMP_LOW: usize = 25;
const LIMIT_AMBIENT_TEMP_HIGH: usize = 26;

/// Audible alarm setting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HornStatus {
    Disabled,
    Enabled,
    Muted,
}

impl HornStatus {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(HornStatus::Disabled),
            1 => Some(HornStatus::Enabled),
            2 => Some(HornStatus::Muted),
            _ => None,
        }
    }
}

impl fmt::Display for HornStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HornStatus::Disabled => f.write_str("disabled"),
            HornStatus::Enabled => f.write_str("enabled"),
            HornStatus::Muted => f.write_str("muted"),
        }
    }
}

/// Input thresholds and alarm settings (reply to `0x3C`).
///
/// Zero words mean the device does not report the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitBlock {
    pub nominal_input_voltage: Option<u16>,
    pub nominal_input_frequency: Option<u16>,
    /// Allowed input frequency deviation in hundredths of a hertz.
    pub frequency_deviation: Option<u16>,
    /// Input voltage below which the device boosts.
    pub boost_transfer: Option<u16>,
    /// Input voltage above which the device trims.
    pub trim_transfer: Option<u16>,
    /// Runtime left when the low battery warning is raised, in minutes.
    pub low_battery_warning: u8,
    pub horn: Option<HornStatus>,
    pub min_input_voltage: Option<u16>,
    pub max_input_voltage: Option<u16>,
    pub ambient_temperature_low: Option<u8>,
    pub ambient_temperature_high: Option<u8>,
}

impl LimitBlock {
    /// Decode the fields present in `block`. Missing fields stay empty.
    pub fn parse(block: &[u8]) -> Self {
        let word = |offset: usize| {
            block
                .get(offset..)
                .and_then(get_word)
                .filter(|word| *word != 0)
        };
        let byte = |offset: usize| block.get(offset).copied();
        LimitBlock {
            nominal_input_voltage: word(LIMIT_NOMINAL_INPUT_VOLTAGE),
            nominal_input_frequency: word(LIMIT_NOMINAL_INPUT_FREQ),
            frequency_deviation: word(LIMIT_FREQ_DEVIATION),
            boost_transfer: word(LIMIT_VOLTAGE_LOW_DEVIATION),
            trim_transfer: word(LIMIT_VOLTAGE_HIGH_DEVIATION),
            low_battery_warning: byte(LIMIT_LOW_BATTERY_WARNING).unwrap_or(0),
            horn: byte(LIMIT_HORN_STATUS).and_then(HornStatus::from_byte),
            min_input_voltage: word(LIMIT_MIN_INPUT_VOLTAGE),
            max_input_voltage: word(LIMIT_MAX_INPUT_VOLTAGE),
            ambient_temperature_low: byte(LIMIT_AMBIENT_TEMP_LOW).filter(|t| *t != 0),
            ambient_temperature_high: byte(LIMIT_AMBIENT_TEMP_HIGH).filter(|t| *t != 0),
        }
    }

    /// Runtime left when the low battery warning is raised, in seconds.
    pub fn low_battery_warning_secs(&self) -> u32 {
        u32::from(self.low_battery_warning) * 60
    }

    /// Accepted input frequency range in whole hertz, `(low, high)`.
    pub fn input_frequency_range(&self) -> Option<(u16, u16)> {
        let nominal = self.nominal_input_frequency?;
        let deviation = self.frequency_deviation? / 100;
        if deviation == 0 {
            return None;
        }
        Some((nominal.saturating_sub(deviation), nominal.saturating_add(deviation)))
    }
}

/// Bytes per outlet in the outlet monitoring block.
const OUTLET_RECORD_LEN: usize = 6;
/// Delay value meaning the automatic action is disabled.
pub const DELAY_DISABLED: i16 = -1;

/// One switched outlet (load segment).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OutletState {
    /// Position in the outlet block, used to address the outlet.
    pub outlet: Outlet,
    /// Identifier the device reports for the outlet.
    pub id: u8,
    pub on: bool,
    /// Seconds before an automatic off, [`DELAY_DISABLED`] when disabled.
    pub shutdown_delay: i16,
    /// Seconds before an automatic restart, [`DELAY_DISABLED`] when disabled.
    pub start_delay: i16,
}

impl fmt::Display for OutletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "outlet {} (id {}): {}, shutdown delay {}, start delay {}",
            *self.outlet,
            self.id,
            if self.on { "On" } else { "Off" },
            self.shutdown_delay,
            self.start_delay
        )
    }
}

/// Outlet monitoring block (reply to `0x41`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutletBlock {
    pub outlets: Vec<OutletState>,
}

impl OutletBlock {
    /// Decode the outlet records. `None` when the block is shorter than its
    /// outlet count says.
    pub fn parse(block: &[u8]) -> Option<Self> {
        let count = usize::from(*block.first()?);
        let records = block.get(2..2 + count * OUTLET_RECORD_LEN)?;
        let outlets = records
            .chunks_exact(OUTLET_RECORD_LEN)
            .enumerate()
            .map(|(i, record)| {
                Some(OutletState {
                    outlet: Outlet::new(i + 1).ok()?,
                    id: record[0],
                    on: record[1] & 0x01 != 0,
                    shutdown_delay: get_word(&record[2..])? as i16,
                    start_delay: get_word(&record[4..])? as i16,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(OutletBlock { outlets })
    }

    pub fn get(&self, outlet: Outlet) -> Option<&OutletState> {
        self.outlets.iter().find(|state| state.outlet == outlet)
    }

    pub fn get_mut(&mut self, outlet: Outlet) -> Option<&mut OutletState> {
        self.outlets.iter_mut().find(|state| state.outlet == outlet)
    }
}

/// Overall operating state from the status block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperatingState {
    Online,
    OnBattery,
    Overload,
    Trim,
    Boost,
    Bypass,
    Off,
    /// Unlisted codes are treated as online.
    Other(u8),
}

impl From<u8> for OperatingState {
    fn from(code: u8) -> Self {
        match code {
            0x50 => OperatingState::Online,
            0xF0 => OperatingState::OnBattery,
            0xE0 => OperatingState::Overload,
            0x63 => OperatingState::Trim,
            0x61 | 0x62 => OperatingState::Boost,
            0x60 => OperatingState::Bypass,
            0x10 => OperatingState::Off,
            other => OperatingState::Other(other),
        }
    }
}

/// Alarm flags that refine the reported status.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AlarmFlags {
    pub on_battery: bool,
    pub low_battery: bool,
    pub replace_battery: bool,
}

/// Device status, combining the status block with the current alarms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UpsStatus {
    pub state: OperatingState,
    pub on_battery: bool,
    pub low_battery: bool,
    pub replace_battery: bool,
}

impl UpsStatus {
    /// Decode a status block. `topology_mask` comes from the configuration block.
    pub fn parse(block: &[u8], topology_mask: u8, alarms: AlarmFlags) -> Option<Self> {
        let state = OperatingState::from(*block.first()?);
        let topology = block.get(1).copied().unwrap_or(0) & topology_mask;
        Some(UpsStatus {
            state,
            on_battery: state == OperatingState::OnBattery || alarms.on_battery,
            low_battery: topology & TOPOLOGY_LOW_BATTERY != 0 || alarms.low_battery,
            replace_battery: alarms.replace_battery,
        })
    }

    /// Status flags in the conventional short form, e.g. `["OL", "TRIM"]`.
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        match self.state {
            OperatingState::OnBattery => {}
            OperatingState::Off => flags.push("OFF"),
            _ => flags.push("OL"),
        }
        match self.state {
            OperatingState::Overload => flags.push("OVER"),
            OperatingState::Trim => flags.push("TRIM"),
            OperatingState::Boost => flags.push("BOOST"),
            OperatingState::Bypass => flags.push("BYPASS"),
            _ => {}
        }
        if self.on_battery {
            flags.push("OB");
        }
        if self.low_battery {
            flags.push("LB");
        }
        if self.replace_battery {
            flags.push("RB");
        }
        flags
    }
}

impl fmt::Display for UpsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flags().join(" "))
    }
}

/// Result of the last battery test (first byte of the battery block).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BatteryTestResult {
    NoTest,
    InProgress,
    Passed,
    Aborted,
    Failed,
    Scheduled,
    Other(u8),
}

impl BatteryTestResult {
    pub fn parse(block: &[u8]) -> Option<Self> {
        Some(match *block.first()? {
            0 => BatteryTestResult::NoTest,
            1 => BatteryTestResult::InProgress,
            2 => BatteryTestResult::Passed,
            3 => BatteryTestResult::Aborted,
            4 => BatteryTestResult::Failed,
            5 => BatteryTestResult::Scheduled,
            other => BatteryTestResult::Other(other),
        })
    }
}

impl fmt::Display for BatteryTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatteryTestResult::NoTest => f.write_str("No test initiated"),
            BatteryTestResult::InProgress => f.write_str("In progress"),
            BatteryTestResult::Passed => f.write_str("Done and passed"),
            BatteryTestResult::Aborted => f.write_str("Aborted"),
            BatteryTestResult::Failed => f.write_str("Done and error"),
            BatteryTestResult::Scheduled => f.write_str("Test scheduled"),
            BatteryTestResult::Other(code) => write!(f, "Unknown result {}", code),
        }
    }
}

/// Decode the command list block (reply to `0x40`) into the instant commands
/// it enables. `None` when the block disagrees with the size advertised in
/// the identification block.
pub fn parse_command_list(block: &[u8], advertised_len: usize) -> Option<Vec<InstantCommand>> {
    let count = usize::from(*block.first()?);
    if count + 2 != advertised_len {
        return None;
    }
    let entries = block.get(2..2 + count)?;
    let mut commands: Vec<InstantCommand> = Vec::new();
    for entry in entries {
        for command in InstantCommand::from_list_entry(*entry) {
            if !commands.contains(command) {
                commands.push(*command);
            }
        }
    }
    Some(commands)
}
