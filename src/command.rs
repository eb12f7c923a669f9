//! Command codes, reply status bytes and the instant commands a session can run.

use core::fmt;

pub const ID_BLOCK_REQ: u8 = 0x31;
pub const EVENT_HISTORY_LOG_REQ: u8 = 0x32;
pub const STATUS_REQ: u8 = 0x33;
pub const METER_BLOCK_REQ: u8 = 0x34;
pub const CUR_ALARM_REQ: u8 = 0x35;
pub const CONFIG_BLOCK_REQ: u8 = 0x36;
pub const BATTERY_REQ: u8 = 0x3B;
pub const LIMIT_BLOCK_REQ: u8 = 0x3C;
pub const TEST_RESULT_REQ: u8 = 0x3F;
pub const COMMAND_LIST_REQ: u8 = 0x40;
pub const OUT_MON_BLOCK_REQ: u8 = 0x41;
pub const COM_CAP_REQ: u8 = 0x42;
pub const UPS_TOP_DATA_REQ: u8 = 0x43;

pub const UPS_ON: u8 = 0x89;
pub const LOAD_OFF_RESTART: u8 = 0x8A;
pub const UPS_OFF: u8 = 0x8B;
pub const SET_OUTLET_COMMAND: u8 = 0x97;
pub const SET_REQ_ONLY_MODE: u8 = 0xA0;
pub const INIT_BAT_TEST: u8 = 0xB1;
pub const INIT_SYS_TEST: u8 = 0xB2;
pub const AUTHORIZATION_CODE: u8 = 0xCF;

/// Standard authorization block, sent ahead of any state-changing command.
pub const AUTHORIZATION: [u8; 4] = [AUTHORIZATION_CODE, 0x69, 0xE8, 0xD5];

/// Sent to wake a device on a serial line.
pub const ESCAPE: u8 = 0x1D;

const SYS_TEST_GENERAL: u8 = 0x01;
const SYS_TEST_FLASH_LIGHTS: u8 = 0x04;

/// Block number a response to `command` must carry, or `None` when any
/// block number is accepted.
pub fn expected_block(command: u8) -> Option<u8> {
    match command {
        0x30..=0x43 => Some(command - 0x30),
        SET_REQ_ONLY_MODE => Some(0x01),
        0x89..=0xFF => Some(0x09),
        _ => None,
    }
}

/// Execution status, the first payload byte of a command reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    Accepted,
    NotImplemented,
    Busy,
    Unrecognized,
    ParameterOutOfRange,
    InvalidParameter,
    AcceptedWithAdjustment,
    Other(u8),
}

impl ExecStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ExecStatus::Accepted | ExecStatus::AcceptedWithAdjustment)
    }
}

impl From<u8> for ExecStatus {
    fn from(byte: u8) -> Self {
        match byte {
            0x31 => ExecStatus::Accepted,
            0x32 => ExecStatus::NotImplemented,
            0x33 => ExecStatus::Busy,
            0x34 => ExecStatus::Unrecognized,
            0x35 => ExecStatus::ParameterOutOfRange,
            0x36 => ExecStatus::InvalidParameter,
            0x37 => ExecStatus::AcceptedWithAdjustment,
            other => ExecStatus::Other(other),
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecStatus::Accepted => f.write_str("command accepted"),
            ExecStatus::NotImplemented => f.write_str("command not implemented"),
            ExecStatus::Busy => f.write_str("device busy"),
            ExecStatus::Unrecognized => f.write_str("command not recognized"),
            ExecStatus::ParameterOutOfRange => f.write_str("parameter out of range"),
            ExecStatus::InvalidParameter => f.write_str("invalid parameter"),
            ExecStatus::AcceptedWithAdjustment => f.write_str("command accepted with adjustment"),
            ExecStatus::Other(byte) => write!(f, "unknown status {:#04x}", byte),
        }
    }
}

/// Outlet delay changed by the set outlet parameter command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OutletDelay {
    /// Delay before an automatic off.
    Shutdown,
    /// Delay before an automatic restart.
    Start,
}

impl OutletDelay {
    fn selector(self) -> u8 {
        match self {
            OutletDelay::Shutdown => 1,
            OutletDelay::Start => 2,
        }
    }

    /// Variable name, e.g. `outlet.2.delay.start`.
    pub fn variable(self, outlet: crate::Outlet) -> String {
        match self {
            OutletDelay::Shutdown => format!("outlet.{}.delay.shutdown", *outlet),
            OutletDelay::Start => format!("outlet.{}.delay.start", *outlet),
        }
    }

    /// Set outlet parameter command. `seconds` of -1 disables the action.
    pub fn encode(self, outlet: crate::Outlet, seconds: i16) -> [u8; 5] {
        let [lo, hi] = seconds.to_le_bytes();
        [SET_OUTLET_COMMAND, self.selector(), *outlet, lo, hi]
    }
}

/// Operator commands a device may advertise in its command list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InstantCommand {
    /// Turn the load off after the configured delay, restart when power returns.
    ShutdownReturn,
    /// Turn the load off and stay off.
    ShutdownStayOff,
    /// Delayed off and restart of a single outlet.
    OutletShutdownReturn { outlet: crate::Outlet, delay: u16 },
    TestBattery,
    TestSystem,
    TestPanel,
}

impl InstantCommand {
    /// Commands assumed when the device has no command list.
    pub const DEFAULT_SET: [InstantCommand; 3] = [
        InstantCommand::ShutdownReturn,
        InstantCommand::ShutdownStayOff,
        InstantCommand::TestBattery,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InstantCommand::ShutdownReturn => "shutdown.return",
            InstantCommand::ShutdownStayOff => "shutdown.stayoff",
            InstantCommand::OutletShutdownReturn { .. } => "outlet.shutdown.return",
            InstantCommand::TestBattery => "test.battery.start",
            InstantCommand::TestSystem => "test.system.start",
            InstantCommand::TestPanel => "test.panel.start",
        }
    }

    /// Look a command up by name. Outlet commands carry parameters and
    /// can't be named this way.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            InstantCommand::ShutdownReturn,
            InstantCommand::ShutdownStayOff,
            InstantCommand::TestBattery,
            InstantCommand::TestSystem,
            InstantCommand::TestPanel,
        ]
        .into_iter()
        .find(|cmd| cmd.name() == name)
    }

    /// Instant commands enabled by one entry of the device command list.
    pub fn from_list_entry(command: u8) -> &'static [InstantCommand] {
        match command {
            INIT_BAT_TEST => &[InstantCommand::TestBattery],
            INIT_SYS_TEST => &[InstantCommand::TestSystem, InstantCommand::TestPanel],
            LOAD_OFF_RESTART => &[InstantCommand::ShutdownReturn],
            UPS_OFF => &[InstantCommand::ShutdownStayOff],
            _ => &[],
        }
    }

    /// Command byte the request leads with.
    pub fn opcode(&self) -> u8 {
        match self {
            InstantCommand::ShutdownReturn | InstantCommand::OutletShutdownReturn { .. } => {
                LOAD_OFF_RESTART
            }
            InstantCommand::ShutdownStayOff => UPS_OFF,
            InstantCommand::TestBattery => INIT_BAT_TEST,
            InstantCommand::TestSystem | InstantCommand::TestPanel => INIT_SYS_TEST,
        }
    }

    /// Complete command bytes, opcode first. `shutdown_delay` is used by
    /// [`InstantCommand::ShutdownReturn`].
    pub fn encode(&self, shutdown_delay: u16) -> Vec<u8> {
        let mut bytes = vec![self.opcode()];
        match self {
            InstantCommand::ShutdownReturn => {
                bytes.extend_from_slice(&shutdown_delay.to_le_bytes());
            }
            InstantCommand::OutletShutdownReturn { outlet, delay } => {
                bytes.extend_from_slice(&delay.to_le_bytes());
                bytes.push(**outlet);
            }
            InstantCommand::ShutdownStayOff => {}
            InstantCommand::TestBattery => bytes.extend_from_slice(&[0x0A, 0x1E]),
            InstantCommand::TestSystem => bytes.push(SYS_TEST_GENERAL),
            InstantCommand::TestPanel => bytes.extend_from_slice(&[SYS_TEST_FLASH_LIGHTS, 0x0A]),
        }
        bytes
    }
}

impl fmt::Display for InstantCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstantCommand::OutletShutdownReturn { outlet, .. } => {
                write!(f, "outlet.{}.shutdown.return", **outlet)
            }
            other => f.write_str(other.name()),
        }
    }
}
