//! One monitoring session with one device.
//!
//! A [`Session`] wraps a [`Master`], negotiates the device schema at start-up
//! and keeps the most recent meter and alarm blocks for lookups by name.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, warn};
use snafu::{ensure, OptionExt, ResultExt};

use crate::blocks::{
    parse_command_list, AlarmFlags, BatteryTestResult, ConfigBlock, LimitBlock, OutletBlock,
    UpsStatus, DELAY_DISABLED,
};
use crate::command::{
    ExecStatus, InstantCommand, OutletDelay, AUTHORIZATION, BATTERY_REQ, COMMAND_LIST_REQ,
    CONFIG_BLOCK_REQ, CUR_ALARM_REQ, ID_BLOCK_REQ, LIMIT_BLOCK_REQ, METER_BLOCK_REQ,
    OUT_MON_BLOCK_REQ, SET_OUTLET_COMMAND, STATUS_REQ,
};
use crate::decode::{self, DecodedValue};
use crate::ident::Identification;
use crate::master::{
    CommError, IdentificationSnafu, InvalidSettingSnafu, Master, MalformedSnafu, RejectedSnafu,
    ShortReplySnafu, UnsupportedSnafu,
};
use crate::names;
use crate::schema::{alarm_index, alarm_name, meter_index, meter_name, Schema};
use crate::transport::Transport;
use crate::types::Outlet;

/// Outlet blocks of this size or smaller are not implemented.
const OUTLET_BLOCK_MIN: u16 = 8;
/// Off delay for an outlet whose automatic off is disabled, in seconds.
const DEFAULT_OUTLET_DELAY: u16 = 3;

/// Session-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Block sent ahead of every state-changing command.
    pub authorization: [u8; 4],
    /// Delay before a `shutdown.return` turns the load off, in seconds.
    pub shutdown_delay: u16,
    /// Pause between the authorization block and the command it unlocks.
    pub command_settle: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            authorization: AUTHORIZATION,
            shutdown_delay: 120,
            command_settle: Duration::from_secs(2),
        }
    }
}

/// Reply to an instant command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub status: ExecStatus,
    /// Seconds until a delayed shutdown takes effect, when reported.
    pub delay: Option<u16>,
}

pub struct Session<T> {
    master: Master<T>,
    settings: SessionSettings,
    ident: Identification,
    schema: Arc<Schema>,
    config: ConfigBlock,
    limits: Option<LimitBlock>,
    outlets: Option<OutletBlock>,
    commands: Vec<InstantCommand>,
    meter_block: Option<Vec<u8>>,
    alarm_block: Option<Vec<u8>>,
}

impl<T: Transport> Session<T> {
    /// Identify the device, negotiate its schema and read its configuration.
    ///
    /// The link must already be up; on a serial line run
    /// [`Master::establish_link`] first.
    pub fn establish(mut master: Master<T>, settings: SessionSettings) -> Result<Self, CommError> {
        let block = master.read(ID_BLOCK_REQ)?;
        let ident = Identification::parse(&block).context(IdentificationSnafu)?;
        info!(
            "{} ({} VA, {} phase), firmware {}",
            ident.model_name(),
            ident.rating_va,
            ident.phases,
            ident.firmware_summary()
        );
        let schema = Arc::new(Schema::negotiate(&ident.meter_map, &ident.alarm_map));

        let config = ConfigBlock::parse(&master.read(CONFIG_BLOCK_REQ)?);
        debug!(
            "serial {}, part {}, topology mask {:#04x}",
            config.serial_number, config.part_number, config.topology_mask
        );

        let limits = match master.read(LIMIT_BLOCK_REQ) {
            Ok(block) => Some(LimitBlock::parse(&block)),
            Err(err) => {
                debug!("no extended limits block: {}", err);
                None
            }
        };
        if let Some(limits) = &limits {
            let warning = limits.low_battery_warning_secs();
            if warning > 0 && u32::from(settings.shutdown_delay) > warning {
                warn!(
                    "shutdown delay of {} s is longer than the runtime left at the low battery warning (max {} s)",
                    settings.shutdown_delay, warning
                );
            }
        }

        let outlets = if ident.outlet_block_len > OUTLET_BLOCK_MIN {
            let block = master.read(OUT_MON_BLOCK_REQ)?;
            let outlets = OutletBlock::parse(&block).context(MalformedSnafu { block: "outlet" })?;
            debug!("{} switched outlets", outlets.outlets.len());
            Some(outlets)
        } else {
            None
        };

        let commands = match ident.command_list_len {
            0 => None,
            len => match master.read(COMMAND_LIST_REQ) {
                Ok(block) => parse_command_list(&block, usize::from(len)),
                Err(err) => {
                    debug!("no command list block: {}", err);
                    None
                }
            },
        };
        let commands = commands.unwrap_or_else(|| {
            debug!("using default command set");
            InstantCommand::DEFAULT_SET.to_vec()
        });

        let mut session = Session {
            master,
            settings,
            ident,
            schema,
            config,
            limits,
            outlets,
            commands,
            meter_block: None,
            alarm_block: None,
        };
        session.sync_outlet_commands();
        Ok(session)
    }

    pub fn identification(&self) -> &Identification {
        &self.ident
    }

    /// The negotiated schema. It does not change for the life of the session.
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn config(&self) -> &ConfigBlock {
        &self.config
    }

    /// Extended limits, when the device provides them.
    pub fn limits(&self) -> Option<&LimitBlock> {
        self.limits.as_ref()
    }

    /// Switched outlets, when the device has an outlet block.
    pub fn outlets(&self) -> Option<&OutletBlock> {
        self.outlets.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn master(&self) -> &Master<T> {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut Master<T> {
        &mut self.master
    }

    pub fn into_master(self) -> Master<T> {
        self.master
    }

    pub fn communication_ok(&self) -> bool {
        self.master.communication_ok()
    }

    pub fn data_stale(&self) -> bool {
        self.master.data_stale()
    }

    /// Instant commands the device supports.
    pub fn supported_commands(&self) -> &[InstantCommand] {
        &self.commands
    }

    /// Fetch a fresh meter block.
    pub fn refresh_meters(&mut self) -> Result<(), CommError> {
        let block = self.master.read(METER_BLOCK_REQ)?;
        let needed = self.schema.meters.block_len();
        if block.len() < needed {
            warn!(
                "meter block has {} bytes, schema needs {}",
                block.len(),
                needed
            );
        }
        self.meter_block = Some(block);
        Ok(())
    }

    /// Decoded value of a named meter from the last meter block.
    pub fn decoded_meter(&self, name: &str) -> Option<DecodedValue> {
        self.meter_by_index(meter_index(name)?)
    }

    /// Rendered value of a named meter from the last meter block.
    pub fn rendered_meter(&self, name: &str) -> Option<String> {
        let block = self.meter_block.as_deref()?;
        let (raw, format) = self.schema.meter_bytes(block, meter_index(name)?)?;
        Some(decode::render(raw, format))
    }

    /// Every meter the device reported in the last meter block.
    pub fn meters(&self) -> Vec<(&'static str, DecodedValue)> {
        self.schema
            .meters
            .iter()
            .filter_map(|(index, _)| Some((meter_name(index)?, self.meter_by_index(index)?)))
            .collect()
    }

    fn meter_by_index(&self, index: usize) -> Option<DecodedValue> {
        self.schema
            .decode_meter(self.meter_block.as_deref()?, index)
    }

    /// Load in percent, from apparent power or phase A current against
    /// their bar chart maxima.
    pub fn load_percent(&self) -> Option<f64> {
        [
            (names::OUTPUT_VA, names::OUTPUT_VA_BAR_CHART),
            (names::LOAD_CURRENT_PHASE_A, names::LOAD_CURRENT_PHASE_A_BAR_CHART),
        ]
        .iter()
        .find_map(|(value, max)| {
            let value = self.meter_by_index(*value)?.as_f64()?;
            let max = self.meter_by_index(*max)?.as_f64()?;
            Some(if max > 0.0 { 100.0 * value / max } else { 0.0 })
        })
    }

    /// Fetch a fresh alarm block.
    pub fn refresh_alarms(&mut self) -> Result<(), CommError> {
        let block = self.master.read(CUR_ALARM_REQ)?;
        self.alarm_block = Some(block);
        Ok(())
    }

    /// State of a named alarm in the last alarm block. `None` when the device
    /// lacks the alarm or no alarm block was read yet.
    pub fn alarm_active(&self, name: &str) -> Option<bool> {
        self.alarm_by_index(alarm_index(name)?)
    }

    fn alarm_by_index(&self, index: usize) -> Option<bool> {
        self.schema
            .alarm_active(self.alarm_block.as_deref()?, index)
    }

    /// Names of the alarms active in the last alarm block.
    pub fn active_alarms(&self) -> Vec<&'static str> {
        self.schema
            .alarms
            .iter()
            .filter(|(alarm, _)| self.alarm_by_index(*alarm) == Some(true))
            .filter_map(|(alarm, _)| alarm_name(alarm))
            .collect()
    }

    fn alarm_flags(&self) -> AlarmFlags {
        let active = |index| self.alarm_by_index(index) == Some(true);
        AlarmFlags {
            on_battery: active(names::ALARM_UPS_ON_BATTERY),
            low_battery: active(names::ALARM_BATTERY_LOW),
            replace_battery: active(names::ALARM_BATTERY_TEST_FAILED)
                || active(names::ALARM_BATTERY_NEEDS_SERVICE),
        }
    }

    /// Read the status block and combine it with the last alarm block.
    pub fn status(&mut self) -> Result<UpsStatus, CommError> {
        let block = self.master.read(STATUS_REQ)?;
        UpsStatus::parse(&block, self.config.topology_mask, self.alarm_flags())
            .context(MalformedSnafu { block: "status" })
    }

    pub fn battery_test_result(&mut self) -> Result<BatteryTestResult, CommError> {
        let block = self.master.read(BATTERY_REQ)?;
        BatteryTestResult::parse(&block).context(MalformedSnafu { block: "battery" })
    }

    /// Fetch a fresh outlet block. Does nothing on devices without one.
    pub fn refresh_outlets(&mut self) -> Result<(), CommError> {
        if self.outlets.is_none() {
            return Ok(());
        }
        let block = self.master.read(OUT_MON_BLOCK_REQ)?;
        let outlets = OutletBlock::parse(&block).context(MalformedSnafu { block: "outlet" })?;
        self.outlets = Some(outlets);
        self.sync_outlet_commands();
        Ok(())
    }

    /// Rebuild the per-outlet shutdown commands from the outlet block.
    fn sync_outlet_commands(&mut self) {
        self.commands
            .retain(|cmd| !matches!(cmd, InstantCommand::OutletShutdownReturn { .. }));
        if let Some(outlets) = &self.outlets {
            self.commands
                .extend(outlets.outlets.iter().map(|state| InstantCommand::OutletShutdownReturn {
                    outlet: state.outlet,
                    delay: u16::try_from(state.shutdown_delay).unwrap_or(DEFAULT_OUTLET_DELAY),
                }));
        }
    }

    /// Send the authorization block, then `bytes`, and check the reply status.
    fn authorized_exchange(
        &mut self,
        opcode: u8,
        bytes: &[u8],
    ) -> Result<(ExecStatus, Vec<u8>), CommError> {
        self.master
            .send_unacknowledged(&self.settings.authorization)?;
        sleep(self.settings.command_settle);

        let reply = match bytes {
            [command] => self.master.read(*command)?,
            _ => self.master.write(bytes)?,
        };
        let status = ExecStatus::from(*reply.first().context(ShortReplySnafu {
            command: opcode,
            len: 0usize,
            needed: 1usize,
        })?);
        ensure!(
            status.is_success(),
            RejectedSnafu {
                command: opcode,
                status
            }
        );
        Ok((status, reply))
    }

    /// Run an instant command, preceded by the authorization block.
    pub fn instant_command(&mut self, command: InstantCommand) -> Result<CommandReply, CommError> {
        let bytes = command.encode(self.settings.shutdown_delay);
        info!("sending {}", command);
        let (status, reply) = self.authorized_exchange(command.opcode(), &bytes)?;
        let delay = match command {
            InstantCommand::ShutdownReturn | InstantCommand::OutletShutdownReturn { .. } => {
                reply.get(2..).and_then(decode::get_word)
            }
            _ => None,
        };
        info!("{}: {}", command, status);
        Ok(CommandReply { status, delay })
    }

    /// Run an instant command given by name, if the device supports it.
    ///
    /// Outlet commands are named per outlet, e.g. `outlet.2.shutdown.return`.
    pub fn instant_command_by_name(&mut self, name: &str) -> Result<CommandReply, CommError> {
        let command = self
            .commands
            .iter()
            .copied()
            .find(|cmd| cmd.to_string() == name)
            .context(UnsupportedSnafu { name })?;
        self.instant_command(command)
    }

    /// Change an outlet's automatic off or restart delay.
    ///
    /// `seconds` ranges over 0..=32767, or [`DELAY_DISABLED`] to turn the
    /// automatic action off.
    pub fn set_outlet_delay(
        &mut self,
        outlet: Outlet,
        delay: OutletDelay,
        seconds: i16,
    ) -> Result<ExecStatus, CommError> {
        let name = delay.variable(outlet);
        let known = self
            .outlets
            .as_ref()
            .map_or(false, |outlets| outlets.get(outlet).is_some());
        ensure!(known, UnsupportedSnafu { name: name.as_str() });
        ensure!(
            seconds >= DELAY_DISABLED,
            InvalidSettingSnafu {
                name: name.as_str(),
                value: seconds
            }
        );

        let bytes = delay.encode(outlet, seconds);
        let (status, _) = self.authorized_exchange(SET_OUTLET_COMMAND, &bytes)?;
        if let Some(state) = self.outlets.as_mut().and_then(|o| o.get_mut(outlet)) {
            match delay {
                OutletDelay::Shutdown => state.shutdown_delay = seconds,
                OutletDelay::Start => state.start_delay = seconds,
            }
        }
        self.sync_outlet_commands();
        info!("{} set to {} s", name, seconds);
        Ok(status)
    }
}
