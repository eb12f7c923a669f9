#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Error, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use bcmxcp::checksum;
use bcmxcp::command::{self, expected_block, AUTHORIZATION_CODE, ESCAPE};
use bcmxcp::frame::{encode_response, LAST_FRAGMENT, SEQUENCE_MASK, START_BYTE};
use bcmxcp::transport::serial::{SerialConfig, SerialLine, SerialTransport};
use bcmxcp::transport::usb::{InterruptLink, UsbConfig, UsbTransport};
use bcmxcp::transport::Connector;
use bcmxcp::{BaudRate, RetryPolicy, SessionSettings};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fault applied to the device's next reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Swallow the command.
    Silent,
    /// Flip a bit in the first fragment.
    CorruptChecksum,
    /// Send line noise ahead of the reply.
    Noise,
    /// Drop off the bus until reconnected.
    BrokenPipe,
}

/// A device that answers framed commands from a table of payloads.
pub struct SimulatedUps {
    responses: HashMap<u8, Vec<u8>>,
    /// Largest payload per response fragment.
    pub fragment_len: usize,
    /// Line speed the device listens at. Any speed when `None`.
    pub device_baud: Option<BaudRate>,
    pub line_baud: Option<BaudRate>,
    /// Command bodies received, command byte first.
    pub received: Vec<Vec<u8>>,
    pub faults: VecDeque<Fault>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    pub escapes: usize,
    pub flushes: usize,
    pub connects: usize,
    pub refuse_connect: bool,
    pub broken: bool,
    /// Upcoming writes that are dropped and reported as zero bytes written.
    pub short_writes: usize,
    /// Largest USB packet handed out by one interrupt read.
    pub usb_packet: usize,
    /// Upcoming interrupt reads that return an empty transfer.
    pub empty_reads: usize,
    pub clear_halts: usize,
    /// Time each interrupt read takes.
    pub read_delay: Duration,
}

pub type SharedUps = Arc<Mutex<SimulatedUps>>;

impl SimulatedUps {
    pub fn new() -> SimulatedUps {
        SimulatedUps {
            responses: HashMap::new(),
            fragment_len: 32,
            device_baud: None,
            line_baud: None,
            received: Vec::new(),
            faults: VecDeque::new(),
            rx: VecDeque::new(),
            tx: Vec::new(),
            escapes: 0,
            flushes: 0,
            connects: 0,
            refuse_connect: false,
            broken: false,
            short_writes: 0,
            usb_packet: 128,
            empty_reads: 0,
            clear_halts: 0,
            read_delay: Duration::ZERO,
        }
    }

    pub fn shared(self) -> SharedUps {
        Arc::new(Mutex::new(self))
    }

    pub fn respond(&mut self, command: u8, payload: &[u8]) -> &mut Self {
        self.responses.insert(command, payload.to_vec());
        self
    }

    /// Stop answering `command`.
    pub fn ignore(&mut self, command: u8) -> &mut Self {
        self.responses.remove(&command);
        self
    }

    /// Queue raw bytes for the host.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Number of times `command` was received.
    pub fn count(&self, command: u8) -> usize {
        self.received.iter().filter(|c| c[0] == command).count()
    }

    /// Response frames for `payload`, split in `fragment_len` chunks.
    pub fn frames(&self, command: u8, payload: &[u8]) -> Vec<Vec<u8>> {
        let block = expected_block(command).unwrap_or(command);
        let chunks: Vec<&[u8]> = payload.chunks(self.fragment_len.max(1)).collect();
        let last = chunks.len() - 1;
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut sequence = ((i + 1) as u8) & SEQUENCE_MASK;
                if i == last {
                    sequence |= LAST_FRAGMENT;
                }
                encode_response(block, sequence, chunk).expect("fragment fits a frame")
            })
            .collect()
    }

    fn host_wrote(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
        loop {
            while let Some(&byte) = self.tx.first() {
                if byte == START_BYTE {
                    break;
                }
                if byte == ESCAPE {
                    self.escapes += 1;
                }
                self.tx.remove(0);
            }
            if self.tx.len() < 2 {
                return;
            }
            let total = usize::from(self.tx[1]) + 3;
            if self.tx.len() < total {
                return;
            }
            let frame: Vec<u8> = self.tx.drain(..total).collect();
            if checksum::validate(&frame) {
                self.command(frame[2..total - 1].to_vec());
            }
        }
    }

    fn command(&mut self, body: Vec<u8>) {
        let opcode = match body.first() {
            Some(&opcode) => opcode,
            None => return,
        };
        self.received.push(body);
        if opcode == AUTHORIZATION_CODE {
            return;
        }
        if let (Some(device), Some(line)) = (self.device_baud, self.line_baud) {
            if device != line {
                return;
            }
        }
        let payload = match self.responses.get(&opcode) {
            Some(payload) => payload.clone(),
            None => return,
        };
        let mut frames = self.frames(opcode, &payload);
        match self.faults.pop_front() {
            Some(Fault::Silent) => return,
            Some(Fault::BrokenPipe) => {
                self.broken = true;
                return;
            }
            Some(Fault::CorruptChecksum) => {
                let last = frames[0].len() - 1;
                frames[0][last] ^= 0x01;
            }
            Some(Fault::Noise) => self.inject(&[0x00, 0x55, 0x13]),
            None => {}
        }
        for frame in frames {
            self.inject(&frame);
        }
    }
}

impl Default for SimulatedUps {
    fn default() -> Self {
        SimulatedUps::new()
    }
}

fn lock(ups: &SharedUps) -> MutexGuard<'_, SimulatedUps> {
    ups.lock().expect("simulated UPS poisoned")
}

fn broken_pipe() -> Error {
    Error::new(ErrorKind::BrokenPipe, "device gone")
}

/// Serial port end of a [`SimulatedUps`].
pub struct SerialIOPlane(SharedUps);

impl io::Read for SerialIOPlane {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut ups = lock(&self.0);
        if ups.broken {
            return Err(broken_pipe());
        }
        if ups.rx.is_empty() {
            return Err(Error::new(ErrorKind::TimedOut, "no data"));
        }
        let len = buf.len().min(ups.rx.len());
        for (slot, byte) in buf.iter_mut().zip(ups.rx.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl io::Write for SerialIOPlane {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut ups = lock(&self.0);
        if ups.broken {
            return Err(broken_pipe());
        }
        if ups.short_writes > 0 {
            ups.short_writes -= 1;
            return Ok(0);
        }
        ups.host_wrote(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLine for SerialIOPlane {
    fn clear_input(&mut self) -> io::Result<()> {
        let mut ups = lock(&self.0);
        ups.flushes += 1;
        ups.rx.clear();
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: BaudRate) -> io::Result<()> {
        lock(&self.0).line_baud = Some(baud_rate);
        Ok(())
    }
}

/// USB end of a [`SimulatedUps`].
pub struct UsbIOPlane(SharedUps);

impl InterruptLink for UsbIOPlane {
    fn send_command(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut ups = lock(&self.0);
        if ups.broken {
            return Err(broken_pipe());
        }
        ups.host_wrote(frame);
        Ok(frame.len())
    }

    fn read_interrupt(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let delay = lock(&self.0).read_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let mut ups = lock(&self.0);
        if ups.broken {
            return Err(broken_pipe());
        }
        if ups.empty_reads > 0 {
            ups.empty_reads -= 1;
            return Ok(0);
        }
        if ups.rx.is_empty() {
            return Err(Error::new(ErrorKind::TimedOut, "no data"));
        }
        let len = buf.len().min(ups.usb_packet).min(ups.rx.len());
        for (slot, byte) in buf.iter_mut().zip(ups.rx.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }

    fn clear_halt(&mut self) -> io::Result<()> {
        lock(&self.0).clear_halts += 1;
        Ok(())
    }
}

/// Hands out links to a [`SimulatedUps`], counting connections.
pub struct SimConnector(pub SharedUps);

fn connect(ups: &SharedUps) -> io::Result<()> {
    let mut ups = lock(ups);
    if ups.refuse_connect {
        return Err(Error::new(ErrorKind::NotFound, "no such device"));
    }
    ups.connects += 1;
    ups.broken = false;
    ups.rx.clear();
    Ok(())
}

impl Connector for SimConnector {
    type Link = SerialIOPlane;

    fn connect(&mut self) -> io::Result<SerialIOPlane> {
        connect(&self.0)?;
        Ok(SerialIOPlane(Arc::clone(&self.0)))
    }
}

pub struct SimUsbConnector(pub SharedUps);

impl Connector for SimUsbConnector {
    type Link = UsbIOPlane;

    fn connect(&mut self) -> io::Result<UsbIOPlane> {
        connect(&self.0)?;
        Ok(UsbIOPlane(Arc::clone(&self.0)))
    }
}

pub fn fast_serial_config() -> SerialConfig {
    SerialConfig {
        path: String::from("sim"),
        baud_rate: None,
        byte_timeout: Duration::from_millis(10),
        wake_delay: Duration::ZERO,
        auth_delay: Duration::ZERO,
        escape_delay: Duration::ZERO,
    }
}

pub fn fast_usb_config() -> UsbConfig {
    UsbConfig {
        read_timeout: Duration::from_millis(200),
        open_attempts: 1,
        reset_wait: Duration::ZERO,
    }
}

pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        command_settle: Duration::ZERO,
        ..Default::default()
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
}

pub fn serial_transport(ups: &SharedUps) -> SerialTransport<SimConnector> {
    SerialTransport::with_connector(SimConnector(Arc::clone(ups)), fast_serial_config())
        .expect("simulated serial link")
}

pub fn usb_transport(ups: &SharedUps) -> UsbTransport<SimUsbConnector> {
    UsbTransport::with_connector(SimUsbConnector(Arc::clone(ups)), &fast_usb_config())
        .expect("simulated USB link")
}

// Layout of the reference device
pub const METER_OUTPUT_VOLTS_AB: usize = 0;
pub const METER_OUTPUT_VA: usize = 23;
pub const METER_OUTPUT_FREQUENCY: usize = 27;
pub const METER_OUTPUT_VA_BAR_CHART: usize = 71;
pub const REFERENCE_ALARMS: [usize; 4] = [56, 149, 168, 191];

pub fn meter_formats() -> Vec<u8> {
    let mut formats = vec![0u8; 72];
    formats[METER_OUTPUT_VOLTS_AB] = 0x51;
    formats[METER_OUTPUT_VA] = 0xF0;
    formats[METER_OUTPUT_FREQUENCY] = 0x41;
    formats[METER_OUTPUT_VA_BAR_CHART] = 0xF0;
    formats
}

pub fn alarm_bitmap() -> Vec<u8> {
    let mut bitmap = vec![0u8; 24];
    for alarm in REFERENCE_ALARMS {
        bitmap[alarm / 8] |= 1 << (alarm % 8);
    }
    bitmap
}

pub fn meter_block(volts: f32, va: u32, hz: f32, max_va: u32) -> Vec<u8> {
    let mut block = Vec::new();
    block.extend_from_slice(&volts.to_le_bytes());
    block.extend_from_slice(&va.to_le_bytes());
    block.extend_from_slice(&hz.to_le_bytes());
    block.extend_from_slice(&max_va.to_le_bytes());
    block
}

pub fn id_block(meter_map: &[u8], alarm_map: &[u8], command_list_len: u16) -> Vec<u8> {
    id_block_with_outlets(meter_map, alarm_map, command_list_len, 0)
}

pub fn id_block_with_outlets(
    meter_map: &[u8],
    alarm_map: &[u8],
    command_list_len: u16,
    outlet_block_len: u16,
) -> Vec<u8> {
    let mut block = vec![1, 0x20, 0x01]; // one processor, firmware 01.20
    block.extend_from_slice(&[0, 0x1E, 0x00]); // 1500 VA
    block.extend_from_slice(&[1, 0]); // single phase
    let model = b"PW9130";
    block.push(model.len() as u8);
    block.extend_from_slice(model);
    block.push(meter_map.len() as u8);
    block.extend_from_slice(meter_map);
    block.push(alarm_map.len() as u8);
    block.extend_from_slice(alarm_map);
    block.extend_from_slice(&80u16.to_le_bytes()); // config block
    block.push(0); // statistics map
    block.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0x40]);
    block.extend_from_slice(&command_list_len.to_le_bytes());
    block.extend_from_slice(&outlet_block_len.to_le_bytes());
    block.extend_from_slice(&[4, 0]); // alarm block
    block
}

pub fn config_block() -> Vec<u8> {
    let mut block = vec![0u8; 80];
    block[8..10].copy_from_slice(&230u16.to_le_bytes());
    block[10..12].copy_from_slice(&50u16.to_le_bytes());
    block[16] = 0x20;
    block[48..57].copy_from_slice(b"103006424");
    block[64..74].copy_from_slice(b"GA22B0001 ");
    block
}

pub fn limit_block() -> Vec<u8> {
    let mut block = vec![0u8; 32];
    block[0..2].copy_from_slice(&230u16.to_le_bytes());
    block[2..4].copy_from_slice(&50u16.to_le_bytes());
    block[8..10].copy_from_slice(&300u16.to_le_bytes()); // 3 Hz deviation
    block[10..12].copy_from_slice(&190u16.to_le_bytes());
    block[12..14].copy_from_slice(&250u16.to_le_bytes());
    block[16] = 3; // low battery warning, minutes
    block[17] = 1; // horn enabled
    block
}

/// Outlet block with outlet 1 on (off delay 30 s, no restart) and outlet 2
/// on (restart after 5 s).
pub fn outlet_block(second_off_delay: u16) -> Vec<u8> {
    let mut block = vec![2, 6];
    block.extend_from_slice(&[1, 1, 30, 0, 0xFF, 0xFF]);
    block.extend_from_slice(&[2, 1]);
    block.extend_from_slice(&second_off_delay.to_le_bytes());
    block.extend_from_slice(&[5, 0]);
    block
}

/// A single-phase device that implements four meters, four alarms and a
/// command list.
pub fn reference_ups() -> SimulatedUps {
    let mut ups = SimulatedUps::new();
    ups.respond(command::ID_BLOCK_REQ, &id_block(&meter_formats(), &alarm_bitmap(), 5))
        .respond(command::CONFIG_BLOCK_REQ, &config_block())
        .respond(command::LIMIT_BLOCK_REQ, &limit_block())
        .respond(command::COMMAND_LIST_REQ, &[3, 1, 0xB1, 0x8A, 0x8B])
        .respond(command::METER_BLOCK_REQ, &meter_block(230.0, 600, 50.0, 1500))
        .respond(command::CUR_ALARM_REQ, &[0, 0, 1, 0])
        .respond(command::STATUS_REQ, &[0xF0, 0x00])
        .respond(command::BATTERY_REQ, &[2, 0, 0x78, 0x1D])
        .respond(command::SET_REQ_ONLY_MODE, &[0x31])
        .respond(command::LOAD_OFF_RESTART, &[0x31, 0x00, 0x78, 0x00])
        .respond(command::UPS_OFF, &[0x31])
        .respond(command::INIT_BAT_TEST, &[0x31])
        .respond(command::INIT_SYS_TEST, &[0x32]);
    ups
}

/// The reference device with two switched outlets.
pub fn outlet_ups() -> SimulatedUps {
    let mut ups = reference_ups();
    let id = id_block_with_outlets(&meter_formats(), &alarm_bitmap(), 5, 14);
    ups.respond(command::ID_BLOCK_REQ, &id)
        .respond(command::OUT_MON_BLOCK_REQ, &outlet_block(10))
        .respond(command::SET_OUTLET_COMMAND, &[0x31]);
    ups
}
