//! BCM/XCP protocol engine for uninterruptible power supplies.
//!
//! The crate talks to a UPS over a serial line or USB. It frames and checks
//! commands and responses, reassembles fragmented replies, retries failed
//! exchanges and decodes the device's self-described meter and alarm blocks.
//!
//! A [`Master`] runs command/response exchanges over a
//! [`Transport`](transport::Transport); a [`Session`] builds on it to
//! identify the device and read its telemetry by name.
//!
//! # Example
//!
//! ```no_run
//! use bcmxcp::transport::serial::{SerialConfig, SerialTransport};
//! use bcmxcp::{Master, Session, SessionSettings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = SerialTransport::open(SerialConfig::new("/dev/ttyUSB0"))?;
//! let mut master = Master::new(transport);
//! let settings = SessionSettings::default();
//! master.establish_link(&settings.authorization)?;
//!
//! let mut session = Session::establish(master, settings)?;
//! session.refresh_meters()?;
//! if let Some(volts) = session.decoded_meter("output_volts_ab") {
//!     println!("output voltage: {}", volts);
//! }
//! # Ok(()) }
//! ```

pub mod blocks;
mod buffer;
pub mod checksum;
pub mod command;
pub mod decode;
pub mod frame;
pub mod ident;
pub mod master;
pub mod names;
pub mod reassembler;
pub mod schema;
pub mod session;
pub mod transport;
mod types;

pub use crate::command::{ExecStatus, InstantCommand};
pub use crate::decode::DecodedValue;
pub use crate::master::{CommError, Master, RetryPolicy};
pub use crate::schema::Schema;
pub use crate::session::{Session, SessionSettings};
pub use crate::types::{baud, BaudRate, Error, Outlet};
