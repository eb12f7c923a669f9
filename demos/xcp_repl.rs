use anyhow::{Context, Result};
use std::io::Write;
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};
use std::sync::mpsc;

use bcmxcp::command::OutletDelay;
use bcmxcp::transport::serial::{PortConnector, SerialConfig, SerialTransport};
use bcmxcp::{BaudRate, Master, Outlet, Session, SessionSettings};

type Ups = Session<SerialTransport<PortConnector>>;

fn cmd_id(ups: &mut Ups) -> Result<()> {
    let ident = ups.identification();
    println!("model:    {}", ident.model_name());
    println!("firmware: {}", ident.firmware_summary());
    println!("rating:   {} VA, {} phase", ident.rating_va, ident.phases);
    let config = ups.config();
    println!("serial:   {}", config.serial_number);
    println!("part:     {}", config.part_number);
    let schema = ups.schema();
    println!(
        "schema:   {} meters, {} alarms",
        schema.meters.present(),
        schema.alarms.present()
    );
    Ok(())
}

fn cmd_meters(ups: &mut Ups) -> Result<()> {
    ups.refresh_meters()?;
    for (name, value) in ups.meters() {
        println!("{:<40} {}", name, value);
    }
    if let Some(load) = ups.load_percent() {
        println!("{:<40} {:.1}", "load_percent", load);
    }
    Ok(())
}

fn cmd_meter(args: &mut CmdScanner, ups: &mut Ups) -> Result<()> {
    let name = args.next()?;
    ups.refresh_meters()?;
    let value = ups
        .rendered_meter(name)
        .with_context(|| format!("UPS has no meter {}", name))?;
    println!("{}", value.trim());
    Ok(())
}

fn cmd_alarms(ups: &mut Ups) -> Result<()> {
    ups.refresh_alarms()?;
    let active = ups.active_alarms();
    if active.is_empty() {
        println!("no active alarms");
    }
    for name in active {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_status(ups: &mut Ups) -> Result<()> {
    ups.refresh_alarms()?;
    println!("{}", ups.status()?);
    Ok(())
}

fn cmd_battery(ups: &mut Ups) -> Result<()> {
    println!("{}", ups.battery_test_result()?);
    Ok(())
}

fn cmd_commands(ups: &mut Ups) -> Result<()> {
    for command in ups.supported_commands() {
        println!("{}", command);
    }
    Ok(())
}

fn cmd_instcmd(args: &mut CmdScanner, ups: &mut Ups) -> Result<()> {
    let name = args.next()?;
    let reply = ups.instant_command_by_name(name)?;
    match reply.delay {
        Some(delay) => println!("{}, in {} s", reply.status, delay),
        None => println!("{}", reply.status),
    }
    Ok(())
}

fn cmd_limits(ups: &mut Ups) -> Result<()> {
    let limits = ups.limits().context("UPS reports no limits")?;
    if let Some(volts) = limits.nominal_input_voltage {
        println!("nominal input voltage: {} V", volts);
    }
    if let Some((low, high)) = limits.input_frequency_range() {
        println!("input frequency:       {}..{} Hz", low, high);
    }
    if let (Some(boost), Some(trim)) = (limits.boost_transfer, limits.trim_transfer) {
        println!("boost / trim:          {} / {} V", boost, trim);
    }
    println!("low battery warning:   {} s", limits.low_battery_warning_secs());
    if let Some(horn) = limits.horn {
        println!("beeper:                {}", horn);
    }
    Ok(())
}

fn cmd_outlets(ups: &mut Ups) -> Result<()> {
    ups.refresh_outlets()?;
    let outlets = ups.outlets().context("UPS has no switched outlets")?;
    for outlet in &outlets.outlets {
        println!("{}", outlet);
    }
    Ok(())
}

fn cmd_outletdelay(args: &mut CmdScanner, ups: &mut Ups) -> Result<()> {
    let outlet = Outlet::new(args.parse_next::<u8>()?)?;
    let delay = match args.next()? {
        "shutdown" => OutletDelay::Shutdown,
        "start" => OutletDelay::Start,
        other => anyhow::bail!("unknown delay {}, use shutdown or start", other),
    };
    let seconds = args.parse_next::<i16>()?;
    println!("{}", ups.set_outlet_delay(outlet, delay, seconds)?);
    Ok(())
}

fn cmd_poll(args: &mut CmdScanner, ups: &mut Ups) -> Result<()> {
    let name = args.next()?.to_string();
    let delay = std::time::Duration::from_secs_f32(args.parse_next()?);

    println!("Press enter to stop polling.");
    // check that the first read is ok before starting the poll stop thread
    ups.refresh_meters()?;
    println!("{}", ups.rendered_meter(&name).context("No such meter")?);
    let (io_tx, io_rx) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        let _ch = io_tx;
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
    });
    loop {
        if io_rx.recv_timeout(delay) == Err(mpsc::RecvTimeoutError::Disconnected) {
            break;
        }
        match ups.refresh_meters() {
            Ok(()) => println!("{}", ups.rendered_meter(&name).unwrap_or_default()),
            Err(err) => println!("{} (data stale: {})", err, ups.data_stale()),
        }
    }
    Ok(())
}

fn connect(port: &str, baud_rate: Option<BaudRate>) -> Result<Ups> {
    let config = SerialConfig {
        baud_rate,
        ..SerialConfig::new(port)
    };
    let transport = SerialTransport::open(config).context("Failed to open serial port")?;
    let mut master = Master::new(transport);
    let settings = SessionSettings::default();
    let baud_rate = master
        .establish_link(&settings.authorization)
        .context("UPS does not answer")?;
    println!("Connected at {} baud", baud_rate);
    Ok(Session::establish(master, settings)?)
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud_rate = match args.next() {
        Some(rate) => Some(BaudRate::new(rate.parse::<u32>()?)?),
        None => None,
    };

    let mut ups = connect(&port, baud_rate)?;
    let mut stdout = std::io::stdout();

    loop {
        print!(">> ");
        stdout.flush()?;
        let mut cmd = String::new();
        let mut scan = CmdScanner::read_stdin(&mut cmd)?;
        if let Err(err) = match scan.next() {
            Err(_) => continue,
            Ok("id") => cmd_id(&mut ups),
            Ok("meters") | Ok("m") => cmd_meters(&mut ups),
            Ok("meter") => cmd_meter(&mut scan, &mut ups),
            Ok("alarms") | Ok("a") => cmd_alarms(&mut ups),
            Ok("status") | Ok("s") => cmd_status(&mut ups),
            Ok("battery") => cmd_battery(&mut ups),
            Ok("commands") => cmd_commands(&mut ups),
            Ok("instcmd") => cmd_instcmd(&mut scan, &mut ups),
            Ok("limits") => cmd_limits(&mut ups),
            Ok("outlets") => cmd_outlets(&mut ups),
            Ok("outletdelay") => cmd_outletdelay(&mut scan, &mut ups),
            Ok("poll") => cmd_poll(&mut scan, &mut ups),
            Ok("quit") | Ok("q") => return Ok(()),
            Ok(cmd) => {
                println!("Unknown command {}", cmd);
                continue;
            }
        } {
            println!("{:?}", err)
        }
    }
}

struct CmdScanner<'a> {
    splt: Peekable<SplitWhitespace<'a>>,
}

impl<'a> CmdScanner<'a> {
    fn read_stdin(buf: &'a mut String) -> Result<Self> {
        buf.clear();
        std::io::stdin().read_line(buf)?;
        let splt = buf.split_whitespace().peekable();
        Ok(Self { splt })
    }
    fn next(&mut self) -> Result<&'a str> {
        self.splt.next().context("End of stream")
    }
    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
}
