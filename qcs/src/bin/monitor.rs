use clap::Parser;
use std::fs::File;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{io, process};

use qcoord_protocol::Waypoint;
use qcs_lib::{
    channel::{Step, StepChannel},
    interruptor::Interruptor,
    monitor::PositionMonitor,
    scenario::Config,
    transport::{BusAdapter, IoSource, PumpStatus},
};

#[derive(Parser, Debug)]
#[command(version)]
struct Opts {
    /// Name of the observer quadcopter; overrides the scenario value
    #[arg(short = 'q', long)]
    quadcopter: Option<String>,

    /// Comma-separated list of target names; overrides the scenario value
    #[arg(short = 't', long)]
    targets: Option<String>,

    /// x coordinate of the station waypoint
    #[arg(short = 'x', long)]
    xcoord: f64,

    /// y coordinate of the station waypoint
    #[arg(short = 'y', long)]
    ycoord: f64,

    /// x coordinate of the heading point
    #[arg(short = 'a', long)]
    xheading: f64,

    /// y coordinate of the heading point
    #[arg(short = 'b', long)]
    yheading: f64,

    /// Scenario configuration toml file.
    ///
    /// The nominal field-exercise scenario is used when not provided.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// The telemetry source. This can either be an address:port combination
    /// or a file path for replay mode
    #[arg(default_value = "127.0.0.1:9750")]
    data_source: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let opts = Opts::parse();

    let intr = Interruptor::new();
    let intr_clone = intr.clone();
    ctrlc::set_handler(move || {
        if intr_clone.is_set() {
            let exit_code = if cfg!(target_family = "unix") {
                130
            } else {
                -1073741510
            };
            process::exit(exit_code);
        } else {
            intr_clone.set();
        }
    })?;

    let mut config = Config::load(opts.scenario.as_ref());
    if let Some(observer) = opts.quadcopter {
        config.observer = observer;
    }
    if let Some(targets) = opts.targets {
        config.targets = targets.split(',').map(|t| t.trim().to_owned()).collect();
    }

    let station = Waypoint {
        x: opts.xcoord,
        y: opts.ycoord,
        heading_x: opts.xheading,
        heading_y: opts.yheading,
    };

    let source = open_source(&opts.data_source)?;

    let mut channels: Vec<Box<dyn Step>> = vec![];

    let mut observer_ch = StepChannel::new();
    let observer_tx = observer_ch.sender(None);
    let observer_rx = observer_ch.receiver(None);

    let mut target_txs = vec![];
    let mut target_rxs = vec![];
    for name in config.targets.iter() {
        let mut ch = StepChannel::new();
        target_txs.push((name.clone(), ch.sender(None)));
        target_rxs.push((name.clone(), ch.receiver(None)));
        channels.push(Box::new(ch));
    }

    let mut cmd_ch = StepChannel::new();
    let cmd_tx = cmd_ch.sender(None);
    let cmd_rx = cmd_ch.receiver(None);

    channels.push(Box::new(observer_ch));
    channels.push(Box::new(cmd_ch));

    let mut adapter = BusAdapter::new(source, &config.observer, observer_tx, target_txs, cmd_rx);
    let mut monitor = PositionMonitor::new(&config, station, observer_rx, target_rxs, cmd_tx);

    let tick = config.tick_period();
    monitor.init();
    step_channels(&mut channels)?;
    adapter.pump_out()?;

    loop {
        if intr.is_set() {
            monitor.halt();
            step_channels(&mut channels)?;
            adapter.pump_out()?;
            break;
        }

        let status = adapter.pump_in()?;
        step_channels(&mut channels)?;
        monitor.step(tick);
        step_channels(&mut channels)?;
        adapter.pump_out()?;

        if status == PumpStatus::SourceClosed {
            monitor.halt();
            step_channels(&mut channels)?;
            adapter.pump_out()?;
            break;
        }

        std::thread::sleep(tick.as_duration());
    }

    Ok(())
}

fn step_channels(channels: &mut [Box<dyn Step>]) -> Result<(), Box<dyn std::error::Error>> {
    for ch in channels.iter_mut() {
        ch.step()?;
    }
    Ok(())
}

fn open_source(data_source: &str) -> io::Result<IoSource> {
    let maybe_file_path = Path::new(data_source);
    if maybe_file_path.exists() {
        println!("Opening '{data_source}'");
        Ok(IoSource::File(File::open(maybe_file_path)?))
    } else {
        println!("Connecting to '{data_source}'");
        loop {
            if let Ok(stream) = TcpStream::connect(data_source) {
                stream.set_nonblocking(true)?;
                break Ok(IoSource::TcpStream(stream));
            } else {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}
