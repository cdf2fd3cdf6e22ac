use clap::Parser;
use std::fs::File;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{io, process};

use qcs_lib::{
    channel::{Step, StepChannel},
    coordinator::{CoordinationLoop, LoopState},
    interruptor::Interruptor,
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
                // 128 (fatal error signal "n") + 2 (control-c is fatal error signal 2)
                130
            } else {
                // Windows code 3221225786
                // -1073741510 == C000013A
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
    let mut coordinator = CoordinationLoop::new(&config, observer_rx, target_rxs, cmd_tx);

    let tick = config.tick_period();
    coordinator.init();
    step_channels(&mut channels)?;
    adapter.pump_out()?;

    loop {
        if intr.is_set() {
            coordinator.halt();
            step_channels(&mut channels)?;
            adapter.pump_out()?;
            break;
        }

        let status = adapter.pump_in()?;
        step_channels(&mut channels)?;
        coordinator.step(tick);
        step_channels(&mut channels)?;
        adapter.pump_out()?;

        if status == PumpStatus::SourceClosed {
            // The session is over; tell the observer to stand down
            coordinator.terminate();
            step_channels(&mut channels)?;
            adapter.pump_out()?;
            break;
        }
        if coordinator.state() == LoopState::Terminated {
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
