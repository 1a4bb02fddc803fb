use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use midibind::clock::SceneClock;
use midibind::config::{default_config_path, EngineConfig};
use midibind::expr::{self, Env};
use midibind::input::input_channel;
use midibind::mapping::Registry;
use midibind::midi::MidiInput;
use midibind::property::{PropertyStore, Resolver};
use midibind::runtime::Runtime;
use midibind::scheduler::{Pump, Scheduler, Ticker};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> midibind::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Run {
            device,
            start_frame,
            freeze,
        } => run(&config_path, device, start_frame, freeze),
        Commands::Check => check(&config_path),
        Commands::Eval {
            expression,
            x,
            time,
            frame,
        } => eval(&expression, x, time, frame),
        Commands::Devices => {
            let devices = MidiInput::list_devices();
            if devices.is_empty() {
                println!("no MIDI input devices found");
            }
            for (i, name) in devices.iter().enumerate() {
                println!("{i}: {name}");
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("midibind=info")),
        )
        .try_init();
}

struct Engine {
    config: EngineConfig,
    store: Arc<PropertyStore>,
    registry: Arc<Registry>,
}

fn load_engine(path: &Path) -> midibind::Result<Engine> {
    let config = EngineConfig::load(path)?;
    let store = Arc::new(config.property_store()?);
    let registry = Arc::new(Registry::new());
    config.register_mappings(&registry)?;
    info!(
        path = %path.display(),
        properties = store.len(),
        mappings = registry.len(),
        "config loaded"
    );
    Ok(Engine {
        config,
        store,
        registry,
    })
}

fn run(
    config_path: &Path,
    device: Option<String>,
    start_frame: Option<f64>,
    freeze: bool,
) -> midibind::Result<()> {
    let Engine {
        mut config,
        store,
        registry,
    } = load_engine(config_path)?;
    if device.is_some() {
        config.midi.device_name = device;
    }

    let clock = Arc::new(SceneClock::new(config.fps));
    if let Some(frame) = start_frame {
        clock.seek(frame);
    }
    if freeze {
        clock.pause();
    }
    info!(fps = clock.fps(), start_frame = ?start_frame, freeze, "scene clock ready");
    let runtime = Runtime::new(store.clone(), config.runtime_settings());
    let scheduler = Arc::new(Scheduler::new(registry.clone(), runtime, clock));

    let (tx, rx) = input_channel();
    let midi = MidiInput::start(&config.midi, tx)?;
    info!(port = midi.port_name(), "listening");

    let mut pump = Pump::start(scheduler.clone(), rx);
    let mut ticker = Ticker::start(scheduler.clone(), config.tick_hz);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    if let Err(e) = ctrlc::set_handler(move || running_clone.store(false, Ordering::Relaxed)) {
        warn!(error = %e, "cannot install Ctrl-C handler");
    }

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    drop(midi);
    ticker.stop();
    pump.stop();
    info!(
        ticks = ticker.ticks(),
        samples = pump.dispatched(),
        "stopped"
    );

    for summary in registry.list() {
        println!("{summary}");
    }
    for (path, value) in store.snapshot() {
        println!("{path} = {value:?}");
    }
    Ok(())
}

fn check(config_path: &Path) -> midibind::Result<()> {
    let Engine {
        config,
        store,
        registry,
    } = load_engine(config_path)?;

    let mut unresolved = 0;
    for summary in registry.list() {
        match store.resolve(&summary.target_path) {
            Ok(slot) => println!("{summary}  [{:?}]", slot.meta().kind),
            Err(e) => {
                unresolved += 1;
                println!("{summary}  [unresolved: {e}]");
            }
        }
    }
    println!(
        "{} mapping(s), {} unresolved, tick {} Hz, {} fps",
        registry.len(),
        unresolved,
        config.tick_hz,
        config.fps
    );
    Ok(())
}

fn eval(source: &str, x: f64, time: f64, frame: Option<f64>) -> midibind::Result<()> {
    let compiled = expr::compile(source)?;
    let frame = frame.unwrap_or(time * 24.0);
    let value = compiled.evaluate(&Env::new(x, time, frame))?;
    println!("{value}");
    Ok(())
}

fn expression_names() -> String {
    let names: Vec<_> = expr::ast::symbol_names().collect();
    format!("Names an expression may use: {}", names.join(", "))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Bind MIDI controls to numeric properties", long_about = None)]
struct Cli {
    /// Config file. Defaults to ~/.midibind/config.yaml.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to a MIDI device and apply mappings until Ctrl-C.
    Run {
        /// Device name substring; overrides the config.
        #[arg(short, long)]
        device: Option<String>,
        /// Scene frame to start from.
        #[arg(long)]
        start_frame: Option<f64>,
        /// Hold scene time still; motors keep integrating on wall time.
        #[arg(long)]
        freeze: bool,
    },
    /// Validate the config and report unresolved targets.
    Check,
    /// Evaluate an expression once.
    #[command(after_help = expression_names())]
    Eval {
        #[arg(allow_hyphen_values = true)]
        expression: String,
        #[arg(short, long, default_value_t = 0.0)]
        x: f64,
        #[arg(short, long, default_value_t = 0.0)]
        time: f64,
        /// Defaults to time * 24.
        #[arg(short, long)]
        frame: Option<f64>,
    },
    /// List MIDI input devices.
    Devices,
}
