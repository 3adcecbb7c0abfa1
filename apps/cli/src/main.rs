use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ecdfu_core::{Device, Protocol, SectionedImage, TracingObserver, UpdateConfig, device};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Embedded controller firmware updater", long_about = None)]
struct Args {
    /// Update protocol of the target device
    #[arg(long, value_enum)]
    protocol: Option<ProtocolArg>,

    /// USB vendor ID (hex)
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// USB product ID (hex)
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print what the device reports
    Info,
    /// Write firmware sections
    Write {
        /// Section to write, as ADDR:FILE (repeatable)
        #[arg(long = "section", required = true)]
        sections: Vec<String>,

        /// Only write the sections starting at the device's writable offset
        #[arg(long)]
        pick: bool,

        /// Send trailing erased bytes too
        #[arg(long)]
        no_trim: bool,
    },
    /// Switch the device into bootloader mode
    Detach,
    /// Switch the device back to runtime mode
    Attach,
    /// Write the effective configuration to a file
    SaveConfig { path: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProtocolArg {
    CrosEc,
    Elantp,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::CrosEc => Protocol::CrosEc,
            ProtocolArg::Elantp => Protocol::Elantp,
        }
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid ID {s:?}: {e}"))
}

fn load_config(args: &Args) -> Result<UpdateConfig> {
    let mut config = match &args.config {
        Some(path) => UpdateConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => UpdateConfig::default(),
    };
    if let Some(protocol) = args.protocol {
        config.protocol = protocol.into();
    }
    if args.vid.is_some() {
        config.vendor_id = args.vid;
    }
    if args.pid.is_some() {
        config.product_id = args.pid;
    }
    Ok(config)
}

fn open_device(config: &UpdateConfig) -> Result<Box<dyn Device>> {
    let mut dev = device::open(config).context("Failed to open device")?;
    dev.setup().context("Device setup failed")?;
    Ok(dev)
}

fn print_summary(dev: &dyn Device) {
    println!("Protocol: {}", dev.protocol());
    println!("Mode: {}", dev.mode());
    for (key, value) in dev.describe() {
        println!("{key:>22}: {value}");
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;

    match args.command {
        Commands::Info => {
            let dev = open_device(&config)?;
            print_summary(dev.as_ref());
        }
        Commands::Write {
            sections,
            pick,
            no_trim,
        } => {
            if no_trim {
                config.trim_trailing = false;
            }
            let mut firmware =
                SectionedImage::from_specs(&sections).context("Failed to load sections")?;

            let mut dev = open_device(&config)?;
            dev.detach().context("Failed to enter bootloader mode")?;
            if pick {
                dev.prepare_firmware(&mut firmware)
                    .context("Failed to pick sections")?;
            }
            dev.write_firmware(&firmware, &TracingObserver)
                .context("Firmware write failed")?;
            dev.attach().context("Failed to return to runtime mode")?;
            info!("Update finished");
        }
        Commands::Detach => {
            let mut dev = open_device(&config)?;
            dev.detach().context("Failed to enter bootloader mode")?;
            info!(mode = %dev.mode(), "Detached");
        }
        Commands::Attach => {
            let mut dev = open_device(&config)?;
            dev.attach().context("Failed to return to runtime mode")?;
            info!(mode = %dev.mode(), "Attached");
        }
        Commands::SaveConfig { path } => {
            config
                .save_to_file(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Configuration saved");
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
