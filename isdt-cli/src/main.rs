mod render;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use isdt_lib::firmware;
use isdt_lib::transport::{DEFAULT_PID, DEFAULT_VID, HidTransport, Transport};
use isdt_lib::{Charger, Command, Mode, Model, decode};
use std::fs;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Tool to interact with ISDT chargers over USB HID. Reverse engineered on
/// the C4 and A4; the protocol looks the same across most of their chargers.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// USB vendor ID of the charger, as a hex number [default: 28e9].
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// USB product ID of the charger, as a hex number [default: 028a, the
    /// C4; the A4 shares it].
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Platform-specific HID path; overrides --vid and --pid. Only needed
    /// to tell several chargers apart.
    #[arg(long)]
    path: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Output::Text)]
    output: Output,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
    Raw,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Test the connection.
    LinkTest,
    /// Identify the charger.
    Version,
    /// Get the metrics of the specified channels.
    Metrics {
        /// 0-indexed channels to query.
        #[arg(short, long, num_args = 0.., default_values_t = [0u8, 1, 2, 3])]
        channels: Vec<u8>,
        /// Seconds between two reports.
        #[arg(short, long, default_value_t = 1.0)]
        interval: f64,
        /// How many reports to generate; 0 means unlimited.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Display a bank of sensors, most of unknown meaning.
    Sensors,
    /// Per-channel sensor block.
    ChannelSensors {
        #[arg(short, long)]
        channel: u8,
    },
    /// Supply and per-channel voltages.
    ChannelVoltages,
    /// Get the serial number (the unique device ID of the MCU).
    Serial,
    /// Rename the device. Causes an immediate reboot.
    Rename {
        /// The new name, 0 to 8 bytes.
        #[arg(short, long)]
        name: String,
    },
    /// Reboot the charger from the app into the bootloader.
    BootLoader,
    /// Reboot the charger from any mode into the app.
    BootApp,
    /// Display information about an encrypted firmware image file.
    FwInfo {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Decrypt a firmware image into a file.
    DecryptFw {
        #[arg(short, long)]
        file: PathBuf,
        /// Output file; overwrites.
        #[arg(short = 'w', long)]
        outfile: PathBuf,
    },
    /// Verify a firmware image against the charger's flash.
    VerifyFw {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Send a raw payload to the charger. Never use this one.
    RawCommand {
        #[arg(long, required = true)]
        i_know_this_one_breaks_things: bool,
        /// Payload bytes as non-prefixed hex numbers.
        #[arg(long, num_args = 1.., value_parser = parse_hex_u8)]
        command: Vec<u8>,
    },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    u8::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.verbose.tracing_level_filter().into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        // The firmware file commands work without a charger attached.
        Cmd::FwInfo { file } => {
            let image = firmware::decrypt(&fs::read(file).context("reading image")?)?;
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&FirmwareJson::from(&image))?),
                _ => println!("{}", render::firmware_summary(&image)),
            }
            Ok(())
        }
        Cmd::DecryptFw { file, outfile } => {
            let image = firmware::decrypt(&fs::read(file).context("reading image")?)?;
            fs::write(outfile, &image.data).context("writing decrypted image")?;
            if !image.checksum_matches() {
                warn!(
                    embedded = format_args!("{:#x}", image.header.embedded_checksum),
                    calculated = format_args!("{:#x}", image.calculated_checksum),
                    "image checksum mismatch"
                );
            }
            println!("Wrote {} decrypted bytes.", image.data.len());
            Ok(())
        }
        command => {
            let mut charger = open_charger(&cli)?;
            run_device_command(&mut charger, command, &cli)
        }
    }
}

fn open_charger(cli: &Cli) -> Result<Charger<HidTransport>> {
    let transport = match &cli.path {
        Some(path) => HidTransport::open_path(path)?,
        None => HidTransport::open(
            cli.vid.unwrap_or(DEFAULT_VID),
            cli.pid.unwrap_or(DEFAULT_PID),
        )?,
    };
    Ok(Charger::new(transport))
}

/// (model, mode) pairs a command is known to work with; `None` skips the
/// check (needed for the commands identity discovery itself relies on).
fn supported_configurations(command: &Cmd) -> Option<Vec<(Model, Mode)>> {
    use Mode::*;
    use Model::*;
    let all_models = [A4, C4, C4Evo, Q8];
    match command {
        Cmd::LinkTest | Cmd::Version | Cmd::RawCommand { .. } => None,
        Cmd::Metrics { .. } | Cmd::ChannelSensors { .. } | Cmd::ChannelVoltages => {
            Some(all_models.iter().map(|&m| (m, App)).collect())
        }
        Cmd::Sensors => Some(vec![(C4, App)]),
        Cmd::Serial => Some(vec![(C4, App), (A4, App)]),
        Cmd::Rename { .. } => Some(vec![(C4, App)]),
        Cmd::BootLoader | Cmd::BootApp => Some(
            all_models
                .iter()
                .flat_map(|&m| [(m, App), (m, Bootloader)])
                .collect(),
        ),
        Cmd::VerifyFw { .. } => Some(vec![(C4, Bootloader), (A4, Bootloader)]),
        Cmd::FwInfo { .. } | Cmd::DecryptFw { .. } => None,
    }
}

/// Ask the charger what it is, refuse unsupported commands, and come back
/// with the model tag for decode enrichment.
fn check_compatibility(
    charger: &mut Charger<HidTransport>,
    command: &Cmd,
) -> Result<Model> {
    let (model_name, mode) = charger.model_and_mode()?;
    let model = match model_name.parse::<Model>() {
        Ok(model) => model,
        Err(_) => {
            warn!(model = %model_name, "unknown model, decoding without enrichment");
            Model::Ignore
        }
    };

    if let Some(configurations) = supported_configurations(command) {
        if !configurations.contains(&(model, mode)) {
            bail!(
                "this command is not supported by the model {model_name:?} in {mode} mode; \
                 supported: {configurations:?}"
            );
        }
    }
    Ok(model)
}

fn run_device_command(
    charger: &mut Charger<HidTransport>,
    command: &Cmd,
    cli: &Cli,
) -> Result<()> {
    let model = match command {
        // Identity discovery must work on unknown devices too.
        Cmd::LinkTest | Cmd::Version | Cmd::RawCommand { .. } => Model::Ignore,
        _ => check_compatibility(charger, command)?,
    };

    match command {
        Cmd::LinkTest => query_and_print(charger, &Command::LinkTest, model, cli.output),
        Cmd::Version => query_and_print(charger, &Command::Version, model, cli.output),
        Cmd::Metrics {
            channels,
            interval,
            count,
        } => {
            let mut step = 0u32;
            loop {
                step += 1;
                for &channel in channels {
                    query_and_print(charger, &Command::Metrics { channel }, model, cli.output)?;
                }
                if *count != 0 && step >= *count {
                    return Ok(());
                }
                sleep(Duration::from_secs_f64(*interval));
            }
        }
        Cmd::Sensors => query_and_print(charger, &Command::Sensors, model, cli.output),
        Cmd::ChannelSensors { channel } => query_and_print(
            charger,
            &Command::ChannelSensors { channel: *channel },
            model,
            cli.output,
        ),
        Cmd::ChannelVoltages => {
            query_and_print(charger, &Command::ChannelVoltages, model, cli.output)
        }
        Cmd::Serial => query_and_print(charger, &Command::SerialNumber, model, cli.output),
        Cmd::Rename { name } => {
            if name.len() > isdt_lib::command::NAME_LEN {
                bail!("the name must be at most 8 bytes");
            }
            query_and_print(charger, &Command::Rename(name.clone()), model, cli.output)
        }
        Cmd::BootLoader => query_and_print(charger, &Command::RebootToBootloader, model, cli.output),
        Cmd::BootApp => query_and_print(charger, &Command::RebootToApp, model, cli.output),
        Cmd::VerifyFw { file } => {
            let image = firmware::decrypt(&fs::read(file).context("reading image")?)?;
            // The comparison happens on-device: we hand it the region and
            // the checksum we computed over the decrypted image.
            let command = Command::VerifyFirmware {
                offset: image.header.app_storage_offset,
                size: image.header.app_size,
                checksum: image.calculated_checksum,
            };
            query_and_print(charger, &command, model, cli.output)
        }
        Cmd::RawCommand { command, .. } => {
            println!("About to write command: {}", hex::encode(command));
            query_and_print(charger, &Command::Raw(command.clone()), model, cli.output)
        }
        Cmd::FwInfo { .. } | Cmd::DecryptFw { .. } => unreachable!("handled in main"),
    }
}

fn query_and_print<T: Transport>(
    charger: &mut Charger<T>,
    command: &Command,
    model: Model,
    output: Output,
) -> Result<()> {
    charger.send(command)?;
    let payload = charger.read_response()?;
    match output {
        Output::Raw => println!("{}", hex::encode(&payload)),
        Output::Json => println!("{}", serde_json::to_string(&decode(&payload, model))?),
        Output::Text => println!("{}", render::to_text(&decode(&payload, model))),
    }
    Ok(())
}

/// JSON shape for `fw-info`.
#[derive(serde::Serialize)]
struct FirmwareJson<'a> {
    #[serde(flatten)]
    header: &'a isdt_lib::firmware::FirmwareHeader,
    calculated_checksum: u32,
    checksum_matches: bool,
    info: Option<&'a isdt_lib::firmware::FirmwareInfo>,
}

impl<'a> From<&'a firmware::DecryptedImage> for FirmwareJson<'a> {
    fn from(image: &'a firmware::DecryptedImage) -> Self {
        Self {
            header: &image.header,
            calculated_checksum: image.calculated_checksum,
            checksum_matches: image.checksum_matches(),
            info: image.info.as_ref(),
        }
    }
}
