use std::ffi::OsString;
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use serialport::SerialPort;
use tracing_subscriber::EnvFilter;

use qdl_loader::{
    AckPolicy, DirStore, HardwareGeneration, ImageKind, LoaderConfig, Progress, TransferSession,
};

/// How long a single serial read may block before the driver reports a timeout.
const PORT_POLL: Duration = Duration::from_secs(60);

/// Load firmware into a Qualcomm modem waiting in download mode.
#[derive(Debug, Parser)]
#[command(name = "qdl-loader", version, about)]
struct Cli {
    /// Target second-generation (Gobi 2000) hardware and also send UQCN.mbn.
    #[arg(long = "2000")]
    gobi2000: bool,

    /// Abort when the device answers with an unexpected acknowledgment.
    #[arg(long)]
    strict: bool,

    /// Line speed; ignored by USB serial devices but required by the port driver.
    #[arg(long, env = "QDL_BAUD", default_value_t = 115_200)]
    baud: u32,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Serial device of the modem, e.g. /dev/ttyUSB0.
    serial_device: PathBuf,

    /// Directory holding amss.mbn, apps.mbn and optionally UQCN.mbn.
    firmware_dir: PathBuf,
}

impl Cli {
    /// Parses the command line, accepting the historical single-dash `-2000`.
    fn from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    fn config(&self) -> LoaderConfig {
        LoaderConfig {
            generation: if self.gobi2000 {
                HardwareGeneration::V2
            } else {
                HardwareGeneration::V1
            },
            ack_policy: if self.strict {
                AckPolicy::Strict
            } else {
                AckPolicy::Lenient
            },
            ..LoaderConfig::default()
        }
    }
}

fn normalize_args<I>(args: I) -> impl Iterator<Item = OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter().enumerate().map(|(i, arg)| {
        if i == 1 && arg == "-2000" {
            OsString::from("--2000")
        } else {
            arg
        }
    })
}

/// Serial port that keeps waiting when the driver's poll interval expires.
struct BlockingPort(Box<dyn SerialPort>);

impl Read for BlockingPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.0.read(buf) {
                Err(err) if err.kind() == ErrorKind::TimedOut => continue,
                other => return other,
            }
        }
    }
}

impl Write for BlockingPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.0.write(buf) {
                Err(err) if err.kind() == ErrorKind::TimedOut => continue,
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Stderr log sink that clears the progress bars while a line is printed.
struct BarAwareStderr(MultiProgress);

impl Write for BarAwareStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn init_logging(verbose: u8, bars: &MultiProgress) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer({
            let bars = bars.clone();
            move || BarAwareStderr(bars.clone())
        })
        .init();
}

fn open_port(cli: &Cli) -> Result<BlockingPort> {
    let path = cli.serial_device.to_string_lossy().into_owned();
    let port = serialport::new(path, cli.baud)
        .timeout(PORT_POLL)
        .open()
        .with_context(|| format!("failed to open serial device {}", cli.serial_device.display()))?;
    Ok(BlockingPort(port))
}

/// Turns progress callbacks into one bar per image.
fn progress_bars(bars: MultiProgress) -> Result<impl FnMut(Progress)> {
    let style = ProgressStyle::with_template("{msg:>4} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})")?
        .progress_chars("=> ");
    let mut current: Option<(ImageKind, ProgressBar)> = None;

    Ok(move |p: Progress| {
        if current.as_ref().map(|(kind, _)| *kind) != Some(p.kind) {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            let bar = bars.add(ProgressBar::new(p.total).with_style(style.clone()));
            bar.set_message(p.kind.to_string());
            current = Some((p.kind, bar));
        }
        if let Some((_, bar)) = &current {
            bar.set_position(p.sent);
            if p.sent >= p.total {
                bar.finish();
            }
        }
    })
}

fn run(cli: &Cli, bars: &MultiProgress) -> Result<()> {
    let port = open_port(cli)?;
    let store = DirStore::new(&cli.firmware_dir).with_context(|| {
        format!("failed to use firmware directory {}", cli.firmware_dir.display())
    })?;

    let mut session = TransferSession::prepare(port, &store, cli.config())
        .map_err(|err| anyhow!("{err}"))?;
    info!(
        "Loading {} images from {} to {}",
        session.images().len(),
        store.root().display(),
        cli.serial_device.display()
    );

    session
        .run_with(progress_bars(bars.clone())?)
        .map_err(|err| anyhow!("download failed: {err}"))?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::from_env();
    let bars = MultiProgress::new();
    init_logging(cli.verbose, &bars);

    match run(&cli, &bars) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
