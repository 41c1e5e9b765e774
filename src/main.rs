use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use serial_monitor::config::Config;
use serial_monitor::session::{PortPicker, SerialSession};
use serial_monitor::sink::OutputSink;
use serial_monitor::transport::{LinkFactory, NativeLinkFactory, PortInfo};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-monitor",
    version,
    about = "Serial monitor for attached microcontrollers",
    long_about = "Opens a probe-verified serial session and streams the port to stdout. \
                  Lines typed on stdin are sent to the device with CRLF framing."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports available on this system.
    List,
    /// Open a monitor session and stream the port to stdout.
    Monitor {
        /// Serial port path (interactive selection when omitted).
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate for the session.
        #[arg(short, long)]
        baud: Option<u32>,

        /// Skip the post-open liveness check.
        #[arg(long)]
        no_probe: bool,
    },
}

/// Sink that prints the monitor stream straight to stdout.
struct StdoutSink;

impl OutputSink for StdoutSink {
    fn append(&self, chunk: &str) {
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    }

    fn append_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Numbered stdin prompt over the enumerated ports.
struct StdinPicker;

#[async_trait]
impl PortPicker for StdinPicker {
    async fn pick(&self, ports: &[PortInfo]) -> Option<String> {
        println!("Select a serial port:");
        for (index, port) in ports.iter().enumerate() {
            match &port.manufacturer {
                Some(manufacturer) => {
                    println!("  {}: {} ({manufacturer})", index + 1, port.path)
                }
                None => println!("  {}: {}", index + 1, port.path),
            }
        }
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader.read_line(&mut line).await.ok()?;
        let choice: usize = line.trim().parse().ok()?;
        ports.get(choice.checked_sub(1)?).map(|p| p.path.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    match args.command {
        Command::List => list_ports(),
        Command::Monitor {
            port,
            baud,
            no_probe,
        } => run_monitor(config, port, baud, no_probe).await,
    }
}

fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let factory = NativeLinkFactory::new();
    let ports = factory.list_ports()?;
    if ports.is_empty() {
        println!("No serial port is available.");
        return Ok(());
    }
    for port in ports {
        let manufacturer = port.manufacturer.as_deref().unwrap_or("-");
        match (&port.vendor_id, &port.product_id) {
            (Some(vid), Some(pid)) => {
                println!("{}  {}  {}:{}", port.path, manufacturer, vid, pid)
            }
            _ => println!("{}  {}", port.path, manufacturer),
        }
    }
    Ok(())
}

async fn run_monitor(
    mut config: Config,
    port: Option<String>,
    baud: Option<u32>,
    no_probe: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(baud) = baud {
        config.serial.default_baud = baud;
    }
    if no_probe {
        config.serial.disable_probe = true;
    }

    let session = SerialSession::new(
        Arc::new(NativeLinkFactory::new()),
        Arc::new(StdoutSink),
        Arc::new(StdinPicker),
        &config,
    );

    match port {
        Some(path) => session.set_current_port(&path),
        None => {
            if session.select_port(None).await?.is_none() {
                eprintln!("No serial port selected.");
                return Ok(());
            }
        }
    }

    session.open_session().await?;
    println!(
        "Monitoring {} at {} baud. Type a line to send it; Ctrl-C to exit.",
        session.current_port().unwrap_or_default(),
        session.current_baud_rate()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(text) => {
                    if let Err(error) = session.send(&text).await {
                        eprintln!("{error}");
                    }
                }
                None => break,
            },
        }
    }

    session.close_session(None).await?;
    Ok(())
}
