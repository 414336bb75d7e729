//! Wirepack - typed payload framing tool
//!
//! Writes payload frames to a file or stdout and decodes frame streams
//! from a file or stdin.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wirepack::config::{self, Config};
use wirepack::protocol::{Payload, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use wirepack::transport::Connection;

/// Wirepack - typed payload framing
#[derive(Parser)]
#[command(name = "wirepack")]
#[command(author = "Wirepack Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Encode and decode type-tagged, length-prefixed payload frames", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode payloads as frames
    Encode {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Payloads in order: text:<string>, binary:<string> or file:<path>
        #[arg(required = true, value_parser = parse_item)]
        items: Vec<FrameItem>,
    },

    /// Decode a frame stream and print each payload
    Decode {
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show wire format information
    Info,
}

/// A payload named on the command line
#[derive(Debug, Clone, PartialEq)]
enum FrameItem {
    Text(String),
    Binary(String),
    File(PathBuf),
}

fn parse_item(s: &str) -> Result<FrameItem, String> {
    let (kind, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected <kind>:<value>, got '{}'", s))?;

    match kind {
        "text" => Ok(FrameItem::Text(value.to_string())),
        "binary" => Ok(FrameItem::Binary(value.to_string())),
        "file" => Ok(FrameItem::File(PathBuf::from(value))),
        other => Err(format!(
            "unknown payload kind '{}' (expected text, binary or file)",
            other
        )),
    }
}

impl FrameItem {
    fn into_payload(self) -> anyhow::Result<Payload> {
        Ok(match self {
            FrameItem::Text(text) => Payload::Text(text),
            FrameItem::Binary(bytes) => Payload::Binary(bytes.into_bytes()),
            FrameItem::File(path) => Payload::Binary(
                std::fs::read(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
            ),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging; stdout is reserved for frames and decoded output
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Encode { output, items } => {
            run_encode(&config, output, items).await?;
        }
        Commands::Decode { input } => {
            run_decode(&config, input).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_wire_info(&config);
        }
    }

    Ok(())
}

/// Write each item as one frame
async fn run_encode(
    config: &Config,
    output: Option<PathBuf>,
    items: Vec<FrameItem>,
) -> anyhow::Result<()> {
    let sink: Box<dyn AsyncWrite + Unpin> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut conn = Connection::with_max_payload_size(sink, config.codec.max_payload_size);

    for item in items {
        let payload = item.into_payload()?;
        conn.send(&payload).await?;
    }
    conn.close().await?;

    tracing::info!(
        "Encoded {} payloads ({} bytes)",
        conn.stats().payloads_sent,
        conn.stats().bytes_sent
    );

    Ok(())
}

/// Print every payload until the stream ends
async fn run_decode(config: &Config, input: Option<PathBuf>) -> anyhow::Result<()> {
    let source: Box<dyn AsyncRead + Unpin> = match &input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let mut conn = Connection::with_max_payload_size(source, config.codec.max_payload_size);
    let mut index = 0u64;

    loop {
        match conn.recv().await {
            Ok(Some(payload)) => {
                index += 1;
                println!("{:>4} {}", index, payload);
            }
            Ok(None) => break,
            Err(e) => {
                return Err(e).with_context(|| format!("decoding frame {}", index + 1));
            }
        }
    }

    tracing::info!(
        "Decoded {} payloads ({} bytes)",
        conn.stats().payloads_received,
        conn.stats().bytes_received
    );

    Ok(())
}

/// Print wire format information
fn print_wire_info(config: &Config) {
    println!("Wirepack Wire Format");
    println!("====================\n");

    println!("Header: {} bytes", HEADER_SIZE);
    println!("  byte 0     type tag (0x01 binary, 0x02 text)");
    println!("  bytes 1-4  body length, u32 big-endian");
    println!("Body: exactly <length> raw bytes\n");

    println!("Default max payload size: {} bytes", DEFAULT_MAX_PAYLOAD_SIZE);
    println!("Configured max payload size: {} bytes", config.codec.max_payload_size);
}
