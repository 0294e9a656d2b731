//! FDS CLI
//!
//! Command-line tools for FDS flash images.
//!
//! # Commands
//!
//! - `format` - Create an erased image and install the store on it
//! - `inspect` - Display the role and usage of every page
//! - `dump` - List record headers for debugging
//! - `verify` - Check page tags, record framing and CRCs
//! - `gc` - Run garbage collection
//! - `write` / `read` / `clear` - Manipulate records

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::{Layout, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FDS command-line flash image tools.
#[derive(Parser)]
#[command(name = "fds")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the flash image
    #[arg(global = true, short, long)]
    image: Option<PathBuf>,

    /// Virtual page size in words
    #[arg(global = true, long, default_value_t = 1024)]
    page_words: u32,

    /// Number of virtual pages, swap included
    #[arg(global = true, long, default_value_t = 3)]
    pages: u32,

    /// Records carry and verify CRCs
    #[arg(global = true, long)]
    crc: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an erased image and install the store on it
    Format {
        /// Replace an existing image
        #[arg(long)]
        force: bool,
    },

    /// Display the role and usage of every page
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// List record headers for debugging
    Dump {
        /// Only dump this virtual page
        #[arg(long)]
        page: Option<u32>,

        /// Include cleared and incomplete records
        #[arg(short, long)]
        all: bool,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Check page tags, record framing and CRCs
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Run garbage collection
    Gc {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Write a record
    Write {
        /// Record type (1-65535)
        #[arg(long = "type")]
        record_type: u16,

        /// Record instance (0-65534)
        #[arg(long)]
        instance: u16,

        /// Payload as hex, zero padded to whole words
        #[arg(long, conflicts_with = "text")]
        hex: Option<String>,

        /// Payload as UTF-8 text, zero padded to whole words
        #[arg(long)]
        text: Option<String>,
    },

    /// Print every record with a key
    Read {
        /// Record type
        #[arg(long = "type")]
        record_type: u16,

        /// Record instance
        #[arg(long)]
        instance: u16,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Clear a record by id, or every record of an instance
    Clear {
        /// Record id
        #[arg(long, required_unless_present = "instance", conflicts_with = "instance")]
        id: Option<u32>,

        /// Record instance
        #[arg(long)]
        instance: Option<u16>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let layout = Layout {
        page_words: cli.page_words,
        pages: cli.pages,
        crc: cli.crc,
    };

    if let Commands::Version = cli.command {
        println!("FDS CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let path = cli.image.ok_or("Flash image path required (--image)")?;

    match cli.command {
        Commands::Format { force } => commands::format::run(&path, layout, force)?,
        Commands::Inspect { format } => commands::inspect::run(&path, layout, format)?,
        Commands::Dump {
            page,
            all,
            limit,
            format,
        } => commands::dump::run(&path, layout, page, all, limit, format)?,
        Commands::Verify { format } => commands::verify::run(&path, layout, format)?,
        Commands::Gc { format } => commands::gc::run(&path, layout, format)?,
        Commands::Write {
            record_type,
            instance,
            hex,
            text,
        } => {
            let payload = commands::record::parse_payload(hex.as_deref(), text.as_deref())?;
            commands::record::write(&path, layout, record_type, instance, &payload)?;
        }
        Commands::Read {
            record_type,
            instance,
            format,
        } => commands::record::read(&path, layout, record_type, instance, format)?,
        Commands::Clear { id, instance } => {
            commands::record::clear(&path, layout, id, instance)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
