//! flatmapper CLI - tokenize, map and validate flat files
//!
//! Reads CSV with a YAML mapper configuration and prints the mapped records
//! as JSON.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flatmapper::csv::CsvRow;
use flatmapper::serialization::{JsonLayout, JsonWriter};
use flatmapper::{record_meta, ColumnKey, MapperConfig, MapperError, MapperFactory, MapperResult};

#[derive(Parser)]
#[command(name = "flatmapper")]
#[command(version, about = "Map flat CSV rows to records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Ndjson,
    Array,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cells of each row
    Tokenize {
        /// CSV file, `-` for stdin
        input: PathBuf,

        /// Cell separator
        #[arg(short, long, default_value_t = ',')]
        separator: char,

        /// Quote character
        #[arg(short, long, default_value_t = '"')]
        quote: char,
    },

    /// Map rows to records and print them as JSON
    Map {
        /// CSV file, `-` for stdin
        input: PathBuf,

        /// Mapper configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output layout
        #[arg(short, long, value_enum, default_value_t = Layout::Ndjson)]
        format: Layout,

        /// Stop at the first failing row instead of reporting and continuing
        #[arg(long)]
        fail_fast: bool,
    },

    /// Validate a mapper configuration
    ValidateConfig {
        /// Mapper configuration (YAML)
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Tokenize { input, separator, quote } => tokenize(input, separator, quote),
        Commands::Map {
            input,
            config,
            format,
            fail_fast,
        } => map(input, config, format, fail_fast),
        Commands::ValidateConfig { config } => validate_config(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn open_input(input: &PathBuf) -> MapperResult<Box<dyn Read>> {
    if input.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(input)
        .map_err(|e| MapperError::Config(format!("Failed to open {}: {}", input.display(), e)))?;
    Ok(Box::new(BufReader::new(file)))
}

fn tokenize(input: PathBuf, separator: char, quote: char) -> MapperResult<()> {
    let config = MapperConfig::default()
        .with_separator(separator)
        .with_quote(quote)
        .with_header(false);
    let factory = MapperFactory::new(config)?;
    let reader = factory.csv_reader(open_input(&input)?)?;

    let mut out = JsonWriter::new(io::stdout().lock(), JsonLayout::Ndjson)?;
    for row in reader {
        let row = row?;
        for error in &row.errors {
            eprintln!("  ⚠ {}", error);
        }
        out.write(&row.cells)?;
    }
    let count = out.count();
    out.finish()?;
    tracing::info!("Tokenized {} rows", count);
    Ok(())
}

fn map(input: PathBuf, config: Option<PathBuf>, format: Layout, fail_fast: bool) -> MapperResult<()> {
    let config = match config {
        Some(path) => MapperConfig::load_from_file(path)?,
        None => MapperConfig::default(),
    };
    let factory = MapperFactory::new(config)?;
    let mut reader = factory.csv_reader(open_input(&input)?)?;
    let columns = if factory.config().has_header {
        reader.read_header()?
    } else {
        ColumnKey::from_names(&factory.config().column_names, 0)
    };
    let meta = record_meta(&columns);
    let records = factory.map_rows(&meta, &columns, reader.map(|row| row.and_then(CsvRow::checked)))?;

    let layout = match format {
        Layout::Ndjson => JsonLayout::Ndjson,
        Layout::Array => JsonLayout::Array,
    };
    let mut out = JsonWriter::new(io::stdout().lock(), layout)?;
    let mut failed = 0;
    for record in records {
        match record {
            Ok(record) => out.write(&record)?,
            Err(e) if !fail_fast => {
                failed += 1;
                eprintln!("  ⚠ {}", e);
            }
            Err(e) => return Err(e),
        }
    }
    let count = out.count();
    out.finish()?;
    tracing::info!("Mapped {} records, {} rows failed", count, failed);
    Ok(())
}

fn validate_config(config: PathBuf) -> MapperResult<()> {
    println!("🔍 Validating {}...", config.display());
    let factory = MapperFactory::from_config_file(&config)?;
    let known = factory.converters();
    for (column, definition) in &factory.config().columns {
        if let Some(converter) = &definition.converter {
            if !known.has_converter(converter) {
                return Err(MapperError::ConverterNotFound(format!(
                    "{} (column {})",
                    converter, column
                )));
            }
        }
    }
    println!("  ✓ Separator {:?}, quote {:?}", factory.config().separator, factory.config().quote);
    println!("  ✓ {} column definitions", factory.config().columns.len());
    println!("✨ Configuration is valid");
    Ok(())
}
