// aaxtract - Audible AAX to M4B/M4A converter
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Command-line front end
//!
//! Exit codes: 0 success, 1 general failure, 2 bad arguments, 3 file not
//! found, 4 conversion failed, 5 missing activation.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use aaxtract::{AaxConverter, ConversionReport, ConvertOptions, ErrorKind, OutputFormat};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aaxtract")]
#[command(version)]
#[command(about = "Convert Audible AAX audiobooks to M4B/M4A", long_about = None)]
struct Cli {
    /// Input AAX file
    input: PathBuf,

    /// Directory the converted book is written into
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Output container format (m4b or m4a)
    #[arg(short, long, default_value = "m4b")]
    format: String,

    /// Activation code: 8 hex characters, e.g. 1CEB00DA
    #[arg(short, long)]
    activation: Option<String>,

    /// Write directly into the output directory, without
    /// author/series folders
    #[arg(long)]
    flat: bool,

    /// Insert a series directory between author and title when known
    #[arg(long)]
    series_dir: bool,

    /// Replace chapter titles with "Chapter N"
    #[arg(long)]
    numbered_chapters: bool,

    /// Also write the cover image next to the output
    #[arg(long)]
    extract_cover: bool,

    /// Also write a cue sheet next to the output
    #[arg(long)]
    cue: bool,

    /// Print the conversion report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "aaxtract=info",
        1 => "aaxtract=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn exit_code_for(report: &ConversionReport) -> u8 {
    match report.error_kind {
        None => 0,
        Some(ErrorKind::InvalidActivationFormat) | Some(ErrorKind::UnsupportedOutputFormat) => 2,
        Some(ErrorKind::FileNotFound) => 3,
        Some(ErrorKind::MissingActivation) => 5,
        Some(ErrorKind::MalformedContainer)
        | Some(ErrorKind::NotEncrypted)
        | Some(ErrorKind::ActivationMismatch)
        | Some(ErrorKind::Muxer) => 4,
        Some(ErrorKind::Io) => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = ConvertOptions {
        input_path: cli.input,
        output_dir: cli.output_dir,
        output_format: match OutputFormat::from_name(&cli.format) {
            Ok(format) => format,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::from(2);
            }
        },
        activation_code: cli.activation,
        flat_folder_structure: cli.flat,
        series_title_in_folder_structure: cli.series_dir,
        use_named_chapters: !cli.numbered_chapters,
        extract_cover_image: cli.extract_cover,
        write_cue_sheet: cli.cue,
    };

    let converter = AaxConverter::new(options);
    let result = converter.convert().await;
    let report = match &result {
        Ok(path) => ConversionReport {
            success: true,
            output_path: Some(path.clone()),
            error: None,
            error_kind: None,
        },
        Err(err) => ConversionReport {
            success: false,
            output_path: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        },
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("could not serialize report: {}", e),
        }
    } else {
        match &report {
            ConversionReport {
                success: true,
                output_path: Some(path),
                ..
            } => println!("Converted to {}", path.display()),
            ConversionReport {
                error: Some(message),
                ..
            } => eprintln!("Conversion failed: {}", message),
            _ => {}
        }
    }

    ExitCode::from(exit_code_for(&report))
}
