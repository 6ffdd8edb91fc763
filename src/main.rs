//! pdf-o-rama CLI
//!
//! Command-line interface for concatenating, inspecting, stripping,
//! watermarking and filling PDFs.

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use log::Level;
use pdf_o_rama::commands::{
    self, ConcatOptions, FieldsOptions, FillOptions, StripOptions, WatermarkOptions,
};
use pdf_o_rama::WriterOptions;
use std::io::Write;
use std::path::PathBuf;

/// Tools for working with PDF files and their forms
#[derive(Parser, Debug)]
#[command(name = "pdf-o-rama", author, version, about, long_about = None)]
struct Cli {
    /// Show debug output and full error details
    #[arg(long, global = true)]
    debug: bool,

    /// Do not compress newly written XObject streams
    #[arg(long, global = true)]
    no_compress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Concatenate two or more PDFs, in the order given
    Concat {
        /// Input PDF files
        pdf_files: Vec<PathBuf>,

        /// Output PDF file
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Extract the AcroForm field data from a PDF and optionally create a
    /// copy stripped of its AcroForm and annotations
    Fields {
        /// Input PDF file
        pdf_file: Option<PathBuf>,

        /// Output JSON file
        #[arg(short, long)]
        data_file: Option<PathBuf>,

        /// Stripped output PDF; adds its MD5 to the JSON
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Strip the AcroForm and page annotations from a PDF
    Strip {
        /// Input PDF file
        pdf_file: Option<PathBuf>,

        /// Output PDF file
        #[arg(short, long)]
        output_file: Option<PathBuf>,

        /// Append an incremental update instead of rebuilding the file
        #[arg(short, long)]
        incremental: bool,
    },

    /// Add a watermark to every page of a PDF, dropping forms and annotations
    Watermark {
        /// Input PDF file
        pdf_file: Option<PathBuf>,

        /// PDF whose first page is the watermark
        #[arg(short, long)]
        watermark_file: Option<PathBuf>,

        /// Output PDF file
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Fill in the marks described by a JSON5 data file, checking the
    /// input's MD5 when the data carries one
    Fill {
        /// Input PDF file
        pdf_file: Option<PathBuf>,

        /// Output PDF file
        #[arg(short, long)]
        output_file: Option<PathBuf>,

        /// Input JSON5 data file
        #[arg(short, long)]
        data_file: Option<PathBuf>,

        /// TrueType font for text marks
        #[arg(short, long)]
        font_file: Option<PathBuf>,

        /// Put borders around checkboxes
        #[arg(short, long)]
        checkbox_borders: bool,
    },
}

fn init_logger(debug: bool) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "error: {}", record.args()),
            Level::Warn => writeln!(buf, "warning: {}", record.args()),
            _ => writeln!(buf, "{}", record.args()),
        });
    builder.try_init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print()?;
            return match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Ok(()),
                _ => std::process::exit(-1),
            };
        }
    };
    init_logger(cli.debug)?;

    let writer = WriterOptions {
        compress_streams: !cli.no_compress,
    };

    let result = match cli.command {
        Command::Concat {
            pdf_files,
            output_file,
        } => commands::concat(&ConcatOptions {
            pdf_files,
            output_file,
            writer,
        }),
        Command::Fields {
            pdf_file,
            data_file,
            output_file,
        } => commands::fields(&FieldsOptions {
            pdf_file,
            data_file,
            output_file,
            writer,
        }),
        Command::Strip {
            pdf_file,
            output_file,
            incremental,
        } => commands::strip(&StripOptions {
            pdf_file,
            output_file,
            incremental,
            writer,
        }),
        Command::Watermark {
            pdf_file,
            watermark_file,
            output_file,
        } => commands::watermark(&WatermarkOptions {
            pdf_file,
            watermark_file,
            output_file,
            writer,
        }),
        Command::Fill {
            pdf_file,
            output_file,
            data_file,
            font_file,
            checkbox_borders,
        } => commands::fill(&FillOptions {
            pdf_file,
            output_file,
            data_file,
            font_file,
            checkbox_borders,
            writer,
        }),
    };

    match commands::exit_status(result) {
        0 => Ok(()),
        status => std::process::exit(status),
    }
}
