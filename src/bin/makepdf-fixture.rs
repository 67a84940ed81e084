use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use log::info;
use makepdf::utils::{write_basic_pdf, write_noise_image};
use std::path::Path;

/// Generate random input files (PDFs with text pages, noise images) to try out makePDF.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Desired action
    #[command(subcommand)]
    cmd: FixtureCmd,
}

#[derive(Subcommand, Debug)]
enum FixtureCmd {
    /// Generate a PDF whose pages show the document name, the page number and random text
    GeneratePdf {
        /// Output path
        #[arg(short = 'o')]
        output_path: String,
        /// Number of pages of the document
        #[arg(short = 'n', default_value_t = 2)]
        num_pages: u8,
    },
    /// Generate an image of random pixels, the format follows the extension
    GenerateImage {
        /// Output path
        #[arg(short = 'o')]
        output_path: String,
        /// Width in pixels
        #[arg(short = 'W', long, default_value_t = 64)]
        width: u32,
        /// Height in pixels
        #[arg(short = 'H', long, default_value_t = 64)]
        height: u32,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.cmd {
        FixtureCmd::GeneratePdf {
            output_path,
            num_pages,
        } => refuse_existing(&output_path).and_then(|()| write_basic_pdf(&output_path, num_pages)),
        FixtureCmd::GenerateImage {
            output_path,
            width,
            height,
        } => refuse_existing(&output_path)
            .and_then(|()| write_noise_image(&output_path, width, height)),
    };

    match result {
        Ok(()) => info!("Fixture written"),
        Err(err) => {
            eprintln!("Error encountered: {err}");
            std::process::exit(1);
        }
    }
}

fn refuse_existing(output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();

    if std::fs::exists(output_path)? {
        return Err(anyhow!(
            "A file at location '{}' exists already",
            output_path.display()
        ));
    }

    Ok(())
}
