//! Chhobi - command-line front end for the photo metadata core
//!
//! - `chhobi info <files..>`: camera, exposure, caption and keywords
//! - `chhobi preview|thumbnail <file> -o <out>`: embedded image extraction
//! - `chhobi tag <files..> --caption .. -k +kw -k -kw`: batch edits

use chhobi::cli::{self, exit_codes, Cli, Commands};
use chhobi::exiftool::EmbeddedImage;
use chhobi::logging;
use clap::Parser;

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = logging::init(cli.verbose, cli.json_output) {
        eprintln!("Failed to initialize logging: {}", e);
        return exit_codes::UNEXPECTED_FAILURE;
    }

    let settings = match cli::load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return exit_codes::UNEXPECTED_FAILURE;
        }
    };

    // Create tokio runtime for async commands
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            return exit_codes::UNEXPECTED_FAILURE;
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Info(args) => cli::info::run(args, &settings).await,
            Commands::Preview(args) => cli::extract::run(EmbeddedImage::Preview, args, &settings).await,
            Commands::Thumbnail(args) => cli::extract::run(EmbeddedImage::Thumbnail, args, &settings).await,
            Commands::Tag(args) => cli::tag::run(args, &settings).await,
        }
    });

    match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(stderr) = cli::channel_error(&e).and_then(|c| c.stderr()) {
                eprintln!("exiftool said:\n{}", stderr);
            }
            cli::categorize_error(&e)
        }
    }
}
