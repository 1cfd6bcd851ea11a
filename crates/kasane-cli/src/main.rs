//! kasane: CLI for creating, inspecting, and rendering pipeline files.
//!
//! A pipeline file is the JSON stage list an interactive frontend
//! saves; this tool builds such files from scratch, lists the stage
//! kinds available, and renders a pipeline headlessly to a PNG.
//!
//! # Usage
//!
//! ```text
//! kasane stages
//! kasane new photo.png --stage grayscale --stage blur --out pipe.json
//! kasane render pipe.json --out result.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kasane_pipeline::{Chain, StageKind, codec, registry};
use tracing_subscriber::EnvFilter;

/// Create, inspect, and render kasane pipeline files.
#[derive(Parser)]
#[command(name = "kasane", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available stage kinds and their default parameters.
    Stages,
    /// Create a pipeline file for an image.
    New {
        /// Path to the source image (PNG, JPEG, BMP, WebP).
        image: PathBuf,

        /// Stage kind to append, repeatable and applied in order.
        #[arg(long = "stage", value_name = "KIND")]
        stages: Vec<String>,

        /// Where to write the pipeline file.
        #[arg(long, short, default_value = "pipeline.json")]
        out: PathBuf,
    },
    /// Evaluate a pipeline file and write a stage's output as PNG.
    Render {
        /// Path to the pipeline file.
        pipeline: PathBuf,

        /// Stage index to render; defaults to the last stage.
        #[arg(long)]
        stage: Option<usize>,

        /// Where to write the rendered image.
        #[arg(long, short, default_value = "render.png")]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Stages => list_stages(),
        Command::New { image, stages, out } => new_pipeline(&image, &stages, &out),
        Command::Render {
            pipeline,
            stage,
            out,
        } => render(&pipeline, stage, &out),
    }
}

fn list_stages() -> ExitCode {
    for spec in registry::REGISTRY {
        let params = spec.kind.default_params();
        match codec::params_payload(&params) {
            Ok(payload) => println!("{:<12} {payload}", spec.name),
            Err(e) => {
                eprintln!("Error serializing defaults for {}: {e}", spec.name);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn new_pipeline(image: &Path, stages: &[String], out: &Path) -> ExitCode {
    let bytes = match std::fs::read(image) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", image.display());
            return ExitCode::FAILURE;
        }
    };

    let mut chain = Chain::new();
    chain.set_root_image(bytes, Some(image.to_path_buf()));

    for name in stages {
        let Some(spec) = registry::lookup(name) else {
            eprintln!("Unknown stage kind: {name}");
            eprintln!("Run `kasane stages` to list the available kinds.");
            return ExitCode::FAILURE;
        };
        if spec.kind == StageKind::Source {
            eprintln!("The source stage is implicit; pass filter kinds only.");
            return ExitCode::FAILURE;
        }
        if let Err(e) = chain.push(spec.kind, spec.kind.default_params()) {
            eprintln!("Error appending {name}: {e}");
            return ExitCode::FAILURE;
        }
    }

    match kasane_host::store::save(&chain, out) {
        Ok(()) => {
            println!(
                "Wrote {} ({} stages)",
                out.display(),
                chain.len(),
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error writing {}: {e}", out.display());
            ExitCode::FAILURE
        }
    }
}

fn render(pipeline: &Path, stage: Option<usize>, out: &Path) -> ExitCode {
    let mut chain = match kasane_host::store::load(pipeline) {
        Ok(chain) => chain,
        Err(e) => {
            eprintln!("Error loading {}: {e}", pipeline.display());
            return ExitCode::FAILURE;
        }
    };

    let index = stage.unwrap_or(chain.len() - 1);
    let frame = match chain.image_at(index) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("Error evaluating stage {index}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match frame.save(out) {
        Ok(()) => {
            println!(
                "Wrote {} ({}x{}, stage {index})",
                out.display(),
                frame.width(),
                frame.height(),
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error writing {}: {e}", out.display());
            ExitCode::FAILURE
        }
    }
}
