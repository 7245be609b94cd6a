use anyhow::Context;
use clap::Parser;
use cloudbag::generator::{FrameGenerator, GeneratorParams};
use std::{fs::File, io::Read, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Bag file to create. An existing file is overwritten.
    output: PathBuf,

    #[arg(short, long, default_value = "/points")]
    topic: String,

    #[arg(short, long, default_value_t = 10)]
    frames: u32,

    /// JSON file with generator parameters, as printed by `params`.
    #[arg(short, long)]
    params: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let params = match &args.params {
        Some(path) => {
            // Read generator parameters from config file.
            let mut file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let mut serialized = String::new();
            file.read_to_string(&mut serialized)?;
            serde_json::from_str(&serialized)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => GeneratorParams::default(),
    };

    FrameGenerator::new(params)
        .write_frames(&args.output, &args.topic, args.frames)
        .with_context(|| format!("writing {}", args.output.display()))
}
