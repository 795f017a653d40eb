//! Remove the watermark from one or more images.
//!
//! Usage:
//! ```sh
//! cargo run --example remove_watermark -- <config.json|-> input.png [input2.png ...]
//! ```
//!
//! Cleaned images are written next to the inputs with the configured prefix.

use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

use nano_cleanse::{Config, Coordinator, ImageInput, JobStatus};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <config.json|-> <input>...", args[0]);
        process::exit(1);
    }

    let config = if args[1] == "-" {
        Config::default()
    } else {
        match Config::load(&args[1]) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    };

    let coordinator = Arc::new(Coordinator::from_config(&config));
    let queue = coordinator.batch_queue();

    let mut inputs = Vec::new();
    for path in &args[2..] {
        match std::fs::read(path) {
            Ok(bytes) => inputs.push(ImageInput::new(path.as_str(), bytes)),
            Err(e) => eprintln!("Skipped {path}: {e}"),
        }
    }
    queue.enqueue(inputs);
    queue.drain();

    let mut failed = false;
    for job in queue.jobs() {
        match (job.status, &job.result) {
            (JobStatus::Done, Some(result)) => {
                let path = Path::new(&job.name);
                let file_name = path
                    .file_name()
                    .map_or_else(|| job.name.clone(), |n| n.to_string_lossy().into_owned());
                let output = path.with_file_name(coordinator.download_name(&file_name));
                if let Err(e) = std::fs::write(&output, result) {
                    eprintln!("Error writing {}: {e}", output.display());
                    failed = true;
                } else {
                    println!("Done: {} -> {}", job.name, output.display());
                }
            }
            _ => {
                eprintln!(
                    "Error: {}: {}",
                    job.name,
                    job.error.as_deref().unwrap_or("not processed")
                );
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}
