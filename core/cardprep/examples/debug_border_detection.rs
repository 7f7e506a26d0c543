//! Run border detection on card photos and dump every intermediate stage.
//!
//! Usage:
//!   RUST_LOG=cardprep=debug cargo run --example debug_border_detection -- photo.jpg [more.png ...]
//!
//! Snapshots land in `debug_output/<file stem>/`; the processed archival
//! JPEG is written next to them as `output.jpg`.

use std::path::Path;

use cardprep::{CardPreprocessor, Detection, Preset};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cardprep=info")),
        )
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: debug_border_detection <image> [image ...]");
        std::process::exit(2);
    }

    for path in &paths {
        let stem = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let out_dir = Path::new("debug_output").join(&stem);

        println!("=== {path} ===");

        let input = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("  cannot read: {e}");
                continue;
            }
        };

        let result = CardPreprocessor::new(input).and_then(|p| {
            p.preset(Preset::Archival)
                .debug_dir(&out_dir)
                .process()
        });

        let card = match result {
            Ok(card) => card,
            Err(e) => {
                println!("  failed: {e}");
                continue;
            }
        };

        match &card.detection {
            Some(Detection::Detected {
                region,
                strategy,
                candidate,
            }) => println!(
                "  {strategy}: region=({}, {}, {}x{}), area={:.0}, aspect={:.3}, corners={}",
                region.x,
                region.y,
                region.width,
                region.height,
                candidate.area,
                candidate.aspect_ratio.unwrap_or(0.0),
                candidate
                    .corner_count
                    .map_or_else(|| "-".to_string(), |n| n.to_string()),
            ),
            Some(Detection::NotDetected) => println!("  NOT DETECTED, using the full frame"),
            None => println!("  detection disabled"),
        }

        println!(
            "  output: {}x{}, {} bytes at quality {} (input {} bytes)",
            card.width,
            card.height,
            card.data.len(),
            card.quality_used,
            card.original_size
        );

        let output_path = out_dir.join("output.jpg");
        if let Err(e) = std::fs::create_dir_all(&out_dir).and_then(|_| std::fs::write(&output_path, &card.data)) {
            println!("  cannot write {}: {e}", output_path.display());
        } else {
            println!("  wrote {}", output_path.display());
        }
    }
}
