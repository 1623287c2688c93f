use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::Mat4;
use scene_core::Scene;
use scene_data::{Snapshot, SnapshotCodec};
use scene_stream::{CaptureConfig, PollingCoordinator, StaticSceneSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scene")]
#[command(about = "Scene snapshot tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header, matrix and objects of a snapshot
    Inspect {
        file: PathBuf,
    },

    /// Frame a raw scene payload as a snapshot
    Wrap {
        payload: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Row-major placement matrix as 16 comma-separated floats. Inferred from the floor when omitted.
        #[arg(long)]
        matrix: Option<String>,
    },

    /// Poll a snapshot file as a static source and print status after each publication
    Poll {
        file: PathBuf,
        /// Overrides the config interval
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long, default_value = "5")]
        cycles: u64,
        /// Capture config JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// One-shot capture into a timestamped .suscene file
    Snapshot {
        file: PathBuf,
        /// Output directory (defaults to the config's output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the transform resolved from a snapshot's scene
    Infer {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let codec = SnapshotCodec::default();

    match cli.command {
        Commands::Inspect { file } => {
            let snapshot = load_snapshot(&codec, &file)?;
            let header = snapshot.header();

            println!("Snapshot: {}", file.display());
            println!("  Version:  {}", header.version);
            println!("  Payload:  {} bytes", snapshot.raw_payload().len());
            println!(
                "  Matrix:   {}",
                if snapshot.matrix_is_inferred() { "inferred from floor" } else { "stored" }
            );
            print_matrix(&snapshot.placement_matrix());

            match snapshot.scene() {
                Ok(scene) => print_scene(scene),
                Err(e) => println!("\nPayload does not decode: {}", e),
            }
        }

        Commands::Wrap { payload, output, matrix } => {
            let raw = std::fs::read(&payload)
                .with_context(|| format!("failed to read payload: {}", payload.display()))?;
            let matrix = matrix.as_deref().map(parse_matrix).transpose()?;

            let snapshot = codec
                .wrap(raw, matrix)
                .context("failed to wrap payload")?;
            snapshot
                .save(&output)
                .with_context(|| format!("failed to write snapshot: {}", output.display()))?;

            println!(
                "Wrapped {} bytes -> {} (matrix {})",
                snapshot.raw_payload().len(),
                output.display(),
                if snapshot.matrix_is_inferred() { "inferred" } else { "stored" }
            );
        }

        Commands::Poll { file, interval_ms, cycles, config } => {
            let config = load_config(config.as_deref())?;
            let interval_ms = interval_ms.unwrap_or(config.interval_ms);

            let source = StaticSceneSource::from_file(&codec, &file)
                .with_context(|| format!("failed to load scene: {}", file.display()))?;
            let coordinator = PollingCoordinator::new(Arc::new(source), tokio::runtime::Handle::current());
            let mut publications = coordinator.subscribe();

            coordinator.start_polling(interval_ms);
            for _ in 0..cycles {
                let Some(publication) = publications.recv().await else {
                    break;
                };
                println!("Published revision {}", publication.revision);
                println!("{}\n", coordinator.status());
            }
            coordinator.stop_polling();

            println!("Final status:\n{}", coordinator.status());
        }

        Commands::Snapshot { file, output, config } => {
            let config = load_config(config.as_deref())?;
            let dir = output.unwrap_or(config.output_dir);

            let source = StaticSceneSource::from_file(&codec, &file)
                .with_context(|| format!("failed to load scene: {}", file.display()))?;
            let coordinator = Arc::new(PollingCoordinator::new(
                Arc::new(source),
                tokio::runtime::Handle::current(),
            ));

            let worker = Arc::clone(&coordinator);
            let path = tokio::task::spawn_blocking(move || worker.take_snapshot_to(&dir))
                .await?
                .context("snapshot failed")?;

            println!("Saved snapshot -> {}", path.display());
            println!("{}", coordinator.status());
        }

        Commands::Infer { file } => {
            let snapshot = load_snapshot(&codec, &file)?;
            let scene = snapshot.scene().context("snapshot payload does not decode")?;

            match scene.floor() {
                Some(floor) => println!("Floor: object {}", floor.id),
                None => println!("Floor: none (identity)"),
            }

            println!("\nResolved transform:");
            print_matrix(&scene_core::resolve(scene));

            let stored = (!snapshot.matrix_is_inferred()).then(|| snapshot.placement_matrix());
            let (effective, inferred) = scene_core::read_or_infer(scene, stored);
            println!("\nEffective transform ({}):", if inferred { "inferred" } else { "stored" });
            print_matrix(&effective);
        }
    }

    Ok(())
}

fn load_snapshot(codec: &SnapshotCodec, path: &Path) -> Result<Snapshot> {
    codec
        .load(path)
        .with_context(|| format!("failed to load snapshot: {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<CaptureConfig> {
    match path {
        Some(path) => CaptureConfig::load(path),
        None => Ok(CaptureConfig::default()),
    }
}

/// Parse 16 comma-separated floats, row-major
fn parse_matrix(text: &str) -> Result<Mat4> {
    let values: Vec<f32> = text
        .split(',')
        .map(|s| s.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .context("matrix values must be numbers")?;

    let rows: [f32; 16] = values
        .try_into()
        .map_err(|v: Vec<f32>| anyhow::anyhow!("matrix needs 16 values, got {}", v.len()))?;
    Ok(Mat4::from_cols_array(&rows).transpose())
}

fn print_matrix(m: &Mat4) {
    for r in 0..4 {
        let row = m.row(r);
        println!("  [{:>10.4} {:>10.4} {:>10.4} {:>10.4}]", row.x, row.y, row.z, row.w);
    }
}

fn print_scene(scene: &Scene) {
    println!("\nObjects: {} ({} quads)", scene.object_count(), scene.quad_count());
    for object in &scene.objects {
        let t = object.placement.w_axis;
        println!(
            "  #{:<6} {:<20} at ({:.3}, {:.3}, {:.3}), {} quads",
            object.id,
            object.kind.name(),
            t.x,
            t.y,
            t.z,
            object.quads.len()
        );
    }
}
