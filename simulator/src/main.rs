use anyhow::Context;
use bridge::model::DetectionModel;
use bridge::server::{bridge_bind_address, DetectionBridge};
use clap::Parser;
use generator::scene::build_det_matrix;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod bridge;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "CFAR detection workflow driver")]
struct Args {
    /// Run synthetic frames through the detector and emit a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Frames to run in offline mode; each frame reseeds the noise
    #[arg(long, default_value_t = 1)]
    frames: u32,
    #[arg(long, default_value_t = 64)]
    range_bins: usize,
    #[arg(long, default_value_t = 32)]
    doppler_bins: usize,
    /// Keep the HTTP bridge alive for incoming scenes and control commands
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow.as_ref() {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.range_bins, args.doppler_bins)
    };

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(run(args, workflow_config))
}

async fn run(args: Args, workflow_config: WorkflowConfig) -> anyhow::Result<()> {
    let runner = Arc::new(Runner::new(workflow_config.clone())?);
    let bridge = DetectionBridge::new(runner.clone());

    if args.offline {
        let mut scene = workflow_config.scene.clone();
        let mut total = 0;
        for frame in 0..args.frames {
            scene.seed = workflow_config.scene.seed.wrapping_add(u64::from(frame));
            let matrix = build_det_matrix(
                &scene,
                workflow_config.range_bins,
                workflow_config.doppler_bins,
            )
            .with_context(|| format!("building frame {frame}"))?;
            let result = runner.execute(&matrix).await?;
            total += result.detections.len();

            println!(
                "Frame {} -> detections {}, processing {:?}, wait {:?}",
                result.frame,
                result.detections.len(),
                result.stats.processing_time,
                result.stats.wait_time
            );
            for det in &result.detections {
                log::debug!(
                    "  ({}, {}) range {:.2} m velocity {:.2} m/s snr {:.1}",
                    det.range_idx,
                    det.doppler_idx,
                    det.range,
                    det.velocity,
                    det.snr
                );
            }
            bridge
                .publish(DetectionModel::from_result(&result, scene.scenario.clone()))
                .await;
        }
        bridge.publish_status("Offline workflow results ready.");

        let metrics = runner.metrics().await;
        let report = format!(
            "frames={} detections={} errors={} processing_us={} wait_us={}\n",
            metrics.frames, total, metrics.errors, metrics.processing_time_us, metrics.wait_time_us
        );
        let report_path = PathBuf::from("tools/data/offline_detection.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening {}", report_path.display()))?;
        file.write_all(report.as_bytes())?;
    }

    if args.serve {
        let server = tokio::spawn(bridge.clone().serve(bridge_bind_address()));
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
        server.abort();
    }

    Ok(())
}
