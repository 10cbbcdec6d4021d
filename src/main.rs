use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use rust_vslam_tracker::io::odometry::load_odometry;
use rust_vslam_tracker::sim::{SceneConfig, SyntheticFeatureStage, SyntheticScene};
use rust_vslam_tracker::system::SlamSystem;
use rust_vslam_tracker::SlamConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("rust_vslam_tracker=info".parse()?),
        )
        .init();

    // usage: vslam-tracker [config.yaml] [--odometry poses.csv]
    let args: Vec<String> = std::env::args().collect();

    let config = match args.get(1).filter(|a| !a.starts_with("--")) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SlamConfig::from_yaml_file(Path::new(path)).with_context(|| format!("Failed to load {}", path))?
        }
        None => {
            info!("Using default configuration");
            SlamConfig::default()
        }
    };

    let odometry = match args.iter().position(|a| a == "--odometry").and_then(|i| args.get(i + 1)) {
        Some(path) => {
            let entries = load_odometry(Path::new(path))?;
            info!("Loaded {} odometry poses from {}", entries.len(), path);
            entries
        }
        None => Vec::new(),
    };

    let scene = Arc::new(SyntheticScene::generate(SceneConfig::default()));
    info!(
        "Synthetic scene: {} points, {} frames",
        scene.points.len(),
        scene.len()
    );
    if !odometry.is_empty() && odometry.len() < scene.len() {
        warn!(
            "Odometry covers {} of {} frames, the rest uses the motion model",
            odometry.len(),
            scene.len()
        );
    }

    let mut system = SlamSystem::new(config, scene.camera, SyntheticFeatureStage::new(scene.clone()))?;

    for k in 0..scene.len() {
        let pose = odometry.get(k).map(|entry| &entry.pose);
        let output = system.process_frame(scene.timestamp(k), pose)?;
        if let Some(closure) = &output.loop_closure {
            info!(
                "Frame {}: loop {} -> {} ({} inliers)",
                k, closure.query, closure.reference, closure.inliers
            );
        }
    }

    let trajectory = system.trajectory();
    let squared_errors: f64 = trajectory
        .iter()
        .zip(&scene.trajectory)
        .map(|((_, estimate), truth)| (estimate.translation - truth.translation).norm_squared())
        .sum();
    let rmse = (squared_errors / trajectory.len().max(1) as f64).sqrt();

    let stats = system.stats();
    info!("=== Summary ===");
    info!(
        "Frames: {} ({} tracking, {} track losses)",
        stats.frames, stats.frames_tracking, stats.track_losses
    );
    info!("Average tracked points: {:.1}", stats.average_tracked_points());
    info!(
        "Landmarks: {} created, {} alive",
        stats.total_created_landmarks,
        system.map().num_landmarks()
    );
    info!(
        "Local maps: {}, loop closures: {}",
        system.map().num_local_maps(),
        system.loop_closures().len()
    );
    info!("Translation RMSE: {:.4} m", rmse);

    Ok(())
}
