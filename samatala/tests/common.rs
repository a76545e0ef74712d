//! Test utilities for Samatala integration tests.
//!
//! Builds artifact trees the way the terrain generator and simulator would.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use samatala::{ArtifactLayout, HeightMap, HeightmapStore, PileHeight, PipelineConfig};
use tempfile::TempDir;

/// Configuration rooted in `root` with fast polling and no settle delay.
pub fn fast_config(root: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.data_root = root.path().to_path_buf();
    config.watch.timeout_secs = 5.0;
    config.watch.poll_interval_secs = 0.02;
    config.watch.settle_secs = 0.0;
    config
}

pub fn pile(meters: f64) -> PileHeight {
    PileHeight::new(meters).unwrap()
}

/// Write the initial height map the run starts from.
pub fn write_initial(layout: &ArtifactLayout, pile: PileHeight, map: &HeightMap) -> PathBuf {
    let path = layout.initial_heightmap(pile);
    HeightmapStore::new(layout.clone()).save(&path, map).unwrap();
    path
}

/// Gaussian mound of `height` centered in a `rows x cols` grid.
pub fn mound(rows: usize, cols: usize, height: f32) -> HeightMap {
    HeightMap::from_fn(rows, cols, |r, c| {
        let dr = (r as f32 - rows as f32 / 2.0) / (rows as f32 / 6.0);
        let dc = (c as f32 - cols as f32 / 2.0) / (cols as f32 / 6.0);
        height * (-(dr * dr + dc * dc) / 2.0).exp()
    })
}

/// Particle rows `x,y,z,v` sampled over a mound inside the default region,
/// plus a few particles outside it.
pub fn mound_cloud_text(height: f32) -> String {
    let mut text = String::from("x,y,z,pressure\n");
    for i in 0..60 {
        for j in 0..30 {
            let x = 0.05 + i as f32 * 0.08;
            let y = -0.95 + j as f32 * 0.065;
            let z = 0.01 + height * (-((x - 2.5).powi(2) + y * y) / 0.5).exp();
            text.push_str(&format!("{},{},{},0.0\n", x, y, z));
        }
    }
    // Outside the region of interest
    text.push_str("6.0,0.0,0.9,0.0\n-0.5,0.0,0.9,0.0\n2.0,1.5,0.9,0.0\n2.0,0.0,-0.1,0.0\n");
    text
}

/// Write a simulator point cloud into `dir`, creating it if needed.
///
/// The file appears under its final name only once complete, so a watcher
/// polling concurrently never reads a partial cloud.
pub fn write_cloud(dir: &Path, name: &str, text: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let partial = dir.join(format!("{}.partial", name));
    fs::write(&partial, text).unwrap();
    fs::rename(&partial, &path).unwrap();
    path
}
