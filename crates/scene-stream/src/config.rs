//! Capture configuration

use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// Mesh detail requested from the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshLevelOfDetail {
    Coarse,
    Medium,
    Fine,
    Unlimited,
}

/// What the device is asked to compute on each query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub enable_world_mesh: bool,
    pub enable_scene_object_meshes: bool,
    pub enable_scene_object_quads: bool,
    pub mesh_level_of_detail: MeshLevelOfDetail,
    pub enable_only_observed_scene_objects: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            enable_world_mesh: false,
            enable_scene_object_meshes: false,
            enable_scene_object_quads: true,
            mesh_level_of_detail: MeshLevelOfDetail::Coarse,
            enable_only_observed_scene_objects: false,
        }
    }
}

/// Capture and polling configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Delay between polling cycles
    pub interval_ms: u64,
    /// Query radius around the device, in meters
    pub search_radius: f32,
    /// Where one-shot snapshots are written
    pub output_dir: PathBuf,
    pub query: QuerySettings,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            search_radius: 5.0,
            output_dir: PathBuf::from("snapshots"),
            query: QuerySettings::default(),
        }
    }
}

impl CaptureConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read capture config: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("failed to parse capture config JSON: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
