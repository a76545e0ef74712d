//! Artifact path scheme.
//!
//! Every artifact a run touches is resolved here from its [`RunIdentity`]:
//!
//! ```text
//! <data_root>/
//! ├── init_heightmaps/<pile repr>_height.npy              initial terrain
//! ├── control_commands/<pile:.6>_<push>.txt              optimizer output
//! ├── output/<pile:.6>/soil_leveling_<push>/fluid*.csv   simulator point cloud
//! └── temp/<pile:.6>_<push>_<stage>.npy                  derived height maps
//! ```
//!
//! Pile heights are quantized and push labels are path-safe, so distinct
//! identities never resolve to the same file.

use std::path::{Path, PathBuf};

use crate::core::{PileHeight, RunIdentity};
use crate::watch::PrefixSuffixMatcher;

/// Stage tag of the height map reduced from a simulator point cloud.
pub const STAGE_HEIGHTMAP: &str = "heightmap";

/// File name prefix of simulator point clouds.
pub const POINT_CLOUD_PREFIX: &str = "fluid";

/// File name suffix of simulator point clouds.
pub const POINT_CLOUD_SUFFIX: &str = ".csv";

/// Resolves artifact paths below a data root.
#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    data_root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Initial height map for a pile, as prepared by the terrain generator.
    pub fn initial_heightmap(&self, pile_height: PileHeight) -> PathBuf {
        self.data_root
            .join("init_heightmaps")
            .join(format!("{}_height.npy", pile_height.repr()))
    }

    pub fn control_commands_dir(&self) -> PathBuf {
        self.data_root.join("control_commands")
    }

    /// Control-command text artifact for one push.
    pub fn control_commands(&self, id: &RunIdentity) -> PathBuf {
        self.control_commands_dir()
            .join(format!("{}.txt", id.stem()))
    }

    /// Derived height map for one push and stage tag.
    ///
    /// Stage tags are static identifiers such as [`STAGE_HEIGHTMAP`].
    pub fn heightmap(&self, id: &RunIdentity, stage: &str) -> PathBuf {
        debug_assert!(
            !stage.is_empty() && !stage.contains(['/', '\\']),
            "stage tag must be a plain identifier"
        );
        self.data_root
            .join("temp")
            .join(format!("{}_{}.npy", id.stem(), stage))
    }

    /// Directory the simulator writes its point clouds into.
    pub fn point_cloud_dir(&self, id: &RunIdentity) -> PathBuf {
        self.data_root
            .join("output")
            .join(id.pile_height.to_string())
            .join(format!("soil_leveling_{}", id.push))
    }

    /// Matcher for simulator point-cloud files (`fluid*.csv`).
    pub fn point_cloud_matcher(&self) -> PrefixSuffixMatcher {
        PrefixSuffixMatcher::new(POINT_CLOUD_PREFIX, POINT_CLOUD_SUFFIX)
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new("data")
    }
}
