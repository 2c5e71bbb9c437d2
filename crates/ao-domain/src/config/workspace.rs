use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Fixed root directory; each task gets a subdirectory named after its
    /// sanitized task id.
    #[serde(default = "d_ws_path")]
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { root: d_ws_path() }
    }
}

fn d_ws_path() -> PathBuf {
    PathBuf::from("./workspace")
}
