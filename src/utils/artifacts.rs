use std::path::Path;

use log::{debug, info};

use crate::config::defs::Stage;

/// Decides whether a producing step must run. Existence of the target is the
/// only run state; nothing here deletes or rewrites a checked path.
pub trait ArtifactStore {
    fn exists(&self, path: &Path) -> bool;

    /// False (with a notice) when `path` is already present, true otherwise.
    fn should_run(&self, path: &Path) -> bool {
        if self.exists(path) {
            info!(
                "{} already exists and will not be overwritten. Skipping this folder/file...",
                path.display()
            );
            false
        } else {
            true
        }
    }

    /// Called once a step has produced `path`.
    fn record(&self, path: &Path, stage: Stage);
}

/// Plain filesystem check.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactStore;

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn record(&self, path: &Path, stage: Stage) {
        debug!("{} artifact ready: {}", stage, path.display());
    }
}
