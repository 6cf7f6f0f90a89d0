//! Temporary storage for generated scripts
//!
//! A persisted script lives exactly as long as its [`ScriptArtifact`]: the
//! file is removed when the artifact is dropped, whichever way the caller exits.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{GeneratedScript, ScriptConfig};
use crate::error::Result;

/// Writes scripts to `<directory>/<module>_<uuid>.<ext>`
#[derive(Debug, Clone)]
pub struct ScriptStore {
    directory: PathBuf,
    extension: String,
}

impl Default for ScriptStore {
    fn default() -> Self {
        Self::from_config(&ScriptConfig::default())
    }
}

impl ScriptStore {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &ScriptConfig) -> Self {
        Self::new(
            config.directory.clone().unwrap_or_else(std::env::temp_dir),
            config.extension.clone(),
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Persist a script. The file exists until the returned artifact is dropped.
    pub fn persist(&self, script: &GeneratedScript) -> Result<ScriptArtifact> {
        let prefix = format!("{}_{}", script.module, script.id.simple());
        let suffix = format!(".{}", self.extension);

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(0)
            .tempfile_in(&self.directory)?;
        file.write_all(script.text.as_bytes())?;
        file.flush()?;

        debug!(path = %file.path().display(), "Persisted script");
        Ok(ScriptArtifact { file })
    }
}

/// A script file on disk, removed on drop
#[derive(Debug)]
pub struct ScriptArtifact {
    file: NamedTempFile,
}

impl ScriptArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Remove the file now, reporting failure instead of ignoring it
    pub fn remove(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close().map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to remove script");
            e
        })?;
        debug!(path = %path.display(), "Removed script");
        Ok(())
    }
}
