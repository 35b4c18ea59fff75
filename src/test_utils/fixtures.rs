use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Isolated directory for files a test writes.
pub struct Workspace {
    pub temp_dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` at `relative_path`, creating parent directories.
    pub fn write(&self, relative_path: &str, content: &str) -> Result<PathBuf> {
        let full_path = self.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, content)?;
        Ok(full_path)
    }

    /// Executable shell script standing in for a solver binary.
    #[cfg(unix)]
    pub fn fake_solver(&self, name: &str, body: &str) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.write(name, &format!("#!/bin/sh\n{body}\n"))?;
        let mut permissions = std::fs::metadata(&path)?.permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions)?;
        Ok(path)
    }
}
