use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Private working directory for one pipeline branch. Everything written
/// under it is removed when the value is dropped, whichever way the branch
/// exits.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("llm-svg-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)
                    .with_context(|| format!("failed to create {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .with_context(|| "failed to create scratch directory")?;
        debug!("scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        debug!("removing scratch directory {}", self.dir.path().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = Scratch::new(Some(root.path())).unwrap();
        let file = scratch.path("mask.png");
        std::fs::write(&file, b"x").unwrap();
        let dir = scratch.dir().to_path_buf();
        assert!(dir.starts_with(root.path()));
        drop(scratch);
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn removed_when_a_branch_fails() {
        let root = tempfile::tempdir().unwrap();
        let run = || -> Result<PathBuf> {
            let scratch = Scratch::new(Some(root.path()))?;
            std::fs::write(scratch.path("source.png"), b"x")?;
            let dir = scratch.dir().to_path_buf();
            anyhow::bail!("failed in {}", dir.display());
        };
        let err = run().unwrap_err().to_string();
        let dir = PathBuf::from(err.trim_start_matches("failed in "));
        assert!(!dir.exists());
    }
}
