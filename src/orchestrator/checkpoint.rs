//! Crash-safe checkpoint: a single ASCII decimal integer, replaced
//! atomically via write-to-temp-then-rename so a crash mid-write can never
//! leave a torn or half-written cursor file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BatchCheckpoint {
    pub cursor_id: i64,
}

impl BatchCheckpoint {
    /// Missing file means cursor = 0, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let cursor_id = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("corrupt checkpoint file {}", path.display()))?;
                Ok(Self { cursor_id })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("reading checkpoint file {}", path.display())),
        }
    }

    pub fn save(self, path: &Path) -> Result<()> {
        let tmp_path = tmp_path_for(path);
        std::fs::write(&tmp_path, self.cursor_id.to_string())
            .with_context(|| format!("writing temp checkpoint file {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming checkpoint file into place at {}", path.display()))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
