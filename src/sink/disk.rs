use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::SinkError;

const EXTENSION: &str = "csv";

/// Keeps a verbatim copy of each attachment under the destination directory.
#[derive(Debug, Clone)]
pub struct DiskSink {
    dir: PathBuf,
}

impl DiskSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DiskSink { dir: dir.into() }
    }

    pub fn target_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    /// Replaces `<dir>/<name>.csv` with `content`.
    pub fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf, SinkError> {
        let path = self.target_path(name);

        if path.exists() && is_locked(&path) {
            return Err(SinkError::Locked(path.display().to_string()));
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(&path, content)?;

        debug!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(path)
    }
}

/// An existing file another process holds exclusively cannot be read.
fn is_locked(path: &Path) -> bool {
    match File::open(path) {
        Ok(mut file) => {
            let mut byte = [0u8; 1];
            file.read(&mut byte).is_err()
        }
        Err(_) => path.exists(),
    }
}
