//! Scoped directories for container volume mounts.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

/// A directory created for bind-mounting into a container.
#[derive(Debug)]
pub enum VolumeDir {
    /// Deleted when the value is dropped.
    Temporary(TempDir),
    /// Left on disk for the caller to manage.
    Persistent(PathBuf),
}

impl VolumeDir {
    pub fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Persistent(path) => path,
        }
    }
}

/// Create a directory on the local filesystem to mount as a container
/// volume.
///
/// A temporary directory lives as long as the returned value, which a
/// test typically holds for its whole run; a persistent one survives the
/// process.
pub fn volume_directory(temporary: bool) -> io::Result<VolumeDir> {
    if temporary {
        let dir = tempfile::Builder::new().prefix(".berth-volume-").tempdir()?;
        Ok(VolumeDir::Temporary(dir))
    } else {
        let suffix = Uuid::new_v4().to_string()[..8].to_string();
        let path = std::env::temp_dir().join(format!(".berth-volume-{}", suffix));
        std::fs::create_dir_all(&path)?;
        Ok(VolumeDir::Persistent(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_directory_is_removed_on_drop() {
        let dir = volume_directory(true).unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());

        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn persistent_directory_survives_drop() {
        let dir = volume_directory(false).unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());

        drop(dir);
        assert!(path.is_dir());

        std::fs::remove_dir_all(path).unwrap();
    }
}
