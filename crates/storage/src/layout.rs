// SPDX-License-Identifier: MIT

//! Deterministic on-disk paths under `<root>`. Exposes path resolvers
//! only — opening files is every other module's job, never this one's.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn download_path(&self, sha256: &str) -> PathBuf {
        self.downloads_dir().join(sha256)
    }

    pub fn download_part_path(&self, sha256: &str) -> PathBuf {
        self.downloads_dir().join(format!("{sha256}.part"))
    }

    pub fn package_dir(&self) -> PathBuf {
        self.root.join("package")
    }

    pub fn package_install_dir(&self, install_id: &str) -> PathBuf {
        self.package_dir().join(install_id)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn result_path(&self, uid: &str) -> PathBuf {
        self.results_dir().join(uid)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("daemon.log")
    }

    /// Create every directory this layout names. Idempotent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.downloads_dir(), self.package_dir(), self.results_dir(), self.log_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_consistently() {
        let layout = Layout::new("/srv/inferd");
        assert_eq!(layout.download_path("abc"), Path::new("/srv/inferd/downloads/abc"));
        assert_eq!(layout.download_part_path("abc"), Path::new("/srv/inferd/downloads/abc.part"));
        assert_eq!(layout.package_install_dir("install-1"), Path::new("/srv/inferd/package/install-1"));
        assert_eq!(layout.result_path("uid-1"), Path::new("/srv/inferd/results/uid-1"));
        assert_eq!(layout.catalog_path(), Path::new("/srv/inferd/catalog.db"));
        assert_eq!(layout.log_file(), Path::new("/srv/inferd/log/daemon.log"));
    }

    #[test]
    fn ensure_dirs_creates_tree() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(tmp.path());
        layout.ensure_dirs().expect("ensure_dirs");
        assert!(layout.downloads_dir().is_dir());
        assert!(layout.package_dir().is_dir());
        assert!(layout.results_dir().is_dir());
        assert!(layout.log_dir().is_dir());
    }
}
