//! Path resolution for ShellGate data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `SHELLGATE_DATA_DIR` env > `~/.shellgate`.
//! The resolved `DataDir` is passed to whoever needs a path.

use std::io;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "SHELLGATE_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir(PathBuf);

impl DataDir {
    /// Priority: `explicit` arg > `SHELLGATE_DATA_DIR` env > `~/.shellgate` default.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::resolve_with(explicit, std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
    }

    fn resolve_with(explicit: Option<&Path>, env: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(p) = explicit {
            return Ok(Self(p.to_path_buf()));
        }
        if let Some(p) = env.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self(p));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("HOME directory not found; pass --data-dir"))?;
        Ok(Self(home.join(".shellgate")))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn config_path(&self) -> PathBuf {
        self.0.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.0.join("logs")
    }

    /// Create the data dir and its subdirectories.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.0)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_beats_env() {
        let dir = DataDir::resolve_with(Some(Path::new("/tmp/a")), Some(PathBuf::from("/tmp/b")))
            .unwrap();
        assert_eq!(dir.path(), Path::new("/tmp/a"));
    }

    #[test]
    fn env_used_when_no_flag() {
        let dir = DataDir::resolve_with(None, Some(PathBuf::from("/tmp/b"))).unwrap();
        assert_eq!(dir.config_path(), PathBuf::from("/tmp/b/config.toml"));
        assert_eq!(dir.log_dir(), PathBuf::from("/tmp/b/logs"));
    }

    #[test]
    fn ensure_dirs_creates_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("data");
        let dir = DataDir::resolve_with(Some(root.as_path()), None).unwrap();
        dir.ensure_dirs().unwrap();
        assert!(dir.log_dir().is_dir());
    }
}
