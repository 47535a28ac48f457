//! Platform adapter: the capability set the engine needs from the host OS.
//!
//! Expressed as an explicit trait rather than a global singleton so tests can
//! inject a fake backed by an in-memory filesystem instead of touching real
//! disk state.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Host-OS capabilities consumed by the lock store and the admission path.
pub trait Platform: Send + Sync {
    /// Create a directory and all missing parents. Idempotent.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomic exclusive create-and-write: fails with `AlreadyExists` if the
    /// file is already present. On a write failure after creation the
    /// partial file is removed and the original error is returned.
    fn create_exclusive(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Remove a file. Absence is not an error.
    fn delete_file(&self, path: &Path);

    /// Whether a file exists at `path`.
    fn file_exists(&self, path: &Path) -> bool;

    /// Read a file's full contents as UTF-8.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Current process id.
    fn process_id(&self) -> u32;

    /// Current username.
    fn username(&self) -> String;

    /// Current hostname.
    fn hostname(&self) -> String;

    /// Platform temp directory, used as the default lock-store parent.
    fn temp_dir(&self) -> PathBuf;
}

/// Real platform adapter backed by `std::fs` and OS queries.
pub struct SystemPlatform;

impl SystemPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SystemPlatform {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn create_exclusive(&self, path: &Path, contents: &str) -> io::Result<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;

        if let Err(e) = file.write_all(contents.as_bytes()) {
            drop(file);
            let _ = std::fs::remove_file(path);
            return Err(e);
        }

        Ok(())
    }

    fn delete_file(&self, path: &Path) {
        let _ = std::fs::remove_file(path);
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn process_id(&self) -> u32 {
        std::process::id()
    }

    fn username(&self) -> String {
        nix::unistd::User::from_uid(nix::unistd::Uid::current())
            .ok()
            .flatten()
            .map(|u| u.name)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn hostname(&self) -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }
}

/// In-memory fake platform for tests: files are a map, identity is fixed.
///
/// The file map is reference-counted so tests simulating cross-process lock
/// contention can build two `FakePlatform`s with different identities that
/// share the same backing filesystem via [`FakePlatform::sharing_files`].
pub struct FakePlatform {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pid: u32,
    user: String,
    host: String,
}

impl FakePlatform {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            pid: 4242,
            user: user.into(),
            host: "testhost".to_string(),
        }
    }

    /// Builds another fake platform, with a different identity, that reads
    /// and writes the same in-memory filesystem as `self`.
    pub fn sharing_files(&self, user: impl Into<String>) -> Self {
        Self {
            files: self.files.clone(),
            pid: self.pid,
            user: user.into(),
            host: self.host.clone(),
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }
}

impl Platform for FakePlatform {
    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn create_exclusive(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn delete_file(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn process_id(&self) -> u32 {
        self.pid
    }

    fn username(&self) -> String {
        self.user.clone()
    }

    fn hostname(&self) -> String {
        self.host.clone()
    }

    fn temp_dir(&self) -> PathBuf {
        PathBuf::from("/tmp")
    }
}
