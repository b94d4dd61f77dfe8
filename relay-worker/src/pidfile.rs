//! Pid files: the liveness and cooperative-stop mechanism.
//!
//! Every running worker process owns exactly one pid file. The file's
//! existence is the only liveness signal the process consults about itself:
//! deleting it makes the worker's loop condition false on its next
//! iteration. This is the integration point for external process managers,
//! so the files stay ordinary files with a predictable name pattern.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use uuid::Uuid;

/// One worker process's pid file, removed on every exit path.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `<dir>/<prefix><pid>_<unique>.pid` recording this process.
    pub fn create(dir: &Path, prefix: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let pid = std::process::id();
        let file_name = format!("{prefix}{pid}_{}.pid", Uuid::new_v4().simple());
        let path = dir.join(file_name);
        fs::write(&path, format!("{pid}\n"))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process is still supposed to run.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete the file if still present.
    pub fn remove(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove pid file");
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// How many running workers a stop request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    All,
    Count(usize),
}

impl FromStr for StopRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(StopRequest::All);
        }
        s.parse::<usize>()
            .map(StopRequest::Count)
            .map_err(|_| format!("expected a number or `all`, got `{s}`"))
    }
}

/// Request a cooperative stop by deleting pid files.
///
/// Deletes every file in `dir` matching `<prefix>*.pid`, or only the first
/// `count` encountered. Enumeration order is filesystem-dependent, so a
/// partial stop makes no promise about which workers go. Nothing is
/// signalled or killed here; each worker notices its missing pid file at
/// its next iteration boundary. Returns the number of files removed.
pub fn stop_workers(dir: &Path, prefix: &str, request: StopRequest) -> io::Result<usize> {
    let limit = match request {
        StopRequest::All => usize::MAX,
        StopRequest::Count(0) => return Ok(0),
        StopRequest::Count(n) => n,
    };

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(prefix) || !name.ends_with(".pid") {
            continue;
        }

        tracing::info!(pid_file = name, "deleting pid file");
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            // someone else stopped this worker first, fine
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }

        if removed == limit {
            break;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_writes_a_file_with_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::create(dir.path(), "queue_worker_").unwrap();

        assert!(pid_file.exists());
        let name = pid_file.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("queue_worker_"));
        assert!(name.ends_with(".pid"));

        let contents = fs::read_to_string(pid_file.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn dropping_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let pid_file = PidFile::create(dir.path(), "queue_worker_").unwrap();
            pid_file.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::create(dir.path(), "queue_worker_").unwrap();
        pid_file.remove();
        pid_file.remove();
        assert!(!pid_file.exists());
    }

    #[test]
    fn stop_by_count_removes_exactly_that_many() {
        let dir = tempfile::tempdir().unwrap();
        let _files: Vec<PidFile> = (0..5)
            .map(|_| PidFile::create(dir.path(), "queue_worker_").unwrap())
            .collect();

        let removed = stop_workers(dir.path(), "queue_worker_", StopRequest::Count(2)).unwrap();
        assert_eq!(removed, 2);

        let remaining = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 3);
    }

    #[test]
    fn stop_all_removes_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..3 {
            let file = PidFile::create(dir.path(), "queue_worker_").unwrap();
            std::mem::forget(file);
        }
        fs::write(dir.path().join("unrelated.txt"), "keep me").unwrap();
        fs::write(dir.path().join("other_prefix_1.pid"), "keep me").unwrap();

        let removed = stop_workers(dir.path(), "queue_worker_", StopRequest::All).unwrap();
        assert_eq!(removed, 3);

        let remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&"unrelated.txt".to_string()));
    }

    #[test]
    fn stop_zero_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let _file = PidFile::create(dir.path(), "queue_worker_").unwrap();

        let removed = stop_workers(dir.path(), "queue_worker_", StopRequest::Count(0)).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn stop_request_parses_count_and_all() {
        assert_eq!("all".parse::<StopRequest>().unwrap(), StopRequest::All);
        assert_eq!("ALL".parse::<StopRequest>().unwrap(), StopRequest::All);
        assert_eq!("3".parse::<StopRequest>().unwrap(), StopRequest::Count(3));
        assert!("some".parse::<StopRequest>().is_err());
    }
}
