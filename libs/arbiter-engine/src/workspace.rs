//! Per-job scratch files.
//!
//! Every job gets its own id and its own paths under the scratch root:
//!
//! ```text
//! <root>/sources/<job>/<file>      source, directory-scoped so fixed names never collide
//! <root>/inputs/<job>_<index>.txt  one file per test input
//! <root>/builds/<job>/             compile artifacts
//! ```
//!
//! `JobWorkspace` releases all of them on `cleanup` or on drop, whichever
//! comes first, so no exit path leaves files behind.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const SOURCES_DIR: &str = "sources";
pub const INPUTS_DIR: &str = "inputs";
pub const BUILDS_DIR: &str = "builds";

#[derive(Debug, thiserror::Error)]
#[error("workspace I/O on {}: {source}", path.display())]
pub struct WorkspaceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError {
        path: path.to_path_buf(),
        source,
    }
}

/// Opaque, collision-free job identifier (random UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The scratch filesystem shared by all jobs.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        for kind in [SOURCES_DIR, INPUTS_DIR, BUILDS_DIR] {
            let dir = root.join(kind);
            fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mints a fresh job id and its (not yet materialized) workspace.
    pub fn open_job(&self) -> JobWorkspace {
        let id = JobId::new();
        JobWorkspace {
            id,
            source_dir: self.root.join(SOURCES_DIR).join(id.to_string()),
            build_dir: self.root.join(BUILDS_DIR).join(id.to_string()),
            inputs_dir: self.root.join(INPUTS_DIR),
            inputs: Vec::new(),
            released: false,
        }
    }

    /// Number of entries across all subtrees. Zero when no job is live.
    pub fn leftover_entries(&self) -> io::Result<usize> {
        let mut count = 0;
        for kind in [SOURCES_DIR, INPUTS_DIR, BUILDS_DIR] {
            count += fs::read_dir(self.root.join(kind))?.count();
        }
        Ok(count)
    }
}

/// Files owned by one job. Never reused.
#[derive(Debug)]
pub struct JobWorkspace {
    id: JobId,
    source_dir: PathBuf,
    build_dir: PathBuf,
    inputs_dir: PathBuf,
    inputs: Vec<PathBuf>,
    released: bool,
}

impl JobWorkspace {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn materialize_source(&mut self, file_name: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        fs::create_dir_all(&self.source_dir).map_err(io_err(&self.source_dir))?;
        let path = self.source_dir.join(file_name);
        fs::write(&path, content).map_err(io_err(&path))?;
        debug!(job_id = %self.id, path = %path.display(), "Source materialized");
        Ok(path)
    }

    pub fn materialize_input(&mut self, test_index: usize, content: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.inputs_dir.join(format!("{}_{}.txt", self.id, test_index));
        // Track before writing so a partial write is still cleaned up
        self.inputs.push(path.clone());
        fs::write(&path, content).map_err(io_err(&path))?;
        Ok(path)
    }

    /// Creates the artifact directory, writable from inside the sandbox.
    pub fn prepare_build_dir(&mut self) -> Result<&Path, WorkspaceError> {
        fs::create_dir_all(&self.build_dir).map_err(io_err(&self.build_dir))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.build_dir, fs::Permissions::from_mode(0o777))
                .map_err(io_err(&self.build_dir))?;
        }
        Ok(&self.build_dir)
    }

    /// Removes every file of this job. Idempotent.
    pub fn cleanup(&mut self) -> Result<(), WorkspaceError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut first_error = None;
        for dir in [&self.source_dir, &self.build_dir] {
            if let Err(e) = remove_dir_if_exists(dir) {
                first_error.get_or_insert(WorkspaceError { path: dir.clone(), source: e });
            }
        }
        for input in self.inputs.drain(..) {
            match fs::remove_file(&input) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(WorkspaceError { path: input, source: e });
                }
            }
        }

        debug!(job_id = %self.id, "Workspace released");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(job_id = %self.id, error = %e, "Failed to release job workspace");
        }
    }
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_job_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| JobId::new().to_string()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_materialize_and_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();

        let mut job = scratch.open_job();
        let source = job.materialize_source("Main.java", "public class Main {}").unwrap();
        let input = job.materialize_input(0, "1 2\n").unwrap();
        job.prepare_build_dir().unwrap();

        assert_eq!(fs::read_to_string(&source).unwrap(), "public class Main {}");
        assert_eq!(fs::read_to_string(&input).unwrap(), "1 2\n");
        assert!(source.starts_with(tmp.path().join(SOURCES_DIR)));
        assert!(input.starts_with(tmp.path().join(INPUTS_DIR)));
        assert_eq!(scratch.leftover_entries().unwrap(), 3);

        job.cleanup().unwrap();
        assert_eq!(scratch.leftover_entries().unwrap(), 0);
        // Second call is a no-op
        job.cleanup().unwrap();
    }

    #[test]
    fn test_drop_releases_files() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();
        {
            let mut job = scratch.open_job();
            job.materialize_source("a.py", "print(1)").unwrap();
            job.materialize_input(0, "").unwrap();
            job.materialize_input(1, "x").unwrap();
        }
        assert_eq!(scratch.leftover_entries().unwrap(), 0);
    }

    #[test]
    fn test_same_file_name_in_two_jobs_does_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();

        let mut first = scratch.open_job();
        let mut second = scratch.open_job();
        let a = first.materialize_source("Main.java", "A").unwrap();
        let b = second.materialize_source("Main.java", "B").unwrap();
        assert_ne!(a, b);

        drop(first);
        assert!(!a.exists());
        assert_eq!(fs::read_to_string(&b).unwrap(), "B");
    }
}
