//! The package stage: writing artifacts into the output directory.
//!
//! Artifacts are first written below a staging directory inside the output
//! directory. Only once every one of them (and the `weft-package.json` index)
//! has been written are they moved into place. Each file they replace is
//! moved aside into a backup directory first, so a failed move puts the
//! previous package back exactly as it was. The previous index is moved
//! aside before anything else and the new one is moved in last; while the
//! commit runs there is no index describing a mix of old and new files.
//!
//! Files listed in the previous index that the new package does not produce
//! are removed, so switching backends in one output directory leaves no
//! stale artifacts. Files never listed in an index are left alone.

use crate::backend::Artifact;
use crate::errors::BuildError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use weft_common::{ContentHash, InternalError};

/// Name of the package index written next to the artifacts.
pub const PACKAGE_INDEX: &str = "weft-package.json";

const STAGING_DIR: &str = ".weft-staging";
const BACKUP_DIR: &str = ".weft-backup";

/// One file written by packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFile {
    /// Path relative to the output directory.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// XXH3-128 hash of the contents.
    pub hash: ContentHash,
}

/// The result of packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    /// The directory written into.
    pub output_dir: PathBuf,
    /// Every artifact, in lowering order. The index itself is not listed.
    pub files: Vec<PackagedFile>,
}

impl PackageReport {
    /// Returns the sum of all artifact sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Finds the packaged file at `path`.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<&PackagedFile> {
        self.files.iter().find(|f| f.path == path.as_ref())
    }
}

#[derive(Serialize, Deserialize)]
struct PackageIndex {
    system: String,
    files: Vec<IndexEntry>,
}

#[derive(Serialize, Deserialize)]
struct IndexEntry {
    path: String,
    size: u64,
    hash: String,
}

/// Writes `artifacts` and the package index into `output_dir`.
///
/// On error the output directory holds the previous package, if any,
/// unchanged.
pub fn write_package(
    system_name: &str,
    artifacts: &[Artifact],
    output_dir: &Path,
) -> Result<PackageReport, BuildError> {
    let staging = output_dir.join(STAGING_DIR);
    let result = stage(system_name, artifacts, &staging).and_then(|files| {
        commit(&files, output_dir, &staging)?;
        Ok(PackageReport {
            output_dir: output_dir.to_path_buf(),
            files,
        })
    });
    if staging.exists() {
        // Best effort.
        let _ = fs::remove_dir_all(&staging);
    }
    result
}

/// Writes every artifact and the index below `staging`.
fn stage(
    system_name: &str,
    artifacts: &[Artifact],
    staging: &Path,
) -> Result<Vec<PackagedFile>, BuildError> {
    if staging.exists() {
        fs::remove_dir_all(staging).map_err(|e| BuildError::io(staging, e))?;
    }

    let mut files = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        check_relative(&artifact.path)?;
        write_file(&staging.join(&artifact.path), &artifact.contents)?;
        files.push(PackagedFile {
            path: artifact.path.clone(),
            size: artifact.contents.len() as u64,
            hash: ContentHash::from_bytes(&artifact.contents),
        });
    }

    let index = PackageIndex {
        system: system_name.to_string(),
        files: files
            .iter()
            .map(|f| IndexEntry {
                path: index_path(&f.path),
                size: f.size,
                hash: f.hash.to_hex(),
            })
            .collect(),
    };
    let index = serde_json::to_string_pretty(&index)
        .map_err(|e| InternalError::new(format!("cannot serialize package index: {e}")))?;
    write_file(&staging.join(PACKAGE_INDEX), index.as_bytes())?;
    Ok(files)
}

/// Moves the staged package into `output_dir`, undoing every move if one
/// of them fails.
fn commit(files: &[PackagedFile], output_dir: &Path, staging: &Path) -> Result<(), BuildError> {
    let stale = previous_files(output_dir);
    let mut journal = Journal::begin(output_dir)?;
    let result = (|| -> Result<(), BuildError> {
        journal.set_aside(Path::new(PACKAGE_INDEX))?;
        for file in files {
            journal.place(staging, &file.path)?;
        }
        let current: HashSet<String> = files.iter().map(|f| index_path(&f.path)).collect();
        for path in stale.iter().filter(|p| !current.contains(&index_path(p))) {
            journal.prune(path)?;
        }
        journal.place(staging, Path::new(PACKAGE_INDEX))
    })();
    match result {
        Ok(()) => {
            journal.finish();
            Ok(())
        }
        Err(err) => {
            journal.roll_back();
            Err(err)
        }
    }
}

/// Files listed by the index already in `output_dir`.
///
/// A missing index means there is nothing to prune; an unreadable one is
/// ignored with a warning, and so are entries that would escape the
/// directory.
fn previous_files(output_dir: &Path) -> Vec<PathBuf> {
    let path = output_dir.join(PACKAGE_INDEX);
    let Ok(text) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_json::from_str::<PackageIndex>(&text) {
        Ok(index) => index
            .files
            .into_iter()
            .map(|entry| PathBuf::from(entry.path))
            .filter(|p| check_relative(p).is_ok())
            .collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable package index: {e}");
            Vec::new()
        }
    }
}

/// Record of the moves made by a commit.
struct Journal<'a> {
    output_dir: &'a Path,
    backup: PathBuf,
    /// Paths now holding new content.
    placed: Vec<PathBuf>,
    /// Paths whose previous content sits in `backup`.
    saved: Vec<PathBuf>,
    /// Saved paths the new package does not replace.
    pruned: Vec<PathBuf>,
}

impl<'a> Journal<'a> {
    fn begin(output_dir: &'a Path) -> Result<Self, BuildError> {
        let backup = output_dir.join(BACKUP_DIR);
        if backup.exists() {
            fs::remove_dir_all(&backup).map_err(|e| BuildError::io(&backup, e))?;
        }
        Ok(Self {
            output_dir,
            backup,
            placed: Vec::new(),
            saved: Vec::new(),
            pruned: Vec::new(),
        })
    }

    /// Moves the file at `rel` into the backup directory. Directories and
    /// missing paths are left where they are.
    fn set_aside(&mut self, rel: &Path) -> Result<bool, BuildError> {
        let dest = self.output_dir.join(rel);
        match fs::symlink_metadata(&dest) {
            Ok(meta) if !meta.is_dir() => {
                let saved = self.backup.join(rel);
                if let Some(parent) = saved.parent() {
                    fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
                }
                fs::rename(&dest, &saved).map_err(|e| BuildError::io(&dest, e))?;
                self.saved.push(rel.to_path_buf());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn place(&mut self, staging: &Path, rel: &Path) -> Result<(), BuildError> {
        self.set_aside(rel)?;
        let dest = self.output_dir.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::rename(staging.join(rel), &dest).map_err(|e| BuildError::io(&dest, e))?;
        self.placed.push(rel.to_path_buf());
        tracing::debug!(path = %dest.display(), "wrote artifact");
        Ok(())
    }

    fn prune(&mut self, rel: &Path) -> Result<(), BuildError> {
        if self.set_aside(rel)? {
            tracing::debug!(path = %rel.display(), "removed stale artifact");
            self.pruned.push(rel.to_path_buf());
        }
        Ok(())
    }

    /// Drops the backups and any directories pruning left empty.
    fn finish(self) {
        let _ = fs::remove_dir_all(&self.backup);
        for rel in &self.pruned {
            let mut dir = rel.parent();
            while let Some(d) = dir.filter(|d| !d.as_os_str().is_empty()) {
                if fs::remove_dir(self.output_dir.join(d)).is_err() {
                    break;
                }
                dir = d.parent();
            }
        }
    }

    /// Removes new content and restores every backup, newest first.
    fn roll_back(self) {
        for rel in self.placed.iter().rev() {
            let _ = fs::remove_file(self.output_dir.join(rel));
        }
        for rel in self.saved.iter().rev() {
            let dest = self.output_dir.join(rel);
            if let Err(e) = fs::rename(self.backup.join(rel), &dest) {
                tracing::warn!(path = %dest.display(), "cannot restore previous artifact: {e}");
            }
        }
        tracing::debug!(
            restored = self.saved.len(),
            removed = self.placed.len(),
            "rolled back package"
        );
        let _ = fs::remove_dir_all(&self.backup);
    }
}

fn index_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))
}

fn check_relative(path: &Path) -> Result<(), BuildError> {
    let inside = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if inside && path.components().next().is_some() {
        Ok(())
    } else {
        Err(InternalError::new(format!(
            "artifact path {} escapes the output directory",
            path.display()
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> Vec<Artifact> {
        vec![
            Artifact::text("esi_system_manifest.json", "{}"),
            Artifact::text("xrt/xrt.ini", "[Runtime]\n"),
        ]
    }

    #[test]
    fn writes_files_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_package("ESIMem", &artifacts(), dir.path()).unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.total_size(), 2 + 10);
        assert_eq!(
            fs::read_to_string(dir.path().join("xrt/xrt.ini")).unwrap(),
            "[Runtime]\n"
        );
        assert!(!dir.path().join(STAGING_DIR).exists());

        let index: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join(PACKAGE_INDEX)).unwrap(),
        )
        .unwrap();
        assert_eq!(index["system"], "ESIMem");
        assert_eq!(index["files"][1]["path"], "xrt/xrt.ini");
        assert_eq!(index["files"][1]["size"], 10);
        assert_eq!(
            index["files"][1]["hash"],
            ContentHash::from_bytes(b"[Runtime]\n").to_hex()
        );
    }

    #[test]
    fn report_lookup_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_package("S", &artifacts(), dir.path()).unwrap();
        assert_eq!(report.file("esi_system_manifest.json").unwrap().size, 2);
        assert!(report.file("missing").is_none());
    }

    #[test]
    fn escaping_path_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let bad = vec![
            Artifact::text("ok.txt", "fine"),
            Artifact::text("../evil.txt", "nope"),
        ];
        let err = write_package("S", &bad, dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Internal(_)));
        assert!(!dir.path().join("ok.txt").exists());
        assert!(!dir.path().join(STAGING_DIR).exists());
    }

    #[test]
    fn repackaging_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        write_package("S", &[Artifact::text("a.txt", "one")], dir.path()).unwrap();
        write_package("S", &[Artifact::text("a.txt", "two")], dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "two");
    }

    fn read(dir: &Path, path: &str) -> String {
        fs::read_to_string(dir.join(path)).unwrap()
    }

    #[test]
    fn failed_move_restores_previous_package() {
        let dir = tempfile::tempdir().unwrap();
        let first = vec![
            Artifact::text("a.txt", "old-a"),
            Artifact::text("b/c.txt", "old-c"),
        ];
        write_package("S", &first, dir.path()).unwrap();
        let index_before = read(dir.path(), PACKAGE_INDEX);

        // A non-empty directory where b/c.txt has to go.
        fs::remove_file(dir.path().join("b/c.txt")).unwrap();
        fs::create_dir_all(dir.path().join("b/c.txt/keep")).unwrap();

        let second = vec![
            Artifact::text("a.txt", "new-a"),
            Artifact::text("b/c.txt", "new-c"),
        ];
        let err = write_package("S", &second, dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }), "{err:?}");

        assert_eq!(read(dir.path(), "a.txt"), "old-a");
        assert_eq!(read(dir.path(), PACKAGE_INDEX), index_before);
        assert!(dir.path().join("b/c.txt/keep").is_dir());
        assert!(!dir.path().join(STAGING_DIR).exists());
        assert!(!dir.path().join(BACKUP_DIR).exists());
    }

    #[test]
    fn failed_move_keeps_files_the_new_package_drops() {
        let dir = tempfile::tempdir().unwrap();
        let first = vec![
            Artifact::text("a.txt", "old-a"),
            Artifact::text("old.txt", "old"),
        ];
        write_package("S", &first, dir.path()).unwrap();
        fs::write(dir.path().join("b"), "in the way").unwrap();

        let second = vec![
            Artifact::text("a.txt", "new-a"),
            Artifact::text("b/c.txt", "new-c"),
        ];
        assert!(write_package("S", &second, dir.path()).is_err());

        assert_eq!(read(dir.path(), "a.txt"), "old-a");
        assert_eq!(read(dir.path(), "old.txt"), "old");
        assert_eq!(read(dir.path(), "b"), "in the way");
        let index: serde_json::Value =
            serde_json::from_str(&read(dir.path(), PACKAGE_INDEX)).unwrap();
        assert_eq!(index["files"][1]["path"], "old.txt");
    }

    #[test]
    fn stale_artifacts_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let cosim = vec![
            Artifact::text("esi_system_manifest.json", "{}"),
            Artifact::text("cosim/endpoints.json", "[]"),
        ];
        write_package("S", &cosim, dir.path()).unwrap();
        fs::write(dir.path().join("notes.txt"), "mine").unwrap();

        let report = write_package("S", &artifacts(), dir.path()).unwrap();
        assert_eq!(report.files.len(), 2);

        assert!(!dir.path().join("cosim/endpoints.json").exists());
        assert!(!dir.path().join("cosim").exists());
        assert!(dir.path().join("xrt/xrt.ini").is_file());
        assert_eq!(read(dir.path(), "notes.txt"), "mine");
        assert!(!dir.path().join(BACKUP_DIR).exists());
    }

    #[test]
    fn unreadable_index_prunes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("left.txt"), "left").unwrap();
        fs::write(dir.path().join(PACKAGE_INDEX), "not json").unwrap();

        write_package("S", &artifacts(), dir.path()).unwrap();
        assert_eq!(read(dir.path(), "left.txt"), "left");
        let index: serde_json::Value =
            serde_json::from_str(&read(dir.path(), PACKAGE_INDEX)).unwrap();
        assert_eq!(index["system"], "S");
    }
}
