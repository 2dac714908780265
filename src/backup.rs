use crate::{
    error::{HelperError, HelperResult},
    log::ActivityLog,
};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use time::{
    format_description::FormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use walkdir::WalkDir;

/// `YYYY.MM.DD-HH.MM.SS.ffffff`. Fixed width, so name order is creation order.
const SNAPSHOT_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year].[month].[day]-[hour].[minute].[second].[subsecond digits:6]"
);
const SNAPSHOT_NAME_LEN: usize = 26;
const CREATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub path: PathBuf,
}

impl Snapshot {
    pub fn file_count(&self) -> HelperResult<usize> {
        Ok(regular_files(&self.path)?.len())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevertReport {
    pub snapshot: String,
    pub removed: usize,
    pub restored: usize,
}

pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies every file currently in `mods_dir` into a new snapshot.
    pub fn create_snapshot(
        &self,
        mods_dir: &Path,
        log: &mut ActivityLog,
    ) -> HelperResult<Snapshot> {
        let files = regular_files(mods_dir)?;
        fs::create_dir_all(&self.root).map_err(|err| HelperError::io("create", &self.root, err))?;
        let snapshot = self.allocate_snapshot()?;

        for file in &files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = snapshot.path.join(name);
            fs::copy(file, &target).map_err(|err| HelperError::io("copy", file, err))?;
        }

        log.log_info(format!(
            "Backup completed! ({}, {} file(s))",
            snapshot.name,
            files.len()
        ));
        Ok(snapshot)
    }

    /// Snapshots under the root, oldest first. Entries whose names are not
    /// snapshot timestamps are ignored.
    pub fn list_snapshots(&self) -> HelperResult<Vec<Snapshot>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| HelperError::io("read", &self.root, err.into()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_snapshot_name(&name) {
                continue;
            }
            snapshots.push(Snapshot {
                name,
                path: entry.into_path(),
            });
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }

    pub fn latest(&self) -> HelperResult<Option<Snapshot>> {
        Ok(self.list_snapshots()?.pop())
    }

    /// Replaces the contents of `mods_dir` with the newest snapshot and
    /// consumes it. Not atomic: an interruption can leave both sides partial.
    pub fn revert_to_latest(
        &self,
        mods_dir: &Path,
        log: &mut ActivityLog,
    ) -> HelperResult<RevertReport> {
        let Some(snapshot) = self.latest()? else {
            log.log_error(HelperError::NoBackups.to_string());
            return Err(HelperError::NoBackups);
        };

        fs::create_dir_all(mods_dir).map_err(|err| HelperError::io("create", mods_dir, err))?;
        let current = regular_files(mods_dir)?;
        for file in &current {
            fs::remove_file(file).map_err(|err| HelperError::io("remove", file, err))?;
        }

        let saved = regular_files(&snapshot.path)?;
        for file in &saved {
            let Some(name) = file.file_name() else {
                continue;
            };
            move_file(file, &mods_dir.join(name))?;
        }
        fs::remove_dir_all(&snapshot.path)
            .map_err(|err| HelperError::io("remove", &snapshot.path, err))?;

        log.log_info(format!(
            "Mods reverted to the latest backup! ({})",
            snapshot.name
        ));
        Ok(RevertReport {
            snapshot: snapshot.name,
            removed: current.len(),
            restored: saved.len(),
        })
    }

    fn allocate_snapshot(&self) -> HelperResult<Snapshot> {
        let mut last_err = None;
        for _ in 0..CREATE_ATTEMPTS {
            let name = snapshot_name(now_utc());
            let path = self.root.join(&name);
            match fs::create_dir(&path) {
                Ok(()) => return Ok(Snapshot { name, path }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(std::time::Duration::from_micros(10));
                    last_err = Some(err);
                }
                Err(err) => return Err(HelperError::io("create", &path, err)),
            }
        }
        let err = last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "snapshot exists"));
        Err(HelperError::io("create", &self.root, err))
    }
}

fn now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub fn snapshot_name(at: PrimitiveDateTime) -> String {
    at.format(SNAPSHOT_FORMAT)
        .unwrap_or_else(|_| at.assume_utc().unix_timestamp().to_string())
}

pub fn is_snapshot_name(name: &str) -> bool {
    name.len() == SNAPSHOT_NAME_LEN
        && name.starts_with(|ch: char| ch.is_ascii_digit())
        && PrimitiveDateTime::parse(name, SNAPSHOT_FORMAT).is_ok()
}

/// Regular files directly inside `dir`, sorted by name. Subdirectories are
/// left alone.
pub(crate) fn regular_files(dir: &Path) -> HelperResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| HelperError::io("read", dir, err.into()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn move_file(from: &Path, to: &Path) -> HelperResult<()> {
    fs::rename(from, to)
        .or_else(|_| fs::copy(from, to).and_then(|_| fs::remove_file(from)))
        .map_err(|err| HelperError::io("move", from, err))
}
