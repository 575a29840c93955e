//! Retention sweep over a stream's archives.
//!
//! Archives are recognised by name alone: `<name>-<timestamp>.log` with an
//! optional `.gz`. Anything else in the directory, including the active
//! `<name>.log` and archives of other streams whose name merely starts with
//! `<name>-`, is ignored.

use {
    crate::config::{FILE_EXT, GZIP_EXT},
    chrono::{DateTime, Duration, NaiveDateTime, Utc},
    regex::Regex,
    std::{
        fs, io,
        path::{Path, PathBuf},
    },
};

/// A rotated copy of a log file, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: PathBuf,
    /// Rotation time parsed back out of the file name.
    pub timestamp: DateTime<Utc>,
    pub compressed: bool,
}

/// Limits applied by [`sweep`]. A zero disables the corresponding limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many of the newest archives.
    pub max_backups: usize,
    /// Delete archives older than this many days.
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn is_disabled(&self) -> bool {
        self.max_backups == 0 && self.max_age_days == 0
    }
}

/// Outcome of one sweep. Failed deletions stay on disk for the next sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

/// Accepts the rotation timestamp with any (or no) fractional seconds.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.f";

fn archive_pattern(name: &str) -> Regex {
    let pattern = format!(
        r"^{}-(\d{{4}}-\d{{2}}-\d{{2}}T\d{{2}}-\d{{2}}-\d{{2}}(?:\.\d+)?)\.{FILE_EXT}(\.{GZIP_EXT})?$",
        regex::escape(name)
    );
    // The name is escaped, so the pattern is always well-formed.
    Regex::new(&pattern).unwrap_or_else(|err| unreachable!("invalid archive pattern: {err}"))
}

/// Parse an archive file name belonging to `name`.
///
/// Returns `None` for anything that is not an archive of `name`, including
/// names whose timestamp has the right shape but is not a real date.
pub fn parse_archive_name(name: &str, file_name: &str) -> Option<(DateTime<Utc>, bool)> {
    parse_with(&archive_pattern(name), file_name)
}

fn parse_with(pattern: &Regex, file_name: &str) -> Option<(DateTime<Utc>, bool)> {
    let captures = pattern.captures(file_name)?;
    let timestamp = NaiveDateTime::parse_from_str(captures.get(1)?.as_str(), TIMESTAMP_PARSE_FORMAT)
        .ok()?
        .and_utc();
    Some((timestamp, captures.get(2).is_some()))
}

/// All archives of `name` in `directory`, oldest first.
pub fn list_archives(directory: &Path, name: &str) -> io::Result<Vec<ArchiveFile>> {
    let pattern = archive_pattern(name);
    let mut archives = Vec::new();

    for entry in fs::read_dir(directory)?.flatten() {
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Some((timestamp, compressed)) = parse_with(&pattern, &file_name) else {
            continue;
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        archives.push(ArchiveFile {
            path: entry.path(),
            timestamp,
            compressed,
        });
    }

    archives.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    Ok(archives)
}

/// Pick from `archives` (oldest first) the ones the policy deletes at `now`.
///
/// The count limit drops all but the newest `max_backups`; the age limit then
/// drops any survivor strictly older than `now - max_age_days`.
pub fn expired(mut archives: Vec<ArchiveFile>, policy: &RetentionPolicy, now: DateTime<Utc>) -> Vec<ArchiveFile> {
    let mut remove = Vec::new();

    if policy.max_backups > 0 && archives.len() > policy.max_backups {
        let excess = archives.len() - policy.max_backups;
        remove.extend(archives.drain(..excess));
    }

    if policy.max_age_days > 0 {
        let cutoff = now - Duration::days(i64::from(policy.max_age_days));
        remove.extend(archives.into_iter().filter(|archive| archive.timestamp < cutoff));
    }

    remove
}

/// Delete the archives of `name` in `directory` that `policy` rejects.
///
/// Every deletion is attempted even if an earlier one fails. Only a failure to
/// list the directory is returned as an error.
pub fn sweep(directory: &Path, name: &str, policy: &RetentionPolicy, now: DateTime<Utc>) -> io::Result<SweepReport> {
    if policy.is_disabled() {
        return Ok(SweepReport::default());
    }

    Ok(remove_archives(expired(list_archives(directory, name)?, policy, now)))
}

/// Delete each archive, carrying on past failures.
fn remove_archives(archives: Vec<ArchiveFile>) -> SweepReport {
    let mut report = SweepReport::default();
    for archive in archives {
        match fs::remove_file(&archive.path) {
            Ok(()) => {
                tracing::debug!(path = %archive.path.display(), "removed old log archive");
                report.removed.push(archive.path);
            }
            Err(err) => {
                tracing::warn!(path = %archive.path.display(), error = %err, "failed to remove old log archive");
                report.failed.push((archive.path, err));
            }
        }
    }
    report
}
