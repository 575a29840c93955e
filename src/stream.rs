//! The active log file: one append-mode handle plus the bookkeeping the
//! rotation decision needs.
//!
//! A [`Stream`] is only ever touched while its owner's lock is held, so its
//! counters are plain fields.

use {
    crate::{
        config::{active_path, Thresholds},
        error::{Result, SinkError},
    },
    chrono::{DateTime, Utc},
    std::{
        fs::{self, DirBuilder, OpenOptions},
        io::{self, Write as _},
        path::{Path, PathBuf},
    },
};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

pub(crate) struct Stream {
    /// Base name, shared with this stream's archives.
    name: String,
    path: PathBuf,
    /// `None` while closed, i.e. mid-rotation or after a failed one.
    handle: Option<fs::File>,
    /// Bytes in the file at `path`.
    size: u64,
    last_write: DateTime<Utc>,
    /// Timestamp of the newest archive this stream produced.
    last_archived: Option<DateTime<Utc>>,
    /// Set while a reset is outstanding: what is at `path` is already
    /// archived and must be truncated, not appended to.
    archived_pending_reset: bool,
    mode: u32,
}

impl Stream {
    /// Open (creating if needed) `<directory>/<name>.log` in append mode.
    ///
    /// The initial size and last write time come from the file on disk; a
    /// missing file counts as empty and last written `now`.
    pub(crate) fn open(directory: &Path, name: &str, mode: u32, now: DateTime<Utc>) -> Result<Stream> {
        let path = active_path(directory, name);
        let handle = open_append(&path, mode)?;
        let (size, last_write) = match fs::metadata(&path) {
            Ok(metadata) => (
                metadata.len(),
                metadata.modified().map(DateTime::<Utc>::from).unwrap_or(now),
            ),
            Err(err) if err.kind() == io::ErrorKind::NotFound => (0, now),
            Err(err) => return Err(SinkError::FileIOError(err)),
        };

        Ok(Stream {
            name: name.to_string(),
            path,
            handle: Some(handle),
            size,
            last_write,
            last_archived: None,
            archived_pending_reset: false,
            mode,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn mode(&self) -> u32 {
        self.mode
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn last_archived(&self) -> Option<DateTime<Utc>> {
        self.last_archived
    }

    pub(crate) fn set_last_archived(&mut self, timestamp: DateTime<Utc>) {
        self.last_archived = Some(timestamp);
    }

    pub(crate) fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Reopen a stream left closed by a failed rotation.
    ///
    /// If the copy failed the file is reopened as is. If the copy succeeded
    /// but the reset did not, the reset is retried so archived bytes are not
    /// archived again.
    pub(crate) fn recover(&mut self, now: DateTime<Utc>) -> Result<()> {
        match (self.is_open(), self.archived_pending_reset) {
            (true, _) => Ok(()),
            (false, true) => self.reset(now),
            (false, false) => self.reopen(),
        }
    }

    /// Append `buf`, counting it only once the write has succeeded.
    ///
    /// After a failed or partial write the size is re-read from disk.
    pub(crate) fn write(&mut self, buf: &[u8], now: DateTime<Utc>) -> Result<()> {
        self.recover(now)?;
        if let Some(handle) = self.handle.as_mut() {
            if let Err(err) = handle.write_all(buf) {
                if let Ok(metadata) = handle.metadata() {
                    self.size = metadata.len();
                }
                return Err(err.into());
            }
        }
        self.size += buf.len() as u64;
        self.last_write = now;
        Ok(())
    }

    /// Whether the file is past its size limit or was last written on an
    /// earlier UTC day than `now`.
    pub(crate) fn should_rotate(&self, thresholds: &Thresholds, now: DateTime<Utc>) -> bool {
        let oversize = thresholds.max_size_bytes > 0 && self.size > thresholds.max_size_bytes;
        let new_day = thresholds.roll_every_day && self.last_write.date_naive() != now.date_naive();
        oversize || new_day
    }

    /// Flush and drop the handle. Closing a closed stream is a no-op.
    pub(crate) fn close(&mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(mut handle) => handle.flush(),
            None => Ok(()),
        }
    }

    /// Replace the file at `path` with an empty one and reopen it.
    ///
    /// Until this succeeds the stream stays closed and [`Stream::recover`]
    /// retries it.
    pub(crate) fn reset(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.archived_pending_reset = true;
        self.close()?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        apply_mode(&mut options, self.mode);
        options
            .open(&self.path)
            .map_err(|err| SinkError::CreateFileFailed(self.path.clone(), err.to_string()))?;

        self.handle = Some(open_append(&self.path, self.mode)?);
        self.size = 0;
        self.last_write = now;
        self.archived_pending_reset = false;
        Ok(())
    }

    /// Reopen a closed stream without discarding what is on disk.
    pub(crate) fn reopen(&mut self) -> Result<()> {
        self.close()?;
        let handle = open_append(&self.path, self.mode)?;
        self.size = handle.metadata()?.len();
        self.handle = Some(handle);
        tracing::debug!(path = %self.path.display(), size = self.size, "reopened log file");
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match self.handle.as_mut() {
            Some(handle) => handle.flush(),
            None => Ok(()),
        }
    }
}

/// Create `path` and its missing parents with `mode` (Unix only).
pub(crate) fn create_directory(path: &Path, mode: u32) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder
        .create(path)
        .map_err(|err| SinkError::CreateDirectoryFailed(path.to_path_buf(), err.to_string()))
}

pub(crate) fn apply_mode(options: &mut OpenOptions, mode: u32) {
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = (options, mode);
}

/// Open `log_path` for appending, creating the file and then its directory if
/// the first attempt fails.
fn open_append(log_path: &Path, mode: u32) -> Result<fs::File> {
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    apply_mode(&mut options, mode);

    let mut opened = options.open(log_path);
    if opened.is_err() {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| SinkError::CreateDirectoryFailed(parent.to_path_buf(), err.to_string()))?;
            opened = options.open(log_path);
        }
    }

    opened.map_err(|err| SinkError::CreateFileFailed(log_path.to_path_buf(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, tempfile::TempDir};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn thresholds(max_size_bytes: u64, roll_every_day: bool) -> Thresholds {
        Thresholds {
            max_size_bytes,
            roll_every_day,
        }
    }

    #[test]
    fn test_open_creates_missing_file_and_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("logs");
        let stream = Stream::open(&dir, "app", 0o644, Utc::now()).unwrap();

        assert_eq!(stream.path(), dir.join("app.log"));
        assert!(stream.path().is_file());
        assert_eq!(stream.size(), 0);
        assert!(stream.is_open());
    }

    #[test]
    fn test_open_reads_existing_size() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("app.log"), b"0123456789").unwrap();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, Utc::now()).unwrap();
        assert_eq!(stream.size(), 10);

        stream.write(b"abc\n", Utc::now()).unwrap();
        assert_eq!(stream.size(), 14);
        assert_eq!(fs::read(stream.path()).unwrap(), b"0123456789abc\n");
    }

    #[test]
    fn test_should_rotate_on_size_is_strict() {
        let temp_dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, now).unwrap();

        stream.write(&[b'x'; 16], now).unwrap();
        assert!(!stream.should_rotate(&thresholds(16, false), now));
        assert!(!stream.should_rotate(&thresholds(0, false), now));

        stream.write(b"y", now).unwrap();
        assert!(stream.should_rotate(&thresholds(16, false), now));
    }

    #[test]
    fn test_should_rotate_on_utc_day_change() {
        let temp_dir = TempDir::new().unwrap();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, at(2026, 3, 1, 10)).unwrap();
        stream.write(b"line\n", at(2026, 3, 1, 23)).unwrap();

        assert!(!stream.should_rotate(&thresholds(0, true), at(2026, 3, 1, 23)));
        assert!(stream.should_rotate(&thresholds(0, true), at(2026, 3, 2, 0)));
        assert!(!stream.should_rotate(&thresholds(0, false), at(2026, 3, 2, 0)));
    }

    #[test]
    fn test_reset_truncates_and_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, Utc::now()).unwrap();
        stream.write(b"before\n", Utc::now()).unwrap();

        stream.reset(Utc::now()).unwrap();
        assert_eq!(stream.size(), 0);
        assert!(stream.is_open());
        assert_eq!(fs::read(stream.path()).unwrap(), b"");

        stream.write(b"after\n", Utc::now()).unwrap();
        assert_eq!(fs::read(stream.path()).unwrap(), b"after\n");
    }

    #[test]
    fn test_write_reopens_closed_stream() {
        let temp_dir = TempDir::new().unwrap();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, Utc::now()).unwrap();
        stream.write(b"one\n", Utc::now()).unwrap();
        stream.close().unwrap();
        assert!(!stream.is_open());

        stream.write(b"two\n", Utc::now()).unwrap();
        assert!(stream.is_open());
        assert_eq!(stream.size(), 8);
        assert_eq!(fs::read(stream.path()).unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn test_failed_reset_is_retried_before_the_next_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, Utc::now()).unwrap();
        stream.write(b"archived\n", Utc::now()).unwrap();

        // A directory in the file's place makes the truncating open fail.
        fs::remove_file(stream.path()).unwrap();
        fs::create_dir(stream.path()).unwrap();
        assert!(stream.reset(Utc::now()).is_err());
        assert!(!stream.is_open());

        fs::remove_dir(stream.path()).unwrap();
        fs::write(stream.path(), b"archived\n").unwrap();
        stream.write(b"fresh\n", Utc::now()).unwrap();

        assert_eq!(fs::read(stream.path()).unwrap(), b"fresh\n");
        assert_eq!(stream.size(), 6);
    }

    #[test]
    fn test_failed_write_resyncs_size_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let mut stream = Stream::open(temp_dir.path(), "app", 0o644, Utc::now()).unwrap();
        stream.write(b"abc\n", Utc::now()).unwrap();
        stream.size = 999;
        stream.handle = Some(fs::File::open(stream.path()).unwrap());

        assert!(stream.write(b"lost\n", Utc::now()).is_err());
        assert_eq!(stream.size(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_uses_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let stream = Stream::open(temp_dir.path(), "app", 0o600, Utc::now()).unwrap();
        let mode = fs::metadata(stream.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
