//! The public sink: level routing, newline framing and the per-stream lock
//! that orders every write against every rotation.

use {
    crate::{
        config::{FileSinkBuilder, SinkConfig},
        error::Result,
        retention::{self, RetentionPolicy},
        rotation,
        stream::{self, Stream},
    },
    chrono::{DateTime, Utc},
    std::{
        io,
        path::{Path, PathBuf},
        sync::{Mutex, MutexGuard, PoisonError},
    },
};

/// Severity of a line handed to [`FileSink::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Which file a manual [`FileSink::roll`] or [`FileSink::path`] refers to.
///
/// Without a separate error file, `Err` is the same file as `Out`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RollTarget {
    #[default]
    Out,
    Err,
}

/// What a logger needs from a sink: one pre-serialized line per call.
///
/// Lines must not contain a newline; the sink adds the terminator.
pub trait Sink {
    fn out(&self, line: &str) -> Result<()>;
    fn err(&self, line: &str) -> Result<()>;
    fn debug(&self, line: &str) -> Result<()>;
    fn trace(&self, line: &str) -> Result<()>;
}

/// A line sink backed by a rotating log file, plus an optional separate
/// file for error lines.
///
/// Every write and rotation of a file happens under that file's lock, so
/// concurrent callers see lines land whole and in lock order, and a write
/// that arrives mid-rotation waits for the fresh file.
///
/// With a separate error file each file has its own lock. Lines in the
/// primary file and lines in the error file are not ordered relative to
/// each other.
pub struct FileSink {
    config: SinkConfig,
    out: Mutex<Stream>,
    /// `None` when error lines share `out`.
    err: Option<Mutex<Stream>>,
}

fn lock(stream: &Mutex<Stream>) -> MutexGuard<'_, Stream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FileSink {
    /// Shorthand for [`FileSinkBuilder::new`].
    pub fn builder<P: AsRef<Path>, S: Into<String>>(directory: P, name: S) -> FileSinkBuilder {
        FileSinkBuilder::new(directory, name)
    }

    pub(crate) fn open(config: SinkConfig) -> Result<FileSink> {
        config.validate()?;
        stream::create_directory(&config.directory, config.dir_permissions)?;

        let now = Utc::now();
        let out = Stream::open(&config.directory, &config.name, config.permissions, now)?;
        // An error name equal to the primary name is the primary file.
        let err = match config.error_name.as_deref().filter(|error_name| *error_name != config.name) {
            Some(error_name) => Some(Stream::open(
                &config.directory,
                error_name,
                config.permissions,
                now,
            )?),
            None => None,
        };

        let sink = FileSink {
            config,
            out: Mutex::new(out),
            err: err.map(Mutex::new),
        };
        for stream in sink.streams() {
            sink.launch(stream, now)?;
        }
        Ok(sink)
    }

    /// Roll a non-empty file if configured to, then prune its archives.
    fn launch(&self, stream: &Mutex<Stream>, now: DateTime<Utc>) -> Result<()> {
        let name = {
            let mut stream = lock(stream);
            if self.config.roll_on_launch && stream.size() > 0 {
                rotation::rotate(&mut stream, self.config.compress, now)?;
            }
            stream.name().to_string()
        };
        self.sweep(&name, now);
        Ok(())
    }

    fn streams(&self) -> impl Iterator<Item = &Mutex<Stream>> {
        std::iter::once(&self.out).chain(self.err.as_ref())
    }

    fn stream(&self, target: RollTarget) -> &Mutex<Stream> {
        match target {
            RollTarget::Out => &self.out,
            RollTarget::Err => self.err.as_ref().unwrap_or(&self.out),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Path of the active file for `target`.
    pub fn path(&self, target: RollTarget) -> PathBuf {
        lock(self.stream(target)).path().to_path_buf()
    }

    /// Write `line` plus a newline at `level`.
    ///
    /// Trace and debug lines are dropped without touching the file unless
    /// enabled. Error lines go to the error file if there is one.
    pub fn log(&self, level: Level, line: &str) -> Result<()> {
        self.log_at(level, line, Utc::now())
    }

    pub(crate) fn log_at(&self, level: Level, line: &str, now: DateTime<Utc>) -> Result<()> {
        let target = match level {
            Level::Trace if !self.config.trace => return Ok(()),
            Level::Debug if !self.config.debug => return Ok(()),
            Level::Error => RollTarget::Err,
            _ => RollTarget::Out,
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.append(self.stream(target), &buf, now)
    }

    pub fn out(&self, line: &str) -> Result<()> {
        self.log(Level::Info, line)
    }

    pub fn info(&self, line: &str) -> Result<()> {
        self.log(Level::Info, line)
    }

    pub fn warn(&self, line: &str) -> Result<()> {
        self.log(Level::Warn, line)
    }

    pub fn error(&self, line: &str) -> Result<()> {
        self.log(Level::Error, line)
    }

    pub fn debug(&self, line: &str) -> Result<()> {
        self.log(Level::Debug, line)
    }

    pub fn trace(&self, line: &str) -> Result<()> {
        self.log(Level::Trace, line)
    }

    /// Append `buf` under the stream's lock, rotating before the write if the
    /// file is already due and after it if this write made it due.
    fn append(&self, stream: &Mutex<Stream>, buf: &[u8], now: DateTime<Utc>) -> Result<()> {
        let thresholds = self.config.thresholds();
        let rolled = {
            let mut stream = lock(stream);
            stream.recover(now)?;
            let mut rolled = false;
            if stream.should_rotate(&thresholds, now) {
                rotation::rotate(&mut stream, self.config.compress, now)?;
                rolled = true;
            }
            stream.write(buf, now)?;
            if stream.should_rotate(&thresholds, now) {
                rotation::rotate(&mut stream, self.config.compress, now)?;
                rolled = true;
            }
            rolled.then(|| stream.name().to_string())
        };

        if let Some(name) = rolled {
            self.sweep(&name, now);
        }
        Ok(())
    }

    /// Rotate `target` now, returning the path of the new archive.
    pub fn roll(&self, target: RollTarget) -> Result<PathBuf> {
        let now = Utc::now();
        let (archive, name) = {
            let mut stream = lock(self.stream(target));
            let archive = rotation::rotate(&mut stream, self.config.compress, now)?;
            (archive, stream.name().to_string())
        };
        self.sweep(&name, now);
        Ok(archive)
    }

    /// Wait for any in-flight write or rotation, then flush every file.
    pub fn flush(&self) -> Result<()> {
        for stream in self.streams() {
            lock(stream).flush()?;
        }
        Ok(())
    }

    fn sweep(&self, name: &str, now: DateTime<Utc>) {
        let policy = RetentionPolicy {
            max_backups: self.config.max_backups,
            max_age_days: self.config.max_age,
        };
        if let Err(err) = retention::sweep(&self.config.directory, name, &policy, now) {
            tracing::warn!(
                directory = %self.config.directory.display(),
                name,
                error = %err,
                "failed to sweep log archives"
            );
        }
    }
}

impl Sink for FileSink {
    fn out(&self, line: &str) -> Result<()> {
        self.log(Level::Info, line)
    }

    fn err(&self, line: &str) -> Result<()> {
        self.log(Level::Error, line)
    }

    fn debug(&self, line: &str) -> Result<()> {
        self.log(Level::Debug, line)
    }

    fn trace(&self, line: &str) -> Result<()> {
        self.log(Level::Trace, line)
    }
}

/// Raw bytes to the primary file, unframed, with the usual rotation checks.
/// Lets the sink back writers such as `tracing_appender::non_blocking`.
impl io::Write for &FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(&self.out, buf, Utc::now())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        FileSink::flush(*self).map_err(io::Error::from)
    }
}

impl io::Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sink: &FileSink = self;
        sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileSink::flush(self).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::Duration,
        std::{fs, io::Write as _},
        tempfile::TempDir,
    };

    fn archives(dir: &Path, name: &str) -> Vec<PathBuf> {
        retention::list_archives(dir, name)
            .unwrap()
            .into_iter()
            .map(|a| a.path)
            .collect()
    }

    #[test]
    fn test_lines_are_newline_framed() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app").build().unwrap();

        sink.out(r#"{"msg":"one"}"#).unwrap();
        sink.warn(r#"{"msg":"two"}"#).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(temp_dir.path().join("app.log")).unwrap();
        assert_eq!(content, "{\"msg\":\"one\"}\n{\"msg\":\"two\"}\n");
    }

    #[test]
    fn test_debug_and_trace_are_gated() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app").build().unwrap();
        sink.debug("hidden").unwrap();
        sink.trace("hidden").unwrap();
        assert_eq!(fs::metadata(sink.path(RollTarget::Out)).unwrap().len(), 0);

        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app")
            .debug(true)
            .trace(true)
            .build()
            .unwrap();
        sink.debug("d").unwrap();
        sink.trace("t").unwrap();
        assert_eq!(fs::read_to_string(sink.path(RollTarget::Out)).unwrap(), "d\nt\n");
    }

    #[test]
    fn test_errors_share_primary_file_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app").build().unwrap();
        assert_eq!(sink.path(RollTarget::Out), sink.path(RollTarget::Err));

        sink.out("a").unwrap();
        Sink::err(&sink, "b").unwrap();
        sink.out("c").unwrap();

        assert_eq!(fs::read_to_string(sink.path(RollTarget::Out)).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_error_name_equal_to_name_shares_the_primary_stream() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app")
            .error_name("app")
            .max_size(5)
            .compression(crate::Compression::None)
            .build()
            .unwrap();
        assert_eq!(sink.path(RollTarget::Out), sink.path(RollTarget::Err));

        let chunk = "x".repeat(1024 * 1024 - 1);
        for _ in 0..3 {
            sink.out(&chunk).unwrap();
        }
        for _ in 0..3 {
            sink.error(&chunk).unwrap();
        }

        let rolled = archives(temp_dir.path(), "app");
        assert_eq!(rolled.len(), 1);
        assert_eq!(fs::metadata(&rolled[0]).unwrap().len(), 6 * 1024 * 1024);
        assert_eq!(fs::metadata(temp_dir.path().join("app.log")).unwrap().len(), 0);
    }

    #[test]
    fn test_separate_error_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app")
            .error_name("app-error")
            .build()
            .unwrap();

        sink.out("normal").unwrap();
        sink.error("broken").unwrap();

        assert_eq!(fs::read_to_string(temp_dir.path().join("app.log")).unwrap(), "normal\n");
        assert_eq!(fs::read_to_string(temp_dir.path().join("app-error.log")).unwrap(), "broken\n");
    }

    #[test]
    fn test_roll_targets_the_selected_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app")
            .error_name("app-error")
            .compression(crate::Compression::None)
            .build()
            .unwrap();
        sink.out("normal").unwrap();
        sink.error("broken").unwrap();

        let archive = sink.roll(RollTarget::Err).unwrap();

        assert_eq!(fs::read_to_string(&archive).unwrap(), "broken\n");
        assert_eq!(archives(temp_dir.path(), "app-error"), vec![archive]);
        assert!(archives(temp_dir.path(), "app").is_empty());
        assert_eq!(fs::read_to_string(temp_dir.path().join("app.log")).unwrap(), "normal\n");
        assert_eq!(fs::read_to_string(temp_dir.path().join("app-error.log")).unwrap(), "");
    }

    #[test]
    fn test_day_change_rolls_before_the_first_line_of_the_new_day() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app")
            .roll_every_day(true)
            .compression(crate::Compression::None)
            .build()
            .unwrap();
        let today = Utc::now();
        let tomorrow = today + Duration::days(1);

        sink.log_at(Level::Info, "today", today).unwrap();
        sink.log_at(Level::Info, "tomorrow", tomorrow).unwrap();

        let rolled = archives(temp_dir.path(), "app");
        assert_eq!(rolled.len(), 1);
        assert_eq!(fs::read_to_string(&rolled[0]).unwrap(), "today\n");
        assert_eq!(fs::read_to_string(sink.path(RollTarget::Out)).unwrap(), "tomorrow\n");
    }

    #[test]
    fn test_io_write_is_unframed() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app").build().unwrap();

        write!(&sink, "partial ").unwrap();
        writeln!(&sink, "line").unwrap();
        (&sink).flush().unwrap();

        assert_eq!(fs::read_to_string(sink.path(RollTarget::Out)).unwrap(), "partial line\n");
    }

    #[test]
    fn test_flush_waits_for_concurrent_writers() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileSink::builder(temp_dir.path(), "app").build().unwrap();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let sink = &sink;
                scope.spawn(move || {
                    for i in 0..250 {
                        sink.out(&format!("thread={t} i={i:04}")).unwrap();
                    }
                });
            }
        });
        sink.flush().unwrap();

        let content = fs::read_to_string(sink.path(RollTarget::Out)).unwrap();
        assert_eq!(content.lines().count(), 1000);
        assert!(content.lines().all(|l| l.starts_with("thread=") && l.len() == "thread=0 i=0000".len()));
    }
}
