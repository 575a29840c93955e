//! # logsink
//!
//! logsink is a file sink for line-oriented structured logs. Each call hands
//! it one already-serialized line; the sink appends it with a trailing
//! newline to `<directory>/<name>.log`, rotates the file once it grows past a
//! size limit or the UTC day changes, copies the rotated content into a
//! timestamped (and by default gzip-compressed) archive, and prunes old
//! archives by count or age. Error lines can optionally go to a separate file
//! with its own rotation.
//!
//! Every write and rotation of a file runs under that file's lock, so
//! concurrent writers never interleave partial lines or lose bytes across a
//! rotation.
//!
//! ## Layout
//!
//! ```text
//! logs/
//! ├── app.log                                 active file
//! ├── app-2026-10-16T23-59-58.120.log.gz      archives, oldest first
//! └── app-2026-10-17T08-05-09.042.log.gz
//! ```
//!
//! ## Example
//!
//! ```rust
//! use logsink::{Compression, FileSinkBuilder, RollTarget};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = tempfile::tempdir()?;
//!     let sink = FileSinkBuilder::new(dir.path(), "app")
//!         .max_size(10) // MiB
//!         .max_backups(3)
//!         .roll_every_day(true)
//!         .compression(Compression::Gzip)
//!         .build()?;
//!
//!     sink.out(r#"{"level":"info","msg":"server started"}"#)?;
//!     sink.error(r#"{"level":"error","msg":"upstream timed out"}"#)?;
//!     sink.debug("dropped: debug lines are off by default")?;
//!
//!     let archive = sink.roll(RollTarget::Out)?;
//!     assert!(archive.to_string_lossy().ends_with(".log.gz"));
//!     sink.flush()?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod retention;
mod rotation;
mod sink;
mod stream;

pub use {
    config::{Compression, FileSinkBuilder, SinkConfig, FILE_EXT, GZIP_EXT, MIN_MAX_SIZE_MIB},
    error::{Result, SinkError},
    retention::{ArchiveFile, RetentionPolicy, SweepReport},
    rotation::{archive_file_name, TIMESTAMP_FORMAT},
    sink::{FileSink, Level, RollTarget, Sink},
};
