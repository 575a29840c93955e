//! Rotation: copy the active file into a timestamped, optionally gzipped
//! archive, then start the active file over.
//!
//! The active path is never renamed or truncated in place before the copy is
//! complete; a reader following it keeps seeing the same file.

use {
    crate::{
        config::{Compression, FILE_EXT, GZIP_EXT},
        error::{Result, SinkError},
        stream::{apply_mode, Stream},
    },
    chrono::{DateTime, Duration, Utc},
    flate2::write::GzEncoder,
    std::{
        fs::{self, OpenOptions},
        io::{self, BufWriter, Read as _, Write},
        path::{Path, PathBuf},
    },
};

/// `strftime` pattern of the timestamp embedded in archive names. Sorts
/// lexicographically and contains no `:`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// File name of the archive for `name` rotated at `timestamp`.
pub fn archive_file_name(name: &str, compression: Compression, timestamp: DateTime<Utc>) -> String {
    let mut file_name = format!("{name}-{}.{FILE_EXT}", timestamp.format(TIMESTAMP_FORMAT));
    if compression.is_enabled() {
        file_name.push('.');
        file_name.push_str(GZIP_EXT);
    }
    file_name
}

/// First free archive slot at or after `earliest`, stepping one millisecond at
/// a time so two rotations within the same millisecond both get a name.
fn next_archive_path(
    directory: &Path,
    name: &str,
    compression: Compression,
    earliest: DateTime<Utc>,
) -> (PathBuf, DateTime<Utc>) {
    let mut timestamp = earliest;
    loop {
        let path = directory.join(archive_file_name(name, compression, timestamp));
        if !path.exists() {
            return (path, timestamp);
        }
        timestamp += Duration::milliseconds(1);
    }
}

/// Destination of an archive copy, with or without a gzip stage.
enum ArchiveWriter {
    Plain(BufWriter<fs::File>),
    Gzip(GzEncoder<BufWriter<fs::File>>),
}

impl ArchiveWriter {
    fn create(path: &Path, compression: Compression, mode: u32) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        apply_mode(&mut options, mode);
        let file = BufWriter::new(options.open(path)?);

        Ok(match compression.codec_level() {
            Some(level) => ArchiveWriter::Gzip(GzEncoder::new(file, level)),
            None => ArchiveWriter::Plain(file),
        })
    }

    /// Write the gzip trailer (if any), flush and sync. The archive is only
    /// complete once this returns `Ok`.
    fn finish(self) -> io::Result<()> {
        let buffered = match self {
            ArchiveWriter::Plain(buffered) => buffered,
            ArchiveWriter::Gzip(encoder) => encoder.finish()?,
        };
        let file = buffered.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveWriter::Plain(w) => w.write(buf),
            ArchiveWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveWriter::Plain(w) => w.flush(),
            ArchiveWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Copy every byte of `source` into a new archive at `target`, returning the
/// number of uncompressed bytes copied.
fn copy_to_archive(source: &Path, target: &Path, compression: Compression, mode: u32) -> io::Result<u64> {
    let mut reader = fs::File::open(source)?;
    let mut writer = ArchiveWriter::create(target, compression, mode)?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
    }

    writer.finish()?;
    Ok(copied)
}

/// Archive the stream's current content and reset it to an empty file.
///
/// On failure the partial archive is removed and the stream stays closed; the
/// active file still holds everything written so far.
pub(crate) fn rotate(stream: &mut Stream, compression: Compression, now: DateTime<Utc>) -> Result<PathBuf> {
    stream.recover(now)?;
    let directory = stream.path().parent().map(Path::to_path_buf).unwrap_or_default();
    // Names must keep increasing even if a sweep freed an earlier slot.
    let earliest = match stream.last_archived() {
        Some(last) => now.max(last + Duration::milliseconds(1)),
        None => now,
    };
    let (archive, timestamp) = next_archive_path(&directory, stream.name(), compression, earliest);

    stream.close()?;

    match copy_to_archive(stream.path(), &archive, compression, stream.mode()) {
        Ok(copied) => {
            tracing::debug!(
                from = %stream.path().display(),
                to = %archive.display(),
                bytes = copied,
                "rotated log file"
            );
        }
        Err(error) => {
            if archive.exists() {
                if let Err(err) = fs::remove_file(&archive) {
                    tracing::warn!(path = %archive.display(), error = %err, "failed to remove partial archive");
                }
            }
            tracing::error!(from = %stream.path().display(), error = %error, "log rotation failed");
            return Err(SinkError::ArchiveFailed {
                from: stream.path().to_path_buf(),
                to: archive,
                error,
            });
        }
    }

    stream.set_last_archived(timestamp);
    stream.reset(now)?;
    Ok(archive)
}
