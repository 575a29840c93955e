//! Sink configuration, validation and the fluent builder.

use {
    crate::{
        error::{Result, SinkError},
        sink::FileSink,
    },
    serde::Deserialize,
    std::path::{Path, PathBuf},
};

/// Extension of the active log file and of every archive.
pub const FILE_EXT: &str = "log";
/// Extension appended to archives when compression is enabled.
pub const GZIP_EXT: &str = "gz";

const MIB: u64 = 1024 * 1024;
/// Smallest non-zero `max_size`, in MiB.
pub const MIN_MAX_SIZE_MIB: u64 = 5;

/// Compression applied to rotated archives.
///
/// In a config file this is written either as a boolean (`true` selects gzip
/// with the codec's default level) or as an integer gzip level from 1 to 9.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "CompressSetting")]
pub enum Compression {
    /// Archives are plain copies of the rotated file.
    None,
    /// Gzip with the codec's default level.
    #[default]
    Gzip,
    /// Gzip with an explicit level (1 = fastest, 9 = smallest).
    GzipLevel(u32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompressSetting {
    Enabled(bool),
    Level(u32),
}

impl From<CompressSetting> for Compression {
    fn from(setting: CompressSetting) -> Self {
        match setting {
            CompressSetting::Enabled(true) => Compression::Gzip,
            CompressSetting::Enabled(false) => Compression::None,
            CompressSetting::Level(level) => Compression::GzipLevel(level),
        }
    }
}

impl Compression {
    /// Whether archives are gzip-compressed.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Compression::None)
    }

    /// The codec level to use, or `None` when compression is off.
    pub(crate) fn codec_level(&self) -> Option<flate2::Compression> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some(flate2::Compression::default()),
            Compression::GzipLevel(level) => Some(flate2::Compression::new(*level)),
        }
    }
}

/// Configuration of a [`FileSink`].
///
/// Deserializes from camelCase keys; every key is optional, but `directory`
/// and `name` must end up non-empty for [`FileSinkBuilder::build`] to succeed.
///
/// ```
/// let config: logsink::SinkConfig = serde_json::from_str(
///     r#"{ "directory": "./logs", "name": "app", "maxBackups": 3, "compress": 6 }"#,
/// )
/// .unwrap();
/// assert_eq!(config.compress, logsink::Compression::GzipLevel(6));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SinkConfig {
    /// Directory holding the active files and their archives.
    pub directory: PathBuf,
    /// Base name of the primary log file (`<name>.log`).
    pub name: String,
    /// Base name of a separate error log file. When absent, error lines go to
    /// the primary file.
    pub error_name: Option<String>,
    /// Mode bits for newly created log files and archives (Unix only).
    pub permissions: u32,
    /// Mode bits for the log directory if it has to be created (Unix only).
    pub dir_permissions: u32,
    /// Persist debug-level lines.
    pub debug: bool,
    /// Persist trace-level lines.
    pub trace: bool,
    /// Size in MiB past which the active file is rotated. `0` disables.
    pub max_size: u64,
    /// Archives older than this many days are deleted. `0` disables.
    pub max_age: u32,
    /// Number of archives to keep. `0` disables.
    pub max_backups: usize,
    /// Rotate when the UTC date changes between two writes.
    pub roll_every_day: bool,
    /// Rotate a non-empty existing file when the sink is built.
    pub roll_on_launch: bool,
    /// Archive compression.
    pub compress: Compression,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            directory: PathBuf::new(),
            name: String::new(),
            error_name: None,
            permissions: 0o644,
            dir_permissions: 0o755,
            debug: false,
            trace: false,
            max_size: 100,
            max_age: 0,
            max_backups: 0,
            roll_every_day: false,
            roll_on_launch: false,
            compress: Compression::default(),
        }
    }
}

/// The subset of the configuration a stream consults after each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Thresholds {
    /// `0` disables size-based rotation.
    pub max_size_bytes: u64,
    pub roll_every_day: bool,
}

impl SinkConfig {
    /// Check every option, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(SinkError::EmptyDirectory);
        }
        if self.name.is_empty() || self.error_name.as_deref() == Some("") {
            return Err(SinkError::EmptyName);
        }
        if self.max_size != 0 && self.max_size < MIN_MAX_SIZE_MIB {
            return Err(SinkError::InvalidMaxSize(self.max_size));
        }
        if let Compression::GzipLevel(level) = self.compress {
            if !(1..=9).contains(&level) {
                return Err(SinkError::InvalidCompressionLevel(level));
            }
        }
        Ok(())
    }

    pub(crate) fn thresholds(&self) -> Thresholds {
        Thresholds {
            max_size_bytes: self.max_size.saturating_mul(MIB),
            roll_every_day: self.roll_every_day,
        }
    }
}

/// Path of the active file for a stream name.
pub(crate) fn active_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{name}.{FILE_EXT}"))
}

/// Provides a fluent interface for configuring [`FileSink`] instances.
///
/// # Examples
///
/// ```no_run
/// use logsink::{Compression, FileSinkBuilder};
///
/// let sink = FileSinkBuilder::new("./logs", "app")
///     .error_name("app-error")
///     .max_size(50)
///     .max_backups(5)
///     .compression(Compression::GzipLevel(9))
///     .build()
///     .unwrap();
/// sink.out(r#"{"msg":"ready"}"#).unwrap();
/// ```
pub struct FileSinkBuilder {
    config: SinkConfig,
}

impl FileSinkBuilder {
    /// Create a builder writing `<directory>/<name>.log`.
    pub fn new<P: AsRef<Path>, S: Into<String>>(directory: P, name: S) -> Self {
        FileSinkBuilder {
            config: SinkConfig {
                directory: directory.as_ref().to_path_buf(),
                name: name.into(),
                ..SinkConfig::default()
            },
        }
    }

    /// Start from an existing (typically deserialized) configuration.
    pub fn from_config(config: SinkConfig) -> Self {
        FileSinkBuilder { config }
    }

    /// Send error lines to a separate `<error_name>.log`.
    pub fn error_name<S: Into<String>>(self, error_name: S) -> Self {
        Self {
            config: SinkConfig {
                error_name: Some(error_name.into()),
                ..self.config
            },
        }
    }

    /// Set the mode bits for created files, e.g. `0o640`.
    pub fn permissions(self, permissions: u32) -> Self {
        Self {
            config: SinkConfig {
                permissions,
                ..self.config
            },
        }
    }

    /// Set the mode bits for the directory if it is created.
    pub fn dir_permissions(self, dir_permissions: u32) -> Self {
        Self {
            config: SinkConfig {
                dir_permissions,
                ..self.config
            },
        }
    }

    pub fn debug(self, debug: bool) -> Self {
        Self {
            config: SinkConfig { debug, ..self.config },
        }
    }

    pub fn trace(self, trace: bool) -> Self {
        Self {
            config: SinkConfig { trace, ..self.config },
        }
    }

    /// Rotate once the active file grows past `max_size` MiB (`0` disables).
    pub fn max_size(self, max_size: u64) -> Self {
        Self {
            config: SinkConfig { max_size, ..self.config },
        }
    }

    /// Delete archives older than `max_age` days (`0` disables).
    pub fn max_age(self, max_age: u32) -> Self {
        Self {
            config: SinkConfig { max_age, ..self.config },
        }
    }

    /// Keep at most `max_backups` archives (`0` disables).
    pub fn max_backups(self, max_backups: usize) -> Self {
        Self {
            config: SinkConfig {
                max_backups,
                ..self.config
            },
        }
    }

    pub fn roll_every_day(self, roll_every_day: bool) -> Self {
        Self {
            config: SinkConfig {
                roll_every_day,
                ..self.config
            },
        }
    }

    pub fn roll_on_launch(self, roll_on_launch: bool) -> Self {
        Self {
            config: SinkConfig {
                roll_on_launch,
                ..self.config
            },
        }
    }

    /// Set the compression applied to archives.
    pub fn compression(self, compress: Compression) -> Self {
        Self {
            config: SinkConfig { compress, ..self.config },
        }
    }

    /// Validate the configuration and open the sink.
    pub fn build(self) -> Result<FileSink> {
        FileSink::open(self.config)
    }
}
