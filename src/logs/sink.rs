use crate::error::{RelayError, Result};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Durable destination for the raw relayed byte stream
pub trait LogSink: Send {
    /// Append bytes, returning how many were accepted
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Flush and release the destination
    fn close(&mut self) -> io::Result<()>;
}

/// Resolves a destination descriptor into an opened sink
pub trait SinkFactory {
    fn open(&self, destination: &str) -> Result<Box<dyn LogSink>>;
}

/// When a [`FileSink`] moves its current file aside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Rotation {
    /// Keep appending to the same file
    #[default]
    Never,
    /// Rotate once the file reaches `max_bytes`
    Size { max_bytes: u64 },
    /// Rotate when the local date changes
    Daily,
}

/// Append-only file sink with optional rotation
pub struct FileSink {
    /// Path of the live file
    path: PathBuf,
    /// Open handle, `None` once closed
    file: Option<File>,
    rotation: Rotation,
    /// Prefix every record with a local timestamp
    timestamps: bool,
    /// Current size of the live file
    size: u64,
    /// Local date the live file was opened on
    opened_on: NaiveDate,
}

impl FileSink {
    /// Open (or create) a sink appending to `path`
    pub fn open<P: AsRef<Path>>(path: P, rotation: Rotation, timestamps: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let init_err = |e: io::Error| RelayError::SinkInitError(path.display().to_string(), e.to_string());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(init_err)?;
        }

        let file = open_append(&path).map_err(init_err)?;
        let metadata = file.metadata().ok();
        let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);

        // An existing file belongs to the day it was last written
        let opened_on = metadata
            .filter(|m| m.len() > 0)
            .and_then(|m| m.modified().ok())
            .map(|modified| DateTime::<Local>::from(modified).date_naive())
            .unwrap_or_else(|| Local::now().date_naive());

        Ok(Self {
            path,
            file: Some(file),
            rotation,
            timestamps,
            size,
            opened_on,
        })
    }

    /// Get the path of the live file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current size of the live file
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn write_at(&mut self, bytes: &[u8], now: DateTime<Local>) -> io::Result<usize> {
        if self.file.is_none() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"));
        }

        if let Some(rotated) = self.rotation_target(now) {
            self.rotate(&rotated, now)?;
        }

        let record = if self.timestamps {
            format_record(&now, bytes)
        } else {
            bytes.to_vec()
        };

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"))?;
        file.write_all(&record)?;
        file.flush()?;
        self.size += record.len() as u64;

        Ok(bytes.len())
    }

    /// Where the live file should be moved before the next write, if anywhere.
    ///
    /// Size rotation uses `<stem>-<YYYYmmdd-HHMMSS.mmm>.<ext>` and daily
    /// rotation `<name>.<YYYY-mm-dd>`. If that name is taken, `-1`, `-2`, ...
    /// is appended (before the extension for size rotation) until it is free,
    /// so an earlier rotated file is never overwritten.
    fn rotation_target(&self, now: DateTime<Local>) -> Option<PathBuf> {
        let (base, ext) = match self.rotation {
            Rotation::Never => return None,
            Rotation::Size { max_bytes } if self.size >= max_bytes => {
                let stem = self.path.file_stem()?.to_string_lossy();
                let ext = self
                    .path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "log".to_string());
                let stamp = now.format("%Y%m%d-%H%M%S%.3f");
                (format!("{}-{}", stem, stamp), format!(".{}", ext))
            }
            Rotation::Size { .. } => return None,
            Rotation::Daily if now.date_naive() != self.opened_on => {
                let name = self.path.file_name()?.to_string_lossy();
                let day = self.opened_on.format("%Y-%m-%d");
                (format!("{}.{}", name, day), String::new())
            }
            Rotation::Daily => return None,
        };

        let candidate = |n: u32| {
            let name = match n {
                0 => format!("{}{}", base, ext),
                n => format!("{}-{}{}", base, n, ext),
            };
            self.path.with_file_name(name)
        };
        (0..).map(candidate).find(|path| !path.exists())
    }

    fn rotate(&mut self, rotated: &Path, now: DateTime<Local>) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        if let Err(e) = std::fs::rename(&self.path, rotated) {
            // Keep writing to the old file rather than going dark
            self.file = Some(open_append(&self.path)?);
            return Err(e);
        }
        tracing::info!(
            "Rotated log {} to {}",
            self.path.display(),
            rotated.display()
        );

        self.file = Some(open_append(&self.path)?);
        self.size = 0;
        self.opened_on = now.date_naive();
        Ok(())
    }
}

impl LogSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.write_at(bytes, Local::now())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => {
                file.flush()?;
                file.sync_all()
            }
            None => Ok(()),
        }
    }
}

/// Builds [`FileSink`]s sharing one rotation policy
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSinkFactory {
    pub rotation: Rotation,
    pub timestamps: bool,
}

impl SinkFactory for FileSinkFactory {
    fn open(&self, destination: &str) -> Result<Box<dyn LogSink>> {
        let sink = FileSink::open(destination, self.rotation, self.timestamps)?;
        Ok(Box::new(sink))
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Format: [YYYY-MM-DD HH:MM:SS.mmm] <data>\n
fn format_record(timestamp: &DateTime<Local>, data: &[u8]) -> Vec<u8> {
    let timestamp_str = timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    let mut entry = Vec::with_capacity(timestamp_str.len() + 4 + data.len());

    entry.push(b'[');
    entry.extend_from_slice(timestamp_str.as_bytes());
    entry.extend_from_slice(b"] ");
    entry.extend_from_slice(data);

    if !data.ends_with(b"\n") {
        entry.push(b'\n');
    }

    entry
}
