//! Append-only destinations for page records.

use crate::record::PageRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// Errors raised while persisting a record.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing or syncing the destination failed.
    #[error("failed to write record: {0}")]
    Io(#[from] io::Error),
    /// The record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable, ordered destination for page records.
///
/// `emit` returns only once the record is persisted; a failed call must leave every
/// previously emitted record intact.
pub trait PageRecordSink {
    /// Appends one record.
    fn emit(&mut self, record: &PageRecord) -> Result<(), SinkError>;
}

impl PageRecordSink for Vec<PageRecord> {
    fn emit(&mut self, record: &PageRecord) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}

impl<K: PageRecordSink + ?Sized> PageRecordSink for &mut K {
    fn emit(&mut self, record: &PageRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}

impl<K: PageRecordSink + ?Sized> PageRecordSink for Box<K> {
    fn emit(&mut self, record: &PageRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}

/// On-disk layout of emitted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordFormat {
    /// One compact JSON object per line.
    #[default]
    Jsonl,
    /// Two-space indented JSON objects separated by newlines.
    Pretty,
}

/// Writers that can push buffered bytes to stable storage and undo a torn append.
pub trait Persist: Write {
    /// Makes everything written so far durable.
    fn persist(&mut self) -> io::Result<()>;

    /// Current end of the written data.
    fn checkpoint(&mut self) -> io::Result<u64>;

    /// Discards everything written after `mark`.
    fn rollback(&mut self, mark: u64) -> io::Result<()>;
}

impl Persist for File {
    fn persist(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }

    fn checkpoint(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn rollback(&mut self, mark: u64) -> io::Result<()> {
        self.set_len(mark)?;
        self.seek(SeekFrom::Start(mark))?;
        self.sync_data()
    }
}

impl Persist for Vec<u8> {
    fn persist(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn checkpoint(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn rollback(&mut self, mark: u64) -> io::Result<()> {
        self.truncate(usize::try_from(mark).unwrap_or(usize::MAX));
        Ok(())
    }
}

/// JSON record writer over any persistable target.
pub struct JsonSink<W: Persist> {
    target: W,
    format: RecordFormat,
    written: usize,
}

impl JsonSink<File> {
    /// Creates (or truncates) `path`, creating missing parent directories.
    pub fn create(path: &Path, format: RecordFormat) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(file, format))
    }
}

impl<W: Persist> JsonSink<W> {
    /// Wraps an already-open target.
    pub fn new(target: W, format: RecordFormat) -> Self {
        Self {
            target,
            format,
            written: 0,
        }
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Returns the underlying target.
    pub fn into_inner(self) -> W {
        self.target
    }

    fn encode(&self, record: &PageRecord) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = match self.format {
            RecordFormat::Jsonl => serde_json::to_vec(record)?,
            RecordFormat::Pretty => serde_json::to_vec_pretty(record)?,
        };
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl<W: Persist> PageRecordSink for JsonSink<W> {
    fn emit(&mut self, record: &PageRecord) -> Result<(), SinkError> {
        let bytes = self.encode(record)?;
        let mark = self.target.checkpoint()?;
        let appended = self
            .target
            .write_all(&bytes)
            .and_then(|()| self.target.persist());
        if let Err(err) = appended {
            // A torn append is cut back to the last complete record.
            if let Err(undo) = self.target.rollback(mark) {
                tracing::error!(mark, "failed to roll back partial record: {undo}");
            }
            return Err(SinkError::Io(err));
        }
        self.written += 1;
        Ok(())
    }
}
