//! Part file writer.
//!
//! Opened lazily on the first body chunk so error responses never touch the file.
//! Writes go straight to the `File` without a userspace buffer: after every chunk the
//! on-disk size equals the bytes received, which is what the next resume reads back.

use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::response::BodyMode;

pub(super) struct PartSink<'a> {
    path: &'a Path,
    offset: u64,
    file: Option<(File, BodyMode)>,
    written: u64,
    lifetime_written: &'a Cell<u64>,
}

impl<'a> PartSink<'a> {
    /// `lifetime_written` accumulates across retry attempts of one fetch.
    pub fn new(path: &'a Path, offset: u64, lifetime_written: &'a Cell<u64>) -> Self {
        Self {
            path,
            offset,
            file: None,
            written: 0,
            lifetime_written,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn open(&mut self, mode: BodyMode) -> io::Result<&mut File> {
        if self.file.is_none() {
            let mut options = OpenOptions::new();
            options.create(true);
            match mode {
                BodyMode::Append => options.append(true),
                BodyMode::Fresh | BodyMode::Restart => options.write(true).truncate(true),
            };
            let file = options.open(self.path)?;
            self.file = Some((file, mode));
        }
        match self.file.as_mut() {
            Some((file, _)) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "part file not open")),
        }
    }

    pub fn write(&mut self, mode: BodyMode, data: &[u8]) -> io::Result<()> {
        self.open(mode)?.write_all(data)?;
        let n = data.len() as u64;
        self.written += n;
        self.lifetime_written.set(self.lifetime_written.get() + n);
        Ok(())
    }

    /// Bytes of the part now on disk (resume offset included when appending).
    pub fn downloaded(&self) -> u64 {
        match self.file {
            Some((_, BodyMode::Append)) => self.offset + self.written,
            _ => self.written,
        }
    }

    /// Bytes received in this attempt.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Makes sure the file exists (an empty 2xx body still yields a file), flushes it to
    /// disk and returns the final size.
    pub fn finish(mut self, mode: BodyMode) -> io::Result<u64> {
        let size = self.downloaded();
        let file = self.open(mode)?;
        file.sync_data()?;
        Ok(size)
    }
}

/// Current size of `path`, or 0 when it does not exist yet.
pub(super) fn existing_len(path: &Path) -> io::Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}
