// File-backed calibration persistence

use std::fs;
use std::io;
use std::path::PathBuf;

use tacho_governor::CalibrationBackend;
use tracing::{debug, warn};

/// Calibration text file (`<speed>: <duty>` per line)
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CalibrationBackend for FileBackend {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = fs::read(&self.path).map_err(|e| {
            warn!("Cannot read {}: {}", self.path.display(), e);
            e
        })?;
        if data.len() > buf.len() {
            warn!(
                "{} is too large ({} bytes, max {})",
                self.path.display(),
                data.len(),
                buf.len()
            );
            return Err(io::Error::new(io::ErrorKind::InvalidData, "calibration file too large"));
        }
        buf[..data.len()].copy_from_slice(&data);
        debug!("Read {} bytes from {}", data.len(), self.path.display());
        Ok(data.len())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        // write-then-rename
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!("Cannot write {}: {}", self.path.display(), e);
                e
            })
    }
}
