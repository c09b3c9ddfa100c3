/// Transcript of the debugger conversation
///
/// Everything written to and read from the debugger can be mirrored into a
/// file. The transcript never influences the driver: write failures are
/// logged and otherwise ignored.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const EXIT_MARKER: &[u8] = b"\n====== debugger exited ======\n";

/// Append-only byte sink
pub struct Transcript {
    sink: Box<dyn Write + Send>,
    path: Option<PathBuf>,
}

impl Transcript {
    /// Create (truncate) a transcript file
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        log::debug!("transcript opened at {}", path.display());
        Ok(Self {
            sink: Box::new(file),
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the transcript into an arbitrary sink
    pub fn from_writer(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append bytes verbatim and flush
    pub fn record(&mut self, bytes: &[u8]) {
        let result = self.sink.write_all(bytes).and_then(|_| self.sink.flush());
        if let Err(e) = result {
            log::warn!("transcript write failed: {}", e);
        }
    }

    pub fn record_exit(&mut self) {
        self.record(EXIT_MARKER);
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript").field("path", &self.path).finish()
    }
}
