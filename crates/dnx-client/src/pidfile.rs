//! PID file handling: write the daemon's PID to
//! `/var/run/<progname>.pid`, hold an exclusive advisory lock on it for
//! the process's lifetime, and unlink it on exit.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use dnx_core::{DnxError, DnxResult};
use log::warn;

pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Opens (creating if needed) the file at `path`, takes an exclusive
    /// advisory `flock`, truncates it, and writes the current PID.
    /// Fails with `Busy` if another process already holds the lock -
    /// i.e. the daemon is already running.
    pub fn create(path: impl AsRef<Path>) -> DnxResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DnxError::Open(format!("opening pid file {}: {e}", path.display())))?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(DnxError::Busy(format!(
                "pid file {} is locked by another instance",
                path.display()
            )));
        }

        let mut file = file;
        file.set_len(0)
            .map_err(|e| DnxError::Open(format!("truncating pid file: {e}")))?;
        writeln!(file, "{}", std::process::id())
            .map_err(|e| DnxError::Open(format!("writing pid file: {e}")))?;
        file.flush()
            .map_err(|e| DnxError::Open(format!("flushing pid file: {e}")))?;

        Ok(PidFile { path, file })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove pid file {}: {e}", self.path.display());
        }
    }
}
