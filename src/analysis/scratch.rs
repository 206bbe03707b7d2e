use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error};
use uuid::Uuid;

/// Transient, exclusively-owned copy of the uploaded bytes.
///
/// The raw document must never outlive the analysis call that created it:
/// callers erase the file explicitly via [`erase`](ScratchFile::erase) once
/// the pipeline resolves, and the `Drop` impl covers cancellation. A failed
/// erase retries once through an alternate path (truncate the contents, then
/// unlink again) and is then reported on the `zero_retention` target so it
/// can be alerted on separately from ordinary I/O errors.
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    /// Writes `bytes` under a collision-free name inside `dir`.
    pub fn create(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        let path = dir.join(format!("script-{}.pdf", Uuid::new_v4()));
        fs::write(&path, bytes)?;
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the scratch copy. Never fails: an unremovable file is a
    /// zero-retention violation, logged but not allowed to mask the
    /// pipeline's own result.
    pub fn erase(mut self) {
        self.armed = false;
        remove_scratch(&self.path);
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            remove_scratch(&self.path);
        }
    }
}

fn remove_scratch(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "scratch copy erased"),
        Err(first) => {
            // Alternate path: empty the file of script content, then unlink.
            let retry = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(path)
                .and_then(|_| fs::remove_file(path));

            if let Err(second) = retry {
                error!(
                    target: "zero_retention",
                    path = %path.display(),
                    first_error = %first,
                    second_error = %second,
                    "scratch copy of uploaded script could not be erased; manual cleanup required"
                );
            }
        }
    }
}
