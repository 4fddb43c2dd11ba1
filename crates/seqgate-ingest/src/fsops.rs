//! Small filesystem helpers shared by the pipeline stages
//!
//! Moves are rename-first with a copy-and-delete fallback so that routing
//! still works when a target directory sits on a different filesystem.

use std::io;
use std::path::Path;

/// Move a file, falling back to copy-and-delete across filesystems
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        },
    }
}

/// Move a file, replacing any existing target first
pub fn move_replace(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        std::fs::remove_file(to)?;
    }
    move_file(from, to)
}
