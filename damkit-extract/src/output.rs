//! File output operations for extracted metadata.
//!
//! Handles rotating previous output files and writing metadata documents.

use damkit_core::{Record, Result, error::DamError};
use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Suffix appended to a file that is pushed one generation down
pub const OLD_SUFFIX: &str = ".old";

fn with_old_suffix(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(OLD_SUFFIX);
    PathBuf::from(name)
}

/// Moves an existing file out of the way by renaming it to `<path>.old`.
///
/// Older generations are pushed down first: `<path>.old` becomes
/// `<path>.old.old` and so on, so no earlier output is lost. Returns the new
/// location of `path`, or `None` when there was nothing to move.
///
/// # Errors
/// Returns error if a rename fails
pub fn deprecate_file(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut generations = vec![path.to_path_buf()];
    loop {
        let next = with_old_suffix(generations.last().map_or(path, PathBuf::as_path));
        let occupied = next.exists();
        generations.push(next);
        if !occupied {
            break;
        }
    }

    for pair in generations.windows(2).rev() {
        let (from, to) = (&pair[0], &pair[1]);
        std::fs::rename(from, to).map_err(|e| {
            DamError::io(
                format!("Failed to move {} to {}", from.display(), to.display()),
                e,
            )
        })?;
        tracing::debug!("Moved {} to {}", from.display(), to.display());
    }

    Ok(generations.get(1).cloned())
}

/// Writes the metadata document of a record to a file.
///
/// # Errors
/// Returns error if the file cannot be created or the document cannot be
/// written
pub fn write_record_metadata(record: &Record, path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| DamError::io(format!("Failed to create {}", path.display()), e))?;
    record.write_field_metadata(BufWriter::new(file))
}
