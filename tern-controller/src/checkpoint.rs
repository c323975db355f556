//! Durable sync checkpoint
//!
//! A single Unix timestamp marking how far polling has progressed. Loaded
//! once at startup, rewritten after every completed cycle. Losing a save is
//! tolerable: the next start resumes from the last durable value and
//! re-processes the window in between.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

/// Errors reading or writing the checkpoint file.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("malformed checkpoint {path}: {content:?} is not a Unix timestamp")]
    Malformed { path: String, content: String },

    #[error("failed to read checkpoint {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write checkpoint {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Loads the checkpoint.
///
/// An absent file is the bootstrap case: warn, start from now, and create
/// the file so the copy fallback in [`save`] always has a target. Anything
/// else that prevents reading a valid timestamp is fatal; silently starting
/// from "now" would skip an unknown backlog.
pub fn load(path: &Path) -> Result<DateTime<Utc>, CheckpointError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let secs: i64 = content.trim().parse().map_err(|_| CheckpointError::Malformed {
                path: path.display().to_string(),
                content: content.clone(),
            })?;
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or(CheckpointError::Malformed {
                    path: path.display().to_string(),
                    content,
                })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let now = Utc::now();
            warn!(
                "Checkpoint {} not found, starting from {}",
                path.display(),
                now
            );
            if let Err(e) = save(path, now) {
                warn!("Failed to write bootstrap checkpoint: {}", e);
            }
            Ok(now)
        }
        Err(source) => Err(CheckpointError::Unreadable {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Persists `t` as decimal Unix seconds.
///
/// Writes to a temporary file in the target's directory and renames it into
/// place. When the rename fails (some mounted volumes reject it), the bytes
/// are copied into the existing target and synced instead. The temporary
/// file is removed on every path except a successful rename.
pub fn save(path: &Path, t: DateTime<Utc>) -> Result<(), CheckpointError> {
    let serialized = t.timestamp().to_string();
    info!("Writing last sync: {}", serialized);

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = NamedTempFile::new_in(dir.unwrap_or(Path::new("."))).map_err(write_failed(path))?;
    temp.write_all(serialized.as_bytes())
        .map_err(write_failed(path))?;

    match temp.persist(path) {
        Ok(_) => Ok(()),
        Err(e) => {
            info!("Rename failed, falling back to copying: {}", e.error);
            copy_into(e.file.path(), path)
        }
    }
}

/// Copies `src`'s bytes into the already-existing `dest` and syncs it.
/// Fails when `dest` does not exist.
fn copy_into(src: &Path, dest: &Path) -> Result<(), CheckpointError> {
    let bytes = fs::read(src).map_err(write_failed(dest))?;
    let mut target = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(dest)
        .map_err(write_failed(dest))?;
    target.write_all(&bytes).map_err(write_failed(dest))?;
    target.sync_all().map_err(write_failed(dest))?;
    Ok(())
}

fn write_failed(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError {
    let path = path.display().to_string();
    move |source| CheckpointError::WriteFailed { path, source }
}
