//! FileStateStore - ファイルベースの状態ストア
//!
//! Layout: `<state_dir>/<encoded-id>.json`, one pretty-printed record per
//! iteration. Writes go to a temp file in the same directory and are renamed
//! over the target.
//!
//! ファイル名は id から単射的に導出する。長すぎる場合は先頭部分 + SHA-256
//! ダイジェストに切り替える。

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::{IterationId, IterationState};
use crate::ports::{IterationStateStore, StoreError};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

/// Longest stem written as is. `<stem>.json.tmp` stays well under the usual
/// 255-byte file name limit.
const MAX_STEM_LEN: usize = 180;

/// Separates the kept prefix from the digest in shortened stems. Never
/// produced by the plain encoding, which escapes `~`.
const DIGEST_MARKER: char = '~';

#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: PathBuf,
}

impl FileStateStore {
    /// The directory is created lazily on the first save.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of the record file for `id`.
    pub fn record_path(&self, id: &IterationId) -> PathBuf {
        self.state_dir
            .join(format!("{}.{RECORD_EXTENSION}", encode_file_stem(id.as_str())))
    }

    fn read_record(path: &Path) -> Result<IterationState, StoreError> {
        let content = fs::read_to_string(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| corrupt(path, e.to_string()))?;
        IterationState::from_record(value).map_err(|e| corrupt(path, e.to_string()))
    }

    /// Reads a file found by scanning; its name must be the one its id maps to.
    fn read_listed_record(path: &Path) -> Result<IterationState, StoreError> {
        let state = Self::read_record(path)?;
        let expected = encode_file_stem(state.id().as_str());
        let stem = path.file_stem().and_then(|s| s.to_str());
        if stem != Some(expected.as_str()) {
            return Err(corrupt(
                path,
                format!("record holds iteration {}, expected file {expected}.{RECORD_EXTENSION}", state.id()),
            ));
        }
        Ok(state)
    }
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::CorruptRecord {
        path: path.to_path_buf(),
        reason,
    }
}

impl IterationStateStore for FileStateStore {
    fn save(&self, state: &IterationState) -> Result<(), StoreError> {
        fs::create_dir_all(&self.state_dir)?;

        let path = self.record_path(state.id());
        let temp_path = path.with_extension(TEMP_EXTENSION);

        let json = serde_json::to_string_pretty(&state.to_record())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!(
            iteration_id = %state.id(),
            status = %state.status(),
            path = %path.display(),
            "saved iteration state"
        );
        Ok(())
    }

    fn load(&self, id: &IterationId) -> Result<Option<IterationState>, StoreError> {
        let path = self.record_path(id);
        let state = match Self::read_record(&path) {
            Ok(state) => state,
            Err(StoreError::Io(e))
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::InvalidFilename
                ) =>
            {
                tracing::debug!(iteration_id = %id, "no saved state");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if state.id() != id {
            return Err(corrupt(
                &path,
                format!("record holds iteration {} instead of {id}", state.id()),
            ));
        }

        tracing::debug!(iteration_id = %id, status = %state.status(), "loaded iteration state");
        Ok(Some(state))
    }

    fn list_all(&self) -> Result<Vec<IterationState>, StoreError> {
        let entries = match fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut states = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_record = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION);
            if is_record {
                states.push(Self::read_listed_record(&path)?);
            }
        }

        states.sort_by(|a, b| a.id().cmp(b.id()));
        tracing::debug!(count = states.len(), dir = %self.state_dir.display(), "scanned state dir");
        Ok(states)
    }
}

/// Maps an id onto a file stem, injectively.
///
/// `[A-Za-z0-9_-]` and non-leading `.` pass through; every other byte
/// (including `%`) becomes `%XX`. Stems longer than 180 bytes become
/// `<prefix>~<sha256 hex>`.
pub fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for (i, byte) in id.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || (byte == b'.' && i > 0);
        if keep {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }

    if out.len() <= MAX_STEM_LEN {
        return out;
    }

    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    // ASCII only, so any byte index is a char boundary.
    out.truncate(MAX_STEM_LEN - digest.len() - 1);
    out.push(DIGEST_MARKER);
    out.push_str(&digest);
    out
}
