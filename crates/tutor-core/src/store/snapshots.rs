//! Durable snapshots of codebase analyses.
//!
//! Layout, one directory per codebase id under the base path:
//!
//! ```text
//! <base>/<codebase_id>/analysis.json            {schema_version, analysis}
//! <base>/<codebase_id>/file_<sha256(path)[:16]>.json
//! <base>/<codebase_id>/file_hashes.json         path -> content hash
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so readers never observe a partial file.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::PersistenceConfig;
use crate::errors::{TutorError, TutorResult};
use crate::models::{
    short_path_hash, CodebaseAnalysis, FileAnalysis, FileManifest, Snapshot,
    SNAPSHOT_SCHEMA_VERSION,
};

pub const ANALYSIS_FILE: &str = "analysis.json";
pub const MANIFEST_FILE: &str = "file_hashes.json";

const MAX_CODEBASE_ID_LEN: usize = 128;

/// Reject ids that could escape the base directory or collide with it.
pub fn validate_codebase_id(id: &str) -> TutorResult<()> {
    if id.is_empty() {
        return Err(TutorError::validation("codebase id must not be empty"));
    }
    if id.len() > MAX_CODEBASE_ID_LEN {
        return Err(TutorError::validation(format!(
            "codebase id longer than {MAX_CODEBASE_ID_LEN} characters"
        )));
    }
    if id == "." || id == ".." {
        return Err(TutorError::validation(format!("invalid codebase id {id:?}")));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(TutorError::validation(format!(
            "codebase id {id:?} contains {bad:?}; allowed: letters, digits, '.', '_', '-'"
        )));
    }
    Ok(())
}

pub fn file_snapshot_name(path: &str) -> String {
    format!("file_{}.json", short_path_hash(path))
}

fn invalid_data(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> TutorResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| TutorError::persistence(path, invalid_data("path has no parent directory")))?;
    std::fs::create_dir_all(dir).map_err(|e| TutorError::persistence(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TutorError::persistence(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| TutorError::persistence(path, invalid_data(e.to_string())))?;
        writer.flush().map_err(|e| TutorError::persistence(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| TutorError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| TutorError::persistence(path, e.error))?;
    Ok(())
}

/// `None` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> TutorResult<Option<T>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TutorError::persistence(path, e)),
    };
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| TutorError::persistence(path, invalid_data(e.to_string())))
}

#[derive(Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

#[derive(Clone, Debug)]
pub struct PersistenceManager {
    base_path: PathBuf,
}

impl PersistenceManager {
    pub fn new(config: &PersistenceConfig) -> Self {
        Self::at(config.base_path.clone())
    }

    pub fn at(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn codebase_dir(&self, id: &str) -> TutorResult<PathBuf> {
        validate_codebase_id(id)?;
        Ok(self.base_path.join(id))
    }

    // -- whole snapshots ----------------------------------------------------

    /// Write every per-file snapshot, then the full snapshot.
    pub fn save_analysis(&self, analysis: &CodebaseAnalysis) -> TutorResult<()> {
        let dir = self.codebase_dir(&analysis.codebase_id)?;
        for file in analysis.files.values() {
            write_json_atomic(&dir.join(file_snapshot_name(&file.path)), file)?;
        }
        let snapshot = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            analysis: analysis.clone(),
        };
        write_json_atomic(&dir.join(ANALYSIS_FILE), &snapshot)?;
        tracing::debug!(
            codebase_id = %analysis.codebase_id,
            files = analysis.files.len(),
            "analysis snapshot saved"
        );
        Ok(())
    }

    pub fn load_analysis(&self, id: &str) -> TutorResult<Option<CodebaseAnalysis>> {
        let path = self.codebase_dir(id)?.join(ANALYSIS_FILE);
        let Some(probe) = read_json::<VersionProbe>(&path)? else {
            return Ok(None);
        };
        if probe.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(TutorError::persistence(
                &path,
                invalid_data(format!(
                    "unsupported snapshot schema version {} (expected {SNAPSHOT_SCHEMA_VERSION})",
                    probe.schema_version
                )),
            ));
        }
        Ok(read_json::<Snapshot>(&path)?.map(|s| s.analysis))
    }

    /// Remove everything stored for `id`. True if anything existed.
    pub fn delete_analysis(&self, id: &str) -> TutorResult<bool> {
        let dir = self.codebase_dir(id)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TutorError::persistence(&dir, e)),
        }
    }

    /// Ids with a readable full snapshot, sorted.
    pub fn list_codebases(&self) -> TutorResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TutorError::persistence(&self.base_path, e)),
        };
        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let Ok(id) = entry.file_name().into_string() else {
                continue;
            };
            if validate_codebase_id(&id).is_err() || !entry.path().is_dir() {
                continue;
            }
            let snapshot = entry.path().join(ANALYSIS_FILE);
            if matches!(read_json::<VersionProbe>(&snapshot), Ok(Some(_))) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    // -- per-file snapshots -------------------------------------------------

    pub fn save_file_analysis(&self, id: &str, analysis: &FileAnalysis) -> TutorResult<()> {
        let dir = self.codebase_dir(id)?;
        write_json_atomic(&dir.join(file_snapshot_name(&analysis.path)), analysis)
    }

    /// Stored analysis of `path`, `None` when absent or stored for a
    /// different path under a colliding name.
    pub fn load_file_analysis(&self, id: &str, path: &str) -> TutorResult<Option<FileAnalysis>> {
        let file = self.codebase_dir(id)?.join(file_snapshot_name(path));
        Ok(read_json::<FileAnalysis>(&file)?.filter(|a| a.path == path))
    }

    pub fn remove_file_analysis(&self, id: &str, path: &str) -> TutorResult<bool> {
        let file = self.codebase_dir(id)?.join(file_snapshot_name(path));
        match std::fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TutorError::persistence(&file, e)),
        }
    }

    // -- manifest -----------------------------------------------------------

    pub fn save_file_hashes(&self, id: &str, manifest: &FileManifest) -> TutorResult<()> {
        let dir = self.codebase_dir(id)?;
        write_json_atomic(&dir.join(MANIFEST_FILE), manifest)
    }

    /// Stored manifest, empty when none was written yet.
    pub fn load_file_hashes(&self, id: &str) -> TutorResult<FileManifest> {
        let path = self.codebase_dir(id)?.join(MANIFEST_FILE);
        Ok(read_json::<FileManifest>(&path)?.unwrap_or_default())
    }
}
