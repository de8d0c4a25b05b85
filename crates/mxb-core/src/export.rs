//! Export artifacts and the create-exclusive writer.

use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{domain::ChatId, errors::Error, members::MemberRecord, Result};

/// Export id: start time (UTC millis) plus target chat, e.g. `1760650000123_-1001234567890`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportId(String);

impl ExportId {
    pub fn new(started_at: DateTime<Utc>, target: ChatId) -> Self {
        Self(format!("{}_{}", started_at.timestamp_millis(), target.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The durable output of one completed enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub id: ExportId,
    #[serde(rename = "peerId")]
    pub target_group_id: i64,
    pub members: Vec<MemberRecord>,
}

/// Writes artifacts as `<dir>/<id>.json`, never overwriting an existing one.
#[derive(Clone, Debug)]
pub struct ExportWriter {
    dir: PathBuf,
}

impl ExportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: &ExportId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    /// Commit `artifact` exactly once.
    ///
    /// A collision with an existing artifact surfaces as `AlreadyExists`; readers never observe
    /// a half-written artifact.
    pub fn write(&self, artifact: &ExportArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let dest = self.path_for(&artifact.id);
        if dest.exists() {
            return Err(Error::AlreadyExists { path: dest });
        }

        self.commit(&dest, |out| {
            serde_json::to_writer_pretty(&mut *out, artifact)?;
            out.write_all(b"\n")
        })?;
        Ok(dest)
    }

    /// Stage the body in a hidden temp file inside the export dir, sync it, then link it to
    /// `dest` without clobbering. The temp file is removed on every failure path (it is deleted
    /// when dropped), so a failed commit leaves nothing behind.
    fn commit(
        &self,
        dest: &Path,
        write_body: impl FnOnce(&mut dyn Write) -> io::Result<()>,
    ) -> Result<()> {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;

        write_staged(&mut staged, write_body)?;

        staged.persist_noclobber(dest).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                Error::AlreadyExists {
                    path: dest.to_path_buf(),
                }
            } else {
                Error::Io(e.error)
            }
        })?;

        sync_directory(&self.dir);
        Ok(())
    }
}

fn write_staged(
    staged: &mut NamedTempFile,
    write_body: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> io::Result<()> {
    let mut out = BufWriter::new(staged.as_file_mut());
    write_body(&mut out)?;
    out.flush()?;
    drop(out);
    staged.as_file().sync_all()
}

// Makes the new directory entry durable; failure only costs durability, not correctness.
fn sync_directory(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to sync export directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    fn artifact(id: &str, members: Vec<MemberRecord>) -> ExportArtifact {
        ExportArtifact {
            id: ExportId(id.to_string()),
            target_group_id: -100_42,
            members,
        }
    }

    fn rec(user_id: i64, invited_by_user_id: i64) -> MemberRecord {
        MemberRecord {
            user_id,
            invited_by_user_id,
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn id_combines_start_time_and_target() {
        let at = Utc.timestamp_millis_opt(1_760_650_000_123).unwrap();
        let id = ExportId::new(at, ChatId(-1001234));
        assert_eq!(id.as_str(), "1760650000123_-1001234");

        let later = ExportId::new(at + chrono::Duration::milliseconds(1), ChatId(-1001234));
        assert_ne!(id, later);
        assert_ne!(id, ExportId::new(at, ChatId(-1009999)));
    }

    #[test]
    fn writes_documented_json_shape() {
        let dir = tmp_dir("mxb-export-shape");
        let writer = ExportWriter::new(&dir);
        let path = writer
            .write(&artifact("1_-10042", vec![rec(1, 2), rec(3, 0)]))
            .unwrap();

        assert_eq!(path, dir.join("1_-10042.json"));
        let v: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "id": "1_-10042",
                "peerId": -10042,
                "members": [
                    { "userId": 1, "invitedByUserId": 2 },
                    { "userId": 3, "invitedByUserId": 0 }
                ]
            })
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_write_with_same_id_fails_and_keeps_first() {
        let dir = tmp_dir("mxb-export-dup");
        let writer = ExportWriter::new(&dir);

        let first = artifact("7_-1", vec![rec(1, 0)]);
        let path = writer.write(&first).unwrap();
        let original = fs::read_to_string(&path).unwrap();

        let second = artifact("7_-1", vec![rec(2, 0), rec(3, 0)]);
        let err = writer.write(&second).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { path: p } if p == path));

        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        // No staging leftovers.
        assert_eq!(entries(&dir), vec!["7_-1.json".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_body_write_leaves_no_files() {
        let dir = tmp_dir("mxb-export-partial");
        fs::create_dir_all(&dir).unwrap();
        let writer = ExportWriter::new(&dir);
        let dest = dir.join("9_-1.json");

        let err = writer
            .commit(&dest, |out| {
                out.write_all(&[b'x'; 16 * 1024])?;
                Err(io::Error::new(io::ErrorKind::Other, "File too large"))
            })
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(entries(&dir).is_empty(), "left behind: {:?}", entries(&dir));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn commit_onto_existing_destination_is_already_exists() {
        let dir = tmp_dir("mxb-export-race");
        fs::create_dir_all(&dir).unwrap();
        let writer = ExportWriter::new(&dir);
        let dest = dir.join("3_-1.json");
        fs::write(&dest, "first").unwrap();

        // Bypasses the early existence check, as a concurrent writer would.
        let err = writer
            .commit(&dest, |out| out.write_all(b"second"))
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyExists { path } if path == dest));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "first");
        assert_eq!(entries(&dir), vec!["3_-1.json".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn creates_missing_directory_and_tolerates_existing_one() {
        let root = tmp_dir("mxb-export-dir");
        let dir = root.join("nested/exports");
        assert!(!dir.exists());

        let writer = ExportWriter::new(&dir);
        writer.write(&artifact("1_-1", vec![])).unwrap();
        assert!(dir.is_dir());

        // Directory now pre-exists; a distinct id still succeeds.
        writer.write(&artifact("2_-1", vec![rec(5, 0)])).unwrap();
        assert_eq!(
            entries(&dir),
            vec!["1_-1.json".to_string(), "2_-1.json".to_string()]
        );

        let _ = fs::remove_dir_all(&root);
    }
}
