//! Session descriptor and the per-user state directory layout:
//!
//! ```text
//! <state_root>/
//!     sessions/<hash(work_dir)>/<session_uuid>/
//!         context.jsonl
//!         context_<N>.jsonl
//!         subagent_<M>.jsonl
//!     metadata.json
//! ```

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use super::ContextError;

/// Immutable descriptor of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub work_dir: PathBuf,
    pub context_file: PathBuf,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Allocates a fresh sub-agent context-file path within this session's
    /// own directory, without needing a live `SessionTable` — useful from a
    /// `Runtime`, which only carries the `Session` descriptor. Same
    /// lowest-unused-suffix scan as `SessionTable::new_subagent_context_path`.
    pub async fn new_subagent_context_path(&self) -> Result<PathBuf, ContextError> {
        let dir = self
            .context_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut m: u32 = 0;
        loop {
            let candidate = dir.join(format!("subagent_{m}.jsonl"));
            if fs::metadata(&candidate).await.is_err() {
                return Ok(candidate);
            }
            m += 1;
        }
    }
}

/// Deterministic (stable across runs) hash of a canonical work-dir path,
/// used to bucket sessions under `sessions/<hash>/`.
pub fn hash_work_dir(work_dir: &Path) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    work_dir.to_string_lossy().as_bytes().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkDirEntry {
    last_session_id: Option<Uuid>,
    thinking: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    work_dirs: HashMap<String, WorkDirEntry>,
}

/// Work-dir → session bookkeeping layered on top of per-session `Context`
/// files. Owns `metadata.json` under the state root.
pub struct SessionTable {
    state_root: PathBuf,
    metadata: MetadataFile,
}

impl SessionTable {
    pub async fn open(state_root: impl AsRef<Path>) -> Result<Self, ContextError> {
        let state_root = state_root.as_ref().to_path_buf();
        fs::create_dir_all(&state_root).await?;
        let metadata_path = state_root.join("metadata.json");
        let metadata = match fs::read_to_string(&metadata_path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| ContextError::Metadata(e.to_string()))?,
            Err(_) => MetadataFile::default(),
        };
        Ok(Self { state_root, metadata })
    }

    async fn save(&self) -> Result<(), ContextError> {
        let text = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| ContextError::Metadata(e.to_string()))?;
        fs::write(self.state_root.join("metadata.json"), text).await?;
        Ok(())
    }

    fn session_dir(&self, work_dir: &Path, id: Uuid) -> PathBuf {
        self.state_root
            .join("sessions")
            .join(hash_work_dir(work_dir))
            .join(id.to_string())
    }

    /// Creates a new session for `work_dir`, allocating its directory and
    /// `context.jsonl` path (the file itself is created when a `Context`
    /// opens it). Does not mark it as the "last" session.
    pub async fn create_session(
        &mut self,
        work_dir: impl AsRef<Path>,
        title: impl Into<String>,
    ) -> Result<Session, ContextError> {
        let work_dir = canonicalize_best_effort(work_dir.as_ref());
        let id = Uuid::new_v4();
        let dir = self.session_dir(&work_dir, id);
        fs::create_dir_all(&dir).await?;
        let session = Session {
            id,
            work_dir,
            context_file: dir.join("context.jsonl"),
            title: title.into(),
            updated_at: Utc::now(),
        };
        Ok(session)
    }

    /// Marks `session` as the "last" session to resume for its work dir.
    pub async fn set_last_session(&mut self, session: &Session) -> Result<(), ContextError> {
        let key = session.work_dir.to_string_lossy().into_owned();
        let entry = self.metadata.work_dirs.entry(key).or_default();
        entry.last_session_id = Some(session.id);
        self.save().await
    }

    /// Returns the id of the last session for `work_dir`, if any.
    pub fn last_session_id(&self, work_dir: &Path) -> Option<Uuid> {
        let key = work_dir.to_string_lossy().into_owned();
        self.metadata
            .work_dirs
            .get(&key)
            .and_then(|e| e.last_session_id)
    }

    /// Resolves the context-file path for a given session id under `work_dir`,
    /// without requiring the `Session` struct to be reconstructed in full.
    pub fn context_file_for(&self, work_dir: &Path, id: Uuid) -> PathBuf {
        self.session_dir(work_dir, id).join("context.jsonl")
    }

    /// Allocates a fresh sub-agent context-file path within `session`'s
    /// directory, rotated (`subagent_<M>.jsonl`) so concurrent invocations
    /// in the same session never collide.
    pub async fn new_subagent_context_path(
        &self,
        session: &Session,
    ) -> Result<PathBuf, ContextError> {
        let dir = self
            .session_dir(&session.work_dir, session.id);
        let mut m: u32 = 0;
        loop {
            let candidate = dir.join(format!("subagent_{m}.jsonl"));
            if fs::metadata(&candidate).await.is_err() {
                return Ok(candidate);
            }
            m += 1;
        }
    }

    pub fn thinking(&self, work_dir: &Path) -> bool {
        let key = work_dir.to_string_lossy().into_owned();
        self.metadata
            .work_dirs
            .get(&key)
            .map(|e| e.thinking)
            .unwrap_or(false)
    }

    pub async fn set_thinking(&mut self, work_dir: &Path, enabled: bool) -> Result<(), ContextError> {
        let key = work_dir.to_string_lossy().into_owned();
        self.metadata.work_dirs.entry(key).or_default().thinking = enabled;
        self.save().await
    }
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_session_then_set_last_round_trips() {
        let root = tempdir().unwrap();
        let work_dir = tempdir().unwrap();
        let mut table = SessionTable::open(root.path()).await.unwrap();
        let session = table
            .create_session(work_dir.path(), "first")
            .await
            .unwrap();
        table.set_last_session(&session).await.unwrap();

        let reopened = SessionTable::open(root.path()).await.unwrap();
        assert_eq!(
            reopened.last_session_id(&session.work_dir),
            Some(session.id)
        );
    }

    #[test]
    fn hash_work_dir_is_stable_across_calls() {
        let path = Path::new("/some/work/dir");
        assert_eq!(hash_work_dir(path), hash_work_dir(path));
    }

    #[tokio::test]
    async fn thinking_flag_defaults_false_and_persists() {
        let root = tempdir().unwrap();
        let work_dir = tempdir().unwrap();
        let canon = std::fs::canonicalize(work_dir.path()).unwrap();
        let mut table = SessionTable::open(root.path()).await.unwrap();
        assert!(!table.thinking(&canon));
        table.set_thinking(&canon, true).await.unwrap();
        let reopened = SessionTable::open(root.path()).await.unwrap();
        assert!(reopened.thinking(&canon));
    }

    #[tokio::test]
    async fn subagent_context_paths_are_unique() {
        let root = tempdir().unwrap();
        let work_dir = tempdir().unwrap();
        let mut table = SessionTable::open(root.path()).await.unwrap();
        let session = table.create_session(work_dir.path(), "t").await.unwrap();
        let p1 = table.new_subagent_context_path(&session).await.unwrap();
        fs::File::create(&p1).await.unwrap();
        let p2 = table.new_subagent_context_path(&session).await.unwrap();
        assert_ne!(p1, p2);
    }

    #[tokio::test]
    async fn session_can_allocate_its_own_subagent_path_without_a_table() {
        let root = tempdir().unwrap();
        let work_dir = tempdir().unwrap();
        let mut table = SessionTable::open(root.path()).await.unwrap();
        let session = table.create_session(work_dir.path(), "t").await.unwrap();
        let via_session = session.new_subagent_context_path().await.unwrap();
        let via_table = table.new_subagent_context_path(&session).await.unwrap();
        assert_eq!(via_session, via_table);
    }
}
