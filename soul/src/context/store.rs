//! `Context`: the append-only, checkpointable conversation log.
//!
//! One file per session (or per sub-agent invocation). Append is O(1)
//! (push + single write), restore is O(n) (scan the file once), revert is
//! O(n) (rewrite the surviving prefix into a fresh file).

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::message::Message;

use super::record::ContextLine;
use super::ContextError;

/// Finds the lowest unused `<stem>_<N>.jsonl` suffix in `dir`, starting at 0,
/// so concurrent sessions rotating files in the same directory cannot clash
/// on a collision with an in-progress rotation from another process.
async fn lowest_unused_rotation(dir: &Path, stem: &str) -> Result<PathBuf, ContextError> {
    let mut n: u32 = 0;
    loop {
        let candidate = dir.join(format!("{stem}_{n}.jsonl"));
        if fs::metadata(&candidate).await.is_err() {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// The durable, append-only conversation log for one Soul.
///
/// Owns its file handle and in-memory mirror exclusively; at most one
/// writer may hold a `Context` for a given active file at a time.
pub struct Context {
    dir: PathBuf,
    stem: String,
    active_path: PathBuf,
    /// Mirrors the active file line for line.
    lines: Vec<ContextLine>,
    /// Cached copy of the `Message` lines in `lines`, for O(1) `history()`.
    messages: Vec<Message>,
    token_count: u64,
    next_checkpoint_id: u32,
    n_checkpoints: u32,
}

impl Context {
    /// Opens (creating if necessary) the context file at `path` and
    /// restores in-memory state from it. `path`'s file stem (e.g.
    /// `"context"` or `"subagent_3"`) is used as the rotation prefix for
    /// future `revert_to`/`clear` calls.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let active_path = path.as_ref().to_path_buf();
        let dir = active_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = active_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("context")
            .to_string();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(&dir).await?;
        }
        if fs::metadata(&active_path).await.is_err() {
            fs::File::create(&active_path).await?;
        }
        let mut ctx = Context {
            dir,
            stem,
            active_path,
            lines: Vec::new(),
            messages: Vec::new(),
            token_count: 0,
            next_checkpoint_id: 0,
            n_checkpoints: 0,
        };
        ctx.restore().await?;
        Ok(ctx)
    }

    /// Rebuilds in-memory state by scanning the active file line by line.
    /// After this call, the in-memory state exactly mirrors the file.
    pub async fn restore(&mut self) -> Result<(), ContextError> {
        let contents = fs::read_to_string(&self.active_path).await?;
        let mut lines = Vec::new();
        let mut messages = Vec::new();
        let mut token_count = 0u64;
        let mut max_checkpoint: Option<u32> = None;
        let mut n_checkpoints = 0u32;
        for (lineno, raw) in contents.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let line = match ContextLine::from_line(raw) {
                Ok(l) => l,
                Err(e) => {
                    warn!(line = lineno, error = %e, "skipping malformed context line");
                    continue;
                }
            };
            match &line {
                ContextLine::Message(m) => messages.push(m.clone()),
                ContextLine::Checkpoint { id } => {
                    n_checkpoints += 1;
                    max_checkpoint = Some(max_checkpoint.map_or(*id, |m| m.max(*id)));
                }
                ContextLine::Usage { token_count: tc } => token_count = *tc,
            }
            lines.push(line);
        }
        self.lines = lines;
        self.messages = messages;
        self.token_count = token_count;
        self.n_checkpoints = n_checkpoints;
        self.next_checkpoint_id = max_checkpoint.map_or(0, |m| m + 1);
        debug!(
            messages = self.messages.len(),
            checkpoints = self.n_checkpoints,
            token_count = self.token_count,
            "context restored"
        );
        Ok(())
    }

    async fn write_lines(&mut self, new_lines: &[ContextLine]) -> Result<(), ContextError> {
        let mut buf = String::new();
        for line in new_lines {
            buf.push_str(&line.to_line());
        }
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.active_path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Appends one or more messages to the log.
    pub async fn append(&mut self, msgs: Vec<Message>) -> Result<(), ContextError> {
        if msgs.is_empty() {
            return Ok(());
        }
        let new_lines: Vec<ContextLine> =
            msgs.iter().cloned().map(ContextLine::Message).collect();
        self.write_lines(&new_lines).await?;
        self.messages.extend(msgs);
        self.lines.extend(new_lines);
        Ok(())
    }

    /// Sets cumulative token usage and records a `_usage` marker.
    pub async fn update_usage(&mut self, tokens: u64) -> Result<(), ContextError> {
        let line = ContextLine::Usage { token_count: tokens };
        self.write_lines(std::slice::from_ref(&line)).await?;
        self.lines.push(line);
        self.token_count = tokens;
        Ok(())
    }

    /// Allocates a new checkpoint id, writes its marker, and optionally
    /// appends a synthetic `CHECKPOINT <id>` user message. Returns the id.
    pub async fn checkpoint(&mut self, add_user_message: bool) -> Result<u32, ContextError> {
        let id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        let line = ContextLine::Checkpoint { id };
        self.write_lines(std::slice::from_ref(&line)).await?;
        self.lines.push(line);
        self.n_checkpoints += 1;
        if add_user_message {
            self.append(vec![Message::user(format!("CHECKPOINT {id}"))])
                .await?;
        }
        Ok(id)
    }

    /// Rotates the active file aside and rewrites it with only the prefix
    /// that precedes the `_checkpoint{id}` marker (the marker itself is not
    /// copied). Rotated files are left on disk for debugging.
    pub async fn revert_to(&mut self, id: u32) -> Result<(), ContextError> {
        let cut = self
            .lines
            .iter()
            .position(|l| l.checkpoint_id() == Some(id))
            .ok_or(ContextError::CheckpointNotFound(id))?;
        self.rotate_and_replace(&self.lines[..cut].to_vec()).await
    }

    /// Drops all content, rotating the current file aside and opening a
    /// fresh, empty one.
    pub async fn clear(&mut self) -> Result<(), ContextError> {
        self.rotate_and_replace(&[]).await
    }

    async fn rotate_and_replace(&mut self, surviving: &[ContextLine]) -> Result<(), ContextError> {
        let rotated = lowest_unused_rotation(&self.dir, &self.stem).await?;
        fs::rename(&self.active_path, &rotated).await?;
        fs::File::create(&self.active_path).await?;

        let mut messages = Vec::new();
        let mut token_count = 0u64;
        let mut max_checkpoint: Option<u32> = None;
        let mut n_checkpoints = 0u32;
        for line in surviving {
            match line {
                ContextLine::Message(m) => messages.push(m.clone()),
                ContextLine::Checkpoint { id } => {
                    n_checkpoints += 1;
                    max_checkpoint = Some(max_checkpoint.map_or(*id, |m| m.max(*id)));
                }
                ContextLine::Usage { token_count: tc } => token_count = *tc,
            }
        }

        if !surviving.is_empty() {
            self.write_lines(surviving).await?;
        }
        self.lines = surviving.to_vec();
        self.messages = messages;
        self.token_count = token_count;
        self.n_checkpoints = n_checkpoints;
        self.next_checkpoint_id = max_checkpoint.map_or(0, |m| m + 1);
        Ok(())
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn n_checkpoints(&self) -> u32 {
        self.n_checkpoints
    }

    pub fn next_checkpoint_id(&self) -> u32 {
        self.next_checkpoint_id
    }

    pub fn active_path(&self) -> &Path {
        &self.active_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ReturnValue;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_restore_is_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("context.jsonl");
        {
            let mut ctx = Context::open(&path).await.unwrap();
            ctx.append(vec![Message::user("hi")]).await.unwrap();
            ctx.append(vec![Message::system("sys")]).await.unwrap();
            ctx.update_usage(42).await.unwrap();
        }
        let mut reopened = Context::open(&path).await.unwrap();
        assert_eq!(reopened.history().len(), 2);
        assert_eq!(reopened.token_count(), 42);
        reopened.restore().await.unwrap();
        assert_eq!(reopened.history().len(), 2);
    }

    #[tokio::test]
    async fn checkpoint_ids_are_monotonic() {
        let dir = tempdir().unwrap();
        let mut ctx = Context::open(dir.path().join("context.jsonl")).await.unwrap();
        let a = ctx.checkpoint(false).await.unwrap();
        let b = ctx.checkpoint(false).await.unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(ctx.n_checkpoints(), 2);
        assert_eq!(ctx.next_checkpoint_id(), 2);
    }

    #[tokio::test]
    async fn checkpoint_with_user_message_appends_marker() {
        let dir = tempdir().unwrap();
        let mut ctx = Context::open(dir.path().join("context.jsonl")).await.unwrap();
        ctx.checkpoint(true).await.unwrap();
        assert_eq!(ctx.history().len(), 1);
        assert_eq!(ctx.history()[0].text(), "CHECKPOINT 0");
    }

    #[tokio::test]
    async fn revert_to_drops_only_messages_strictly_after_checkpoint() {
        let dir = tempdir().unwrap();
        let mut ctx = Context::open(dir.path().join("context.jsonl")).await.unwrap();
        ctx.append(vec![Message::user("a")]).await.unwrap();
        ctx.checkpoint(false).await.unwrap(); // checkpoint 0
        ctx.append(vec![Message::user("b")]).await.unwrap();
        ctx.checkpoint(false).await.unwrap(); // checkpoint 1
        ctx.append(vec![Message::user("c")]).await.unwrap();

        ctx.revert_to(1).await.unwrap();
        assert_eq!(ctx.history().len(), 2); // "a", "b"
        assert_eq!(ctx.n_checkpoints(), 1);
        assert_eq!(ctx.next_checkpoint_id(), 1);
    }

    #[tokio::test]
    async fn revert_to_out_of_range_is_rejected_with_no_state_change() {
        let dir = tempdir().unwrap();
        let mut ctx = Context::open(dir.path().join("context.jsonl")).await.unwrap();
        ctx.append(vec![Message::user("a")]).await.unwrap();
        ctx.checkpoint(false).await.unwrap();
        let before_len = ctx.history().len();
        let err = ctx.revert_to(99).await.unwrap_err();
        assert!(matches!(err, ContextError::CheckpointNotFound(99)));
        assert_eq!(ctx.history().len(), before_len);
    }

    #[tokio::test]
    async fn clear_drops_everything_and_rotates_old_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("context.jsonl");
        let mut ctx = Context::open(&path).await.unwrap();
        ctx.append(vec![Message::user("a")]).await.unwrap();
        ctx.checkpoint(false).await.unwrap();
        ctx.clear().await.unwrap();
        assert_eq!(ctx.history().len(), 0);
        assert_eq!(ctx.n_checkpoints(), 0);
        assert_eq!(ctx.next_checkpoint_id(), 0);
        assert!(dir.path().join("context_0.jsonl").exists());
    }

    #[tokio::test]
    async fn rotation_files_use_lowest_unused_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("context.jsonl");
        let mut ctx = Context::open(&path).await.unwrap();
        ctx.checkpoint(false).await.unwrap();
        ctx.clear().await.unwrap(); // rotates to context_0.jsonl
        ctx.checkpoint(false).await.unwrap();
        ctx.clear().await.unwrap(); // rotates to context_1.jsonl
        assert!(dir.path().join("context_0.jsonl").exists());
        assert!(dir.path().join("context_1.jsonl").exists());
    }

    #[tokio::test]
    async fn tool_result_messages_round_trip_through_restore() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("context.jsonl");
        {
            let mut ctx = Context::open(&path).await.unwrap();
            ctx.append(vec![Message::tool_result("c1", ReturnValue::ok("done"))])
                .await
                .unwrap();
        }
        let reopened = Context::open(&path).await.unwrap();
        assert_eq!(reopened.history().len(), 1);
        assert!(reopened.history()[0].tool_result.is_some());
    }
}
