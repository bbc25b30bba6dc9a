//! Durable storage for the chat session collection
//!
//! The whole collection lives in a single JSON file that is read once at
//! startup and rewritten wholesale after every mutation. Reads never fail:
//! a missing or unparsable file is an empty collection. Writes are
//! best-effort and only logged on failure.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::state::ChatSession;

const SESSIONS_FILE: &str = "sessions.json";

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/aion/sessions.json`, or `./aion/sessions.json`
    /// when the platform has no data directory
    pub fn open_default() -> Self {
        Self::new(default_path(dirs::data_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Vec<ChatSession> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read sessions from {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        let sessions: Vec<ChatSession> = match serde_json::from_str(&content) {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!("Ignoring unparsable sessions file {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        // Ids must stay unique; keep the first occurrence
        let mut seen = HashSet::new();
        let total = sessions.len();
        let sessions: Vec<ChatSession> = sessions
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .collect();
        if sessions.len() != total {
            tracing::warn!(
                "Dropped {} sessions with duplicate ids from {:?}",
                total - sessions.len(),
                self.path
            );
        }

        tracing::debug!("Loaded {} sessions from {:?}", sessions.len(), self.path);
        sessions
    }

    pub fn persist(&self, sessions: &[ChatSession]) {
        if let Err(e) = self.write(sessions) {
            tracing::warn!("Failed to persist sessions to {:?}: {}", self.path, e);
        }
    }

    fn write(&self, sessions: &[ChatSession]) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string(sessions)?;

        // Write to a sibling temp file and rename so readers never see a torn file
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn default_path(data_dir: Option<PathBuf>) -> PathBuf {
    let base = data_dir.unwrap_or_else(|| {
        tracing::warn!("No data directory available; keeping sessions under the current directory");
        PathBuf::from(".")
    });
    base.join("aion").join(SESSIONS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Message, Role};
    use chrono::DateTime;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("aion").join(SESSIONS_FILE))
    }

    #[test]
    fn test_default_path_uses_data_dir() {
        assert_eq!(
            default_path(Some(PathBuf::from("/data"))),
            PathBuf::from("/data/aion/sessions.json")
        );
    }

    #[test]
    fn test_default_path_falls_back_to_current_dir() {
        assert_eq!(default_path(None), PathBuf::from("./aion/sessions.json"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_wrong_shape_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"sessions": []}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut first = ChatSession::new("First");
        first.messages.push(Message::user("hello"));
        first.messages.push(Message {
            role: Role::Model,
            content: "Hello world".to_string(),
            timestamp: DateTime::from_timestamp_millis(1_718_000_000_001).unwrap(),
        });
        let second = ChatSession::new("Second");
        let sessions = vec![second, first];

        store.persist(&sessions);
        assert_eq!(store.load(), sessions);
    }

    #[test]
    fn test_loads_snapshot_written_by_web_client() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        let snapshot = r#"[{"id":"1718000000000","title":"Kuantum fiziğini açıkla","messages":[{"role":"user","content":"Kuantum fiziğini açıkla","timestamp":1718000000000},{"role":"model","content":"Elbette.","timestamp":1718000000001}],"updatedAt":1718000000002}]"#;
        fs::write(store.path(), snapshot).unwrap();

        let sessions = store.load();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "1718000000000");
        assert_eq!(sessions[0].messages[1].role, Role::Model);
        assert_eq!(sessions[0].updated_at.timestamp_millis(), 1_718_000_000_002);

        store.persist(&sessions);
        let reparsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let original: serde_json::Value = serde_json::from_str(snapshot).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let a = ChatSession::new("a");
        let mut b = ChatSession::new("b");
        b.id = a.id.clone();
        store.persist(&[a.clone(), b]);

        let loaded = store.load();
        assert_eq!(loaded, vec![a]);
    }

    #[test]
    fn test_persist_overwrites_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.persist(&[ChatSession::new("a"), ChatSession::new("b")]);
        store.persist(&[]);
        assert!(store.load().is_empty());
    }
}
