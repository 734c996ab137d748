//! Chat sessions: persistent multi-turn history with a sliding window.
//!
//! One JSON record per session at `<home>/chats/<ID>.json`. Ids are three
//! uppercase alphanumerics. Writes go through `utils::write_atomic`;
//! concurrent writers to one id are last-writer-wins.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::HistoryLimits;
use crate::error::{AiError, Result};
use crate::utils::write_atomic;

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_LEN: usize = 3;
const ID_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(deserialize_with = "lenient_time", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub chat_id: String,
    pub model_alias: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(deserialize_with = "lenient_time", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_time", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// RFC 3339, or an offset-less ISO 8601 timestamp taken as local time.
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    )
}

fn lenient_time<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(de)?;
    parse_time(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

impl ChatSession {
    pub fn new(chat_id: impl Into<String>, model_alias: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id: chat_id.into(),
            model_alias: model_alias.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Evict oldest messages until both bounds hold; the last message always survives.
    pub fn enforce_limit(&mut self, max_chars: usize, max_messages: usize) {
        let mut total: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        let mut evict = 0;
        while self.messages.len() - evict > 1
            && (self.messages.len() - evict > max_messages || total > max_chars)
        {
            total -= self.messages[evict].content.chars().count();
            evict += 1;
        }
        if evict > 0 {
            self.messages.drain(..evict);
        }
    }

    /// `ROLE: content` blocks joined by blank lines.
    pub fn format_for_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// History followed by the new user turn.
    pub fn prompt_with_history(&self, prompt: &str) -> String {
        let history = self.format_for_prompt();
        if history.is_empty() {
            format!("USER: {prompt}")
        } else {
            format!("{history}\n\nUSER: {prompt}")
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Uppercased id when `raw` is non-empty ASCII alphanumeric.
pub fn normalize_id(raw: &str) -> Option<String> {
    (!raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| raw.to_ascii_uppercase())
}

/// Exactly three ASCII alphanumerics (any case).
pub fn is_chat_id(token: &str) -> bool {
    token.len() == ID_LEN && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Draw ids until one is not `taken`; a Storage error after `attempts` draws.
fn sample_id(rng: &mut impl Rng, attempts: usize, taken: impl Fn(&str) -> bool) -> Result<String> {
    for _ in 0..attempts {
        let id: String = (0..ID_LEN)
            .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
            .collect();
        if !taken(&id) {
            return Ok(id);
        }
    }
    Err(AiError::Storage(format!(
        "failed to generate a unique chat ID after {attempts} attempts"
    )))
}

/* ---- Store ---- */

#[derive(Debug, Clone)]
pub struct ChatStore {
    dir: PathBuf,
    limits: HistoryLimits,
}

impl ChatStore {
    pub fn new(dir: impl Into<PathBuf>, limits: HistoryLimits) -> Self {
        Self {
            dir: dir.into(),
            limits,
        }
    }

    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Random unused id (rejection sampling, bounded).
    pub fn generate_id(&self) -> Result<String> {
        sample_id(&mut rand::thread_rng(), ID_ATTEMPTS, |id| self.path_for(id).exists())
    }

    /// New in-memory session; persisted on the first `append_turn`.
    pub fn create(&self, model_alias: &str, id: Option<&str>) -> Result<ChatSession> {
        let id = match id {
            Some(raw) if is_chat_id(raw) => raw.to_ascii_uppercase(),
            Some(raw) => {
                return Err(AiError::argument(format!(
                    "invalid chat ID '{raw}': must be {ID_LEN} alphanumeric characters"
                )));
            }
            None => self.generate_id()?,
        };
        Ok(ChatSession::new(id, model_alias))
    }

    /// `None` for unknown ids, invalid ids and unreadable records.
    pub fn load(&self, id: &str) -> Option<ChatSession> {
        let id = normalize_id(id)?;
        let raw = std::fs::read_to_string(self.path_for(&id)).ok()?;
        match serde_json::from_str::<ChatSession>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(chat_id = %id, error = %e, "ignoring unreadable chat record");
                None
            }
        }
    }

    fn record_paths(&self) -> Vec<(PathBuf, SystemTime)> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let mtime = p.metadata().and_then(|m| m.modified()).ok()?;
                Some((p, mtime))
            })
            .collect()
    }

    fn load_path(&self, path: &std::path::Path) -> Option<ChatSession> {
        let stem = path.file_stem()?.to_str()?;
        self.load(stem)
    }

    /// All sessions, most recently updated first.
    pub fn list(&self) -> Vec<ChatSession> {
        let mut sessions: Vec<ChatSession> = self
            .record_paths()
            .iter()
            .filter_map(|(p, _)| self.load_path(p))
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Most recently touched session, by file modification time.
    pub fn latest(&self) -> Option<ChatSession> {
        let mut paths = self.record_paths();
        paths.sort_by(|a, b| b.1.cmp(&a.1));
        paths.iter().find_map(|(p, _)| self.load_path(p))
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(id) = normalize_id(id) else {
            return Ok(false);
        };
        match std::fs::remove_file(self.path_for(&id)) {
            Ok(()) => {
                tracing::debug!(chat_id = %id, "chat deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let body = serde_json::to_string_pretty(session)
            .map_err(|e| AiError::Storage(format!("cannot serialize chat: {e}")))?;
        write_atomic(&self.path_for(&session.chat_id), body.as_bytes())?;
        Ok(())
    }

    /// Append a user/assistant pair, trim to the window and persist.
    pub fn append_turn(&self, session: &mut ChatSession, user: &str, assistant: &str) -> Result<()> {
        session.messages.push(Message::new(Role::User, user));
        session.messages.push(Message::new(Role::Assistant, assistant));
        session.updated_at = Utc::now();
        session.enforce_limit(self.limits.max_chars, self.limits.max_messages);
        self.save(session)?;
        tracing::debug!(
            chat_id = %session.chat_id,
            messages = session.messages.len(),
            "chat turn saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ChatStore {
        ChatStore::new(dir.path().join("chats"), HistoryLimits::default())
    }

    fn session_with(n: usize) -> ChatSession {
        let mut s = ChatSession::new("ABC", "sonnet");
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            s.messages.push(Message::new(role, format!("message {i}")));
        }
        s
    }

    #[test]
    fn enforce_limit_keeps_most_recent_in_order() {
        let mut s = session_with(15);
        s.enforce_limit(4000, 10);
        assert_eq!(s.messages.len(), 10);
        let contents: Vec<_> = s.messages.iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<String> = (5..15).map(|i| format!("message {i}")).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn enforce_limit_never_empties_and_is_idempotent() {
        let mut s = ChatSession::new("ABC", "sonnet");
        s.messages.push(Message::new(Role::User, "x".repeat(50)));
        s.messages.push(Message::new(Role::Assistant, "y".repeat(50)));
        s.enforce_limit(10, 10);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].content, "y".repeat(50));
        let snapshot = s.clone();
        s.enforce_limit(10, 10);
        assert_eq!(s, snapshot);
    }

    #[test]
    fn enforce_limit_counts_chars_not_bytes() {
        let mut s = ChatSession::new("ABC", "sonnet");
        s.messages.push(Message::new(Role::User, "é".repeat(3)));
        s.messages.push(Message::new(Role::Assistant, "ü".repeat(3)));
        s.enforce_limit(6, 10);
        assert_eq!(s.messages.len(), 2);
    }

    #[test]
    fn format_for_prompt_renders_roles() {
        let mut s = ChatSession::new("ABC", "sonnet");
        assert_eq!(s.format_for_prompt(), "");
        assert_eq!(s.prompt_with_history("hi"), "USER: hi");
        s.messages.push(Message::new(Role::User, "hi"));
        s.messages.push(Message::new(Role::Assistant, "hello"));
        assert_eq!(s.format_for_prompt(), "USER: hi\n\nASSISTANT: hello");
        assert_eq!(
            s.prompt_with_history("again"),
            "USER: hi\n\nASSISTANT: hello\n\nUSER: again"
        );
    }

    #[test]
    fn session_round_trips_through_json() {
        let s = session_with(3);
        let raw = serde_json::to_string(&s).unwrap();
        assert!(raw.contains(r#""role":"user""#));
        let back: ChatSession = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn create_normalizes_and_validates_ids() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        assert_eq!(st.create("sonnet", Some("ab1")).unwrap().chat_id, "AB1");
        assert!(st.create("sonnet", Some("../x")).is_err());
        assert!(st.create("sonnet", Some("ABCD")).is_err());
        assert!(st.create("sonnet", Some("AB")).is_err());
        let fresh = st.create("sonnet", None).unwrap();
        assert!(is_chat_id(&fresh.chat_id));
        assert_eq!(fresh.chat_id, fresh.chat_id.to_ascii_uppercase());
    }

    #[test]
    fn append_turn_persists_and_trims() {
        let dir = TempDir::new().unwrap();
        let st = ChatStore::new(
            dir.path().join("chats"),
            HistoryLimits {
                max_chars: 4000,
                max_messages: 4,
            },
        );
        let mut s = st.create("sonnet", Some("XYZ")).unwrap();
        for i in 0..3 {
            st.append_turn(&mut s, &format!("q{i}"), &format!("a{i}")).unwrap();
        }
        let loaded = st.load("xyz").unwrap();
        assert_eq!(loaded.messages.len(), 4);
        assert_eq!(loaded.messages[0].content, "q1");
        assert_eq!(loaded.model_alias, "sonnet");
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_records() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        assert!(st.load("NOP").is_none());
        assert!(st.load("../etc").is_none());
        std::fs::create_dir_all(dir.path().join("chats")).unwrap();
        std::fs::write(dir.path().join("chats/BAD.json"), "{").unwrap();
        assert!(st.load("BAD").is_none());
        assert!(st.list().is_empty());
    }

    #[test]
    fn list_orders_by_updated_and_delete_reports() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        let mut a = st.create("sonnet", Some("AAA")).unwrap();
        st.append_turn(&mut a, "q", "a").unwrap();
        let mut b = st.create("opus", Some("BBB")).unwrap();
        st.append_turn(&mut b, "q", "a").unwrap();

        let ids: Vec<_> = st.list().into_iter().map(|s| s.chat_id).collect();
        assert_eq!(ids, vec!["BBB", "AAA"]);

        assert!(st.delete("aaa").unwrap());
        assert!(!st.delete("AAA").unwrap());
        assert!(!st.delete("../x").unwrap());
        assert_eq!(st.list().len(), 1);
    }

    #[test]
    fn generated_ids_avoid_existing_records() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        let mut s = st.create("sonnet", None).unwrap();
        st.append_turn(&mut s, "q", "a").unwrap();
        for _ in 0..20 {
            assert_ne!(st.generate_id().unwrap(), s.chat_id);
        }
    }

    fn touch(path: &std::path::Path, secs_ago: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - std::time::Duration::from_secs(secs_ago))
            .unwrap();
    }

    #[test]
    fn latest_follows_modification_time() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        assert!(st.latest().is_none());
        for id in ["AAA", "BBB", "CCC"] {
            let mut s = st.create("sonnet", Some(id)).unwrap();
            st.append_turn(&mut s, "q", "a").unwrap();
        }
        let chats = dir.path().join("chats");
        touch(&chats.join("AAA.json"), 10);
        touch(&chats.join("BBB.json"), 300);
        touch(&chats.join("CCC.json"), 60);
        assert_eq!(st.latest().unwrap().chat_id, "AAA");

        // updated_at does not decide: CCC was written last
        assert_eq!(st.list()[0].chat_id, "CCC");
    }

    #[test]
    fn id_sampling_gives_up_after_bounded_attempts() {
        let mut rng = rand::thread_rng();
        let err = sample_id(&mut rng, 5, |_| true).unwrap_err();
        assert!(matches!(err, AiError::Storage(_)));
        assert!(err.to_string().contains("5 attempts"));

        let calls = std::cell::Cell::new(0);
        let id = sample_id(&mut rng, 5, |_| {
            calls.set(calls.get() + 1);
            calls.get() < 4
        })
        .unwrap();
        assert_eq!(calls.get(), 4);
        assert!(is_chat_id(&id));
    }

    #[test]
    fn records_with_offsetless_timestamps_load() {
        let dir = TempDir::new().unwrap();
        let st = store(&dir);
        std::fs::create_dir_all(dir.path().join("chats")).unwrap();
        std::fs::write(
            dir.path().join("chats/K7P.json"),
            r#"{
  "chat_id": "K7P",
  "model_alias": "sonnet",
  "messages": [
    {"role": "user", "content": "hi", "timestamp": "2025-01-01T12:00:00.123456"},
    {"role": "assistant", "content": "hello", "timestamp": "2025-01-01T12:00:05"}
  ],
  "created_at": "2025-01-01T12:00:00.123456",
  "updated_at": "2025-01-01T12:00:05.000001"
}"#,
        )
        .unwrap();

        let loaded = st.load("K7P").unwrap();
        assert_eq!(loaded.messages.len(), 2);
        let naive = NaiveDateTime::parse_from_str("2025-01-01T12:00:00.123456", "%Y-%m-%dT%H:%M:%S%.f")
            .unwrap();
        assert_eq!(loaded.created_at.with_timezone(&Local).naive_local(), naive);
        assert!(loaded.updated_at > loaded.created_at);
        assert_eq!(st.latest().unwrap().chat_id, "K7P");
        assert_eq!(st.list().len(), 1);
    }

    #[test]
    fn missing_timestamps_default_and_bad_ones_reject() {
        let s: ChatSession = serde_json::from_str(
            r#"{"chat_id":"ABC","model_alias":"sonnet","messages":[{"role":"user","content":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(s.messages.len(), 1);
        assert!(parse_time("2025-01-01T12:00:00+02:00").is_some());
        assert!(parse_time("yesterday").is_none());
    }
}
