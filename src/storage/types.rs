use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatkeepError, Result};

/// Free-form metadata attached to conversations and messages
pub type Metadata = BTreeMap<String, Value>;

/// Metadata key carrying the code language hint of a message
pub const LANGUAGE_KEY: &str = "language";

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model
    System,
    /// The human side of the conversation
    User,
    /// The model's replies
    Assistant,
}

impl Role {
    /// All accepted roles, in display order
    pub const ALL: [Role; 3] = [Role::System, Role::User, Role::Assistant];

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized label used by the renderers
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatkeepError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ChatkeepError::Validation(format!(
                "invalid role '{}', expected one of: system, user, assistant",
                other
            ))),
        }
    }
}

/// A single role-tagged entry of a conversation
///
/// Role, content and timestamp are fixed once the message exists; only the
/// metadata map can be annotated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: Metadata,
}

impl Message {
    pub(crate) fn new(role: Role, content: String, metadata: Metadata) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Who sent the message
    pub fn role(&self) -> Role {
        self.role
    }

    /// Message text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// When the message was appended
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Message metadata (language hints and the like)
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Code language hint, if the message carries one
    pub fn language(&self) -> Option<&str> {
        self.metadata
            .get(LANGUAGE_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Add or replace a metadata entry
    pub fn annotate(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}

/// A persisted, ordered sequence of messages with title/model/metadata
///
/// Messages are only ever appended; nothing reorders or rewrites them.
///
/// # Examples
///
/// ```
/// use chatkeep::storage::{Conversation, Role};
///
/// let mut conversation = Conversation::new("c-1", "Deploy notes", "ai/gemma3");
/// conversation.append_message("user", "How do I deploy?", Default::default()).unwrap();
/// assert_eq!(conversation.messages().len(), 1);
/// assert_eq!(conversation.messages()[0].role(), Role::User);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    title: String,
    model: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with `created_at == updated_at`
    ///
    /// Identifier uniqueness is the store's job; use
    /// [`ConversationStore::create`](crate::storage::ConversationStore::create)
    /// to get a fresh id.
    pub fn new(id: impl Into<String>, title: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            model: model.into(),
            created_at: now,
            updated_at: now,
            metadata: Metadata::new(),
            messages: Vec::new(),
        }
    }

    /// Unique identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Associated model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last mutation
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Conversation-level metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages sent by `role`, in insertion order
    pub fn messages_with_role(&self, role: Role) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.role == role)
    }

    /// The messages as `{"role", "content"}` objects, the shape chat
    /// completion APIs accept
    ///
    /// Timestamps and metadata are left out.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::storage::Conversation;
    ///
    /// let mut conversation = Conversation::new("c-1", "Greeting", "ai/gemma3");
    /// conversation.append_message("user", "Hi", Default::default()).unwrap();
    /// let messages = conversation.chat_messages();
    /// assert_eq!(messages[0]["role"], "user");
    /// assert_eq!(messages[0]["content"], "Hi");
    /// ```
    pub fn chat_messages(&self) -> Vec<Value> {
        self.messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect()
    }

    /// Append a message, validating the role
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` if `role` is not one of
    /// system, user or assistant.
    pub fn append_message(
        &mut self,
        role: &str,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> Result<&Message> {
        let role: Role = role.parse()?;
        Ok(self.push(role, content.into(), metadata))
    }

    pub(crate) fn push(&mut self, role: Role, content: String, metadata: Metadata) -> &Message {
        let message = Message::new(role, content, metadata);
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Annotate the metadata of an existing message
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` if `index` is out of range.
    pub fn annotate_message(
        &mut self,
        index: usize,
        key: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        let len = self.messages.len();
        let message = self.messages.get_mut(index).ok_or_else(|| {
            ChatkeepError::Validation(format!(
                "message index {} out of range (conversation has {} messages)",
                index, len
            ))
        })?;
        message.annotate(key, value);
        self.touch();
        Ok(())
    }

    /// Add or replace a conversation metadata entry
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
        self.touch();
    }

    // updated_at never moves backwards, even if the clock does
    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Lightweight listing view of this conversation
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            model: self.model.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }

    /// Check the invariants a freshly deserialized record must satisfy
    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ChatkeepError::Validation("conversation id is empty".to_string()).into());
        }
        if self.updated_at < self.created_at {
            return Err(ChatkeepError::Validation(format!(
                "conversation {} was updated before it was created",
                self.id
            ))
            .into());
        }
        Ok(())
    }
}

/// Cached listing metadata for a stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Unique identifier for the conversation
    pub id: String,
    /// User-friendly title
    pub title: String,
    /// The model used in the conversation
    pub model: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the conversation
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parses_case_insensitively() {
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert_eq!(" assistant ".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("SYSTEM".parse::<Role>().unwrap(), Role::System);
    }

    #[test]
    fn test_role_rejects_unknown_values() {
        let err = "tool".parse::<Role>().unwrap_err();
        assert!(matches!(err, ChatkeepError::Validation(_)));
    }

    #[test]
    fn test_new_conversation_has_equal_timestamps() {
        let conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        assert_eq!(conversation.created_at(), conversation.updated_at());
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn test_append_preserves_call_order() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        for i in 0..5 {
            conversation
                .append_message("user", format!("message {}", i), Metadata::new())
                .unwrap();
        }
        let contents: Vec<&str> = conversation.messages().iter().map(|m| m.content()).collect();
        assert_eq!(
            contents,
            vec!["message 0", "message 1", "message 2", "message 3", "message 4"]
        );
    }

    #[test]
    fn test_append_invalid_role_leaves_conversation_untouched() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        let before = conversation.clone();
        assert!(conversation
            .append_message("narrator", "hello", Metadata::new())
            .is_err());
        assert_eq!(conversation, before);
    }

    #[test]
    fn test_append_bumps_updated_at() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        let created = conversation.created_at();
        std::thread::sleep(std::time::Duration::from_millis(5));
        conversation
            .append_message("assistant", "hi", Metadata::new())
            .unwrap();
        assert!(conversation.updated_at() > created);
        assert_eq!(conversation.created_at(), created);
    }

    #[test]
    fn test_annotate_message_only_changes_metadata() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        conversation
            .append_message("assistant", "fn main() {}", Metadata::new())
            .unwrap();
        let original = conversation.messages()[0].clone();

        conversation
            .annotate_message(0, LANGUAGE_KEY, json!("rust"))
            .unwrap();

        let annotated = &conversation.messages()[0];
        assert_eq!(annotated.role(), original.role());
        assert_eq!(annotated.content(), original.content());
        assert_eq!(annotated.timestamp(), original.timestamp());
        assert_eq!(annotated.language(), Some("rust"));
    }

    #[test]
    fn test_annotate_message_out_of_range() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        assert!(conversation.annotate_message(3, "k", json!(1)).is_err());
    }

    #[test]
    fn test_document_schema_field_names() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        conversation
            .append_message("user", "hello", Metadata::new())
            .unwrap();
        let value = serde_json::to_value(&conversation).unwrap();
        for key in [
            "id",
            "title",
            "model",
            "created_at",
            "updated_at",
            "metadata",
            "messages",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        let message = &value["messages"][0];
        assert_eq!(message["role"], "user");
        assert_eq!(message["content"], "hello");
        assert!(message.get("timestamp").is_some());
        assert!(message["metadata"].is_object());
    }

    #[test]
    fn test_unknown_role_in_document_fails_to_parse() {
        let doc = r#"{
            "id": "x", "title": "t", "model": "m",
            "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z",
            "messages": [{"role": "robot", "content": "beep", "timestamp": "2025-01-01T00:00:00Z"}]
        }"#;
        assert!(serde_json::from_str::<Conversation>(doc).is_err());
    }

    #[test]
    fn test_summary_counts_messages() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        conversation.append_message("user", "a", Metadata::new()).unwrap();
        conversation
            .append_message("assistant", "b", Metadata::new())
            .unwrap();
        let summary = conversation.summary();
        assert_eq!(summary.id, "id-1");
        assert_eq!(summary.message_count, 2);
    }

    #[test]
    fn test_messages_with_role_and_chat_messages() {
        let mut conversation = Conversation::new("id-1", "Title", "ai/gemma3");
        conversation.append_message("system", "be brief", Metadata::new()).unwrap();
        conversation.append_message("user", "q1", Metadata::new()).unwrap();
        conversation.append_message("assistant", "a1", Metadata::new()).unwrap();
        conversation.append_message("user", "q2", Metadata::new()).unwrap();

        let asked: Vec<&str> = conversation
            .messages_with_role(Role::User)
            .map(|m| m.content())
            .collect();
        assert_eq!(asked, vec!["q1", "q2"]);

        let chat = conversation.chat_messages();
        assert_eq!(chat.len(), 4);
        assert_eq!(chat[0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(chat[2], json!({"role": "assistant", "content": "a1"}));
    }

    #[test]
    fn test_metadata_edits_never_move_updated_at_backwards() {
        let doc = json!({
            "id": "future", "title": "t", "model": "m",
            "created_at": "2999-01-01T00:00:00Z",
            "updated_at": "2999-01-01T00:00:00Z",
            "messages": [{"role": "user", "content": "hi", "timestamp": "2999-01-01T00:00:00Z"}]
        });
        let mut conversation: Conversation = serde_json::from_value(doc).unwrap();
        let before = conversation.updated_at();

        conversation.insert_metadata("tags", json!(["later"]));
        conversation.annotate_message(0, LANGUAGE_KEY, json!("rust")).unwrap();

        assert_eq!(conversation.updated_at(), before);
        assert!(conversation.validate().is_ok());
    }
}
