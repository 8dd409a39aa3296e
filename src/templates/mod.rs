//! Reusable conversation templates
//!
//! A [`Template`] is an ordered list of role/content pairs whose content may
//! reference `{{name}}` placeholders. [`TemplateManager::instantiate`] fills
//! the placeholders, seeds a new conversation with the rendered messages and
//! persists it through the [`ConversationStore`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ModelConfig, ModelConfigProvider};
use crate::error::{ChatkeepError, Result};
use crate::storage::atomic::create_atomic;
use crate::storage::{validate_id, Conversation, ConversationStore, Metadata, Role};

pub mod builtin;
pub mod placeholder;

pub use builtin::builtin_templates;
pub use placeholder::{placeholders, substitute};

/// Conversation metadata key recording the source template id
pub const TEMPLATE_ID_KEY: &str = "template_id";
/// Conversation metadata key holding the effective model parameters
pub const MODEL_CONFIG_KEY: &str = "model_config";

const TEMPLATE_EXTENSION: &str = "json";

fn default_category() -> String {
    "general".to_string()
}

pub(crate) fn default_template_model() -> String {
    "ai/gemma3".to_string()
}

/// One message skeleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMessage {
    /// Role of the rendered message
    pub role: Role,
    /// Content with `{{name}}` placeholders
    pub content_template: String,
}

impl TemplateMessage {
    /// Create a message skeleton
    pub fn new(role: Role, content_template: impl Into<String>) -> Self {
        Self {
            role,
            content_template: content_template.into(),
        }
    }
}

/// A reusable, parameterized conversation skeleton
///
/// Templates are immutable once stored: there is no update, only create
/// (under a new id) and delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique identifier, also the file name
    pub id: String,
    /// Display name
    pub name: String,
    /// What the template is for
    #[serde(default)]
    pub description: String,
    /// Grouping used by `categories`
    #[serde(default = "default_category")]
    pub category: String,
    /// Free-form search tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared placeholder names
    #[serde(default)]
    pub variables: Vec<String>,
    /// Ordered message skeletons
    pub messages: Vec<TemplateMessage>,
    /// Model used when the caller does not pick one
    #[serde(default = "default_template_model")]
    pub default_model: String,
    /// Parameters layered over the model defaults
    #[serde(default)]
    pub model_config: ModelConfig,
    /// When the template was created
    pub created_at: DateTime<Utc>,
}

impl Template {
    /// Start a new template with a fresh id and no messages
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            category: default_category(),
            tags: Vec::new(),
            variables: Vec::new(),
            messages: Vec::new(),
            default_model: default_template_model(),
            model_config: ModelConfig::default(),
            created_at: Utc::now(),
        }
    }

    /// Append a message skeleton, declaring any placeholders it references
    pub fn with_message(mut self, role: Role, content_template: impl Into<String>) -> Self {
        let message = TemplateMessage::new(role, content_template);
        for name in placeholders(&message.content_template) {
            if !self.variables.contains(&name) {
                self.variables.push(name);
            }
        }
        self.messages.push(message);
        self
    }

    /// Every placeholder referenced across all messages
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        self.messages
            .iter()
            .flat_map(|m| placeholders(&m.content_template))
            .collect()
    }

    /// Check the structural invariants of a template
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` if the id is not usable as a file
    /// name, the name is blank, there are no messages, or a placeholder is
    /// referenced without being declared in `variables`.
    pub fn validate(&self) -> Result<()> {
        validate_id(&self.id)
            .map_err(|_| ChatkeepError::Validation(format!("invalid template id '{}'", self.id)))?;
        if self.name.trim().is_empty() {
            return Err(ChatkeepError::Validation(format!("template {} has no name", self.id)).into());
        }
        if self.messages.is_empty() {
            return Err(
                ChatkeepError::Validation(format!("template {} has no messages", self.id)).into(),
            );
        }

        let undeclared: Vec<String> = self
            .referenced_variables()
            .into_iter()
            .filter(|name| !self.variables.contains(name))
            .collect();
        if !undeclared.is_empty() {
            return Err(ChatkeepError::Validation(format!(
                "template {} references undeclared variables: {}",
                self.id,
                undeclared.join(", ")
            ))
            .into());
        }
        Ok(())
    }

    /// Render every message with `values`
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::MissingVariable` listing every referenced
    /// placeholder without a value.
    pub fn render(&self, values: &HashMap<String, String>) -> Result<Vec<(Role, String)>> {
        let referenced = self.referenced_variables();
        let missing: Vec<String> = referenced
            .iter()
            .filter(|name| !values.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ChatkeepError::MissingVariable { variables: missing }.into());
        }

        let mut extra: Vec<&String> = values.keys().filter(|k| !referenced.contains(*k)).collect();
        if !extra.is_empty() {
            extra.sort();
            tracing::debug!("Template {} ignores extra variables: {:?}", self.id, extra);
        }

        Ok(self
            .messages
            .iter()
            .map(|m| (m.role, substitute(&m.content_template, values)))
            .collect())
    }

    fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(query))
    }
}

/// Inputs to [`TemplateManager::instantiate`]
#[derive(Debug, Clone, Default)]
pub struct InstantiateRequest {
    /// Placeholder values
    pub values: HashMap<String, String>,
    /// Parameters layered over the template's own
    pub overrides: ModelConfig,
    /// Conversation title; defaults to the template name and current time
    pub title: Option<String>,
    /// Model; defaults to the template's default model
    pub model: Option<String>,
}

/// Directory-backed template library
#[derive(Debug, Clone)]
pub struct TemplateManager {
    dir: PathBuf,
}

impl TemplateManager {
    /// Open (and create if needed) a template directory
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ChatkeepError::io(format!("create template directory {}", dir.display()), e)
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the templates
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)
            .map_err(|_| ChatkeepError::Validation(format!("invalid template id '{}'", id)))?;
        Ok(self.dir.join(format!("{}.{}", id, TEMPLATE_EXTENSION)))
    }

    /// Store a new template
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` if the template is invalid or a
    /// template with the same id already exists.
    pub fn create(&self, template: Template) -> Result<Template> {
        template.validate()?;
        let path = self.path_for(&template.id)?;
        let json = serde_json::to_vec_pretty(&template)?;
        create_atomic(&path, &json).map_err(|e| {
            if path.exists() {
                anyhow::Error::from(ChatkeepError::Validation(format!(
                    "template {} already exists",
                    template.id
                )))
            } else {
                e
            }
        })?;
        tracing::debug!("Created template {} ({})", template.id, template.name);
        Ok(template)
    }

    /// Load a template by id
    ///
    /// # Errors
    ///
    /// - `ChatkeepError::NotFound` if no such template exists
    /// - `ChatkeepError::Validation` if the stored document is malformed
    pub fn get(&self, id: &str) -> Result<Template> {
        let path = self.path_for(id)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatkeepError::template_not_found(id).into());
            }
            Err(e) => return Err(ChatkeepError::io(format!("load template {}", id), e).into()),
        };
        let template: Template = serde_json::from_slice(&bytes).map_err(|e| {
            ChatkeepError::Validation(format!("malformed template {}: {}", id, e))
        })?;
        if template.id != id {
            return Err(ChatkeepError::Validation(format!(
                "template file {} contains template id {}",
                id, template.id
            ))
            .into());
        }
        template.validate()?;
        Ok(template)
    }

    /// Find a template by name, ignoring case
    pub fn get_by_name(&self, name: &str) -> Result<Template> {
        let wanted = name.to_lowercase();
        self.list()?
            .into_iter()
            .find(|t| t.name.to_lowercase() == wanted)
            .ok_or_else(|| ChatkeepError::template_not_found(name).into())
    }

    /// Resolve an id, falling back to a case-insensitive name lookup
    ///
    /// The name lookup is only tried when no template file has that id, or
    /// when the input could not be an id at all (e.g. `"code review"`). A
    /// template file that exists but is malformed is reported as
    /// `ChatkeepError::Validation`.
    pub fn find(&self, id_or_name: &str) -> Result<Template> {
        if validate_id(id_or_name).is_err() {
            return self.get_by_name(id_or_name);
        }
        match self.get(id_or_name) {
            Ok(template) => Ok(template),
            Err(e) if matches!(crate::error::kind_of(&e), Some(ChatkeepError::NotFound { .. })) => {
                self.get_by_name(id_or_name)
            }
            Err(e) => Err(e),
        }
    }

    /// Every readable template, sorted by name
    ///
    /// Malformed documents are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Template>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| ChatkeepError::io(format!("scan {}", self.dir.display()), e))?;

        let mut templates = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ChatkeepError::io(format!("scan {}", self.dir.display()), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            match self.get(id) {
                Ok(template) => templates.push(template),
                Err(e) => tracing::warn!("Skipping template {}: {}", path.display(), e),
            }
        }

        templates.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(templates)
    }

    /// Templates whose name, description or tags contain `query`, ignoring case
    pub fn search(&self, query: &str) -> Result<Vec<Template>> {
        let query = query.to_lowercase();
        Ok(self
            .list()?
            .into_iter()
            .filter(|t| t.matches(&query))
            .collect())
    }

    /// Distinct categories, sorted
    pub fn categories(&self) -> Result<Vec<String>> {
        let categories: BTreeSet<String> = self.list()?.into_iter().map(|t| t.category).collect();
        Ok(categories.into_iter().collect())
    }

    /// Delete a template; returns whether it existed
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Deleted template {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ChatkeepError::io(format!("delete template {}", id), e).into()),
        }
    }

    /// Write any built-in template that is not already present
    ///
    /// Returns the number of templates written.
    pub fn install_builtin(&self) -> Result<usize> {
        let mut installed = 0;
        for template in builtin_templates() {
            if self.path_for(&template.id)?.exists() {
                continue;
            }
            self.create(template)?;
            installed += 1;
        }
        if installed > 0 {
            tracing::info!("Installed {} built-in templates", installed);
        }
        Ok(installed)
    }

    /// Create and persist a conversation from a template
    ///
    /// The conversation's `model_config` metadata is the provider's defaults
    /// for the model, overlaid by the template's parameters, overlaid by
    /// `request.overrides`.
    ///
    /// # Errors
    ///
    /// - `ChatkeepError::NotFound` if the template does not exist
    /// - `ChatkeepError::MissingVariable` naming every unfilled placeholder
    /// - any error from the provider or from saving the conversation
    pub fn instantiate(
        &self,
        template_id: &str,
        request: &InstantiateRequest,
        store: &ConversationStore,
        provider: &dyn ModelConfigProvider,
    ) -> Result<Conversation> {
        let template = self.get(template_id)?;
        let rendered = template.render(&request.values)?;

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| template.default_model.clone());
        let model_config = provider
            .get_model_config(&model)?
            .overlay(&template.model_config)
            .overlay(&request.overrides);

        let title = request.title.clone().unwrap_or_else(|| {
            format!("{} - {}", template.name, Utc::now().format("%Y-%m-%d %H:%M"))
        });

        let mut conversation = store.create(&title, &model)?;
        conversation.insert_metadata(TEMPLATE_ID_KEY, Value::from(template.id.clone()));
        conversation.insert_metadata(
            "description",
            Value::from(format!("Created from template: {}", template.name)),
        );
        if !template.tags.is_empty() {
            conversation.insert_metadata("tags", Value::from(template.tags.clone()));
        }
        conversation.insert_metadata(MODEL_CONFIG_KEY, serde_json::to_value(&model_config)?);
        for (role, content) in rendered {
            conversation.push(role, content, Metadata::new());
        }

        store.save(&conversation)?;
        tracing::info!(
            "Instantiated template {} as conversation {}",
            template.id,
            conversation.id()
        );
        Ok(conversation)
    }
}
