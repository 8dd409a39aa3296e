//! Templates shipped with chatkeep

use chrono::Utc;

use super::{Template, TemplateMessage};
use crate::config::ModelConfig;
use crate::storage::Role;

struct Builtin {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    tags: &'static [&'static str],
    system: &'static str,
    user: &'static str,
    variables: &'static [&'static str],
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: "code-review",
        name: "Code Review",
        description: "Template for code review conversations",
        category: "development",
        tags: &["code", "review", "development"],
        system: "You are an expert code reviewer. Provide detailed, constructive feedback on \
                 code quality, best practices, and potential improvements.",
        user: "Please review the following {{language}} code:\n\n```{{language}}\n{{code}}\n```\n\n\
               Focus on: {{focus_areas}}",
        variables: &["language", "code", "focus_areas"],
    },
    Builtin {
        id: "technical-documentation",
        name: "Technical Documentation",
        description: "Template for generating technical documentation",
        category: "documentation",
        tags: &["documentation", "technical", "writing"],
        system: "You are a technical writer who creates clear, comprehensive documentation. \
                 Focus on clarity, accuracy, and usefulness for developers.",
        user: "Create documentation for {{project_name}}:\n\nType: {{doc_type}}\n\
               Audience: {{audience}}\nKey topics to cover: {{topics}}\n\n\
               Additional requirements: {{requirements}}",
        variables: &["project_name", "doc_type", "audience", "topics", "requirements"],
    },
    Builtin {
        id: "problem-solving",
        name: "Problem Solving",
        description: "Template for structured problem-solving conversations",
        category: "analysis",
        tags: &["problem-solving", "analysis", "debugging"],
        system: "You are a systematic problem solver. Break down complex problems into \
                 manageable parts and provide step-by-step solutions.",
        user: "I need help solving this problem:\n\nProblem: {{problem_description}}\n\n\
               Context: {{context}}\nConstraints: {{constraints}}\n\
               Desired outcome: {{desired_outcome}}",
        variables: &["problem_description", "context", "constraints", "desired_outcome"],
    },
    Builtin {
        id: "learning-assistant",
        name: "Learning Assistant",
        description: "Template for educational conversations",
        category: "education",
        tags: &["learning", "education", "teaching"],
        system: "You are a patient and knowledgeable learning assistant. Explain concepts \
                 clearly, provide examples, and adapt your teaching style to the learner's level.",
        user: "I want to learn about {{topic}}.\n\nMy current level: {{skill_level}}\n\
               Learning goals: {{goals}}\nPreferred learning style: {{learning_style}}\n\
               Time available: {{time_commitment}}",
        variables: &["topic", "skill_level", "goals", "learning_style", "time_commitment"],
    },
    Builtin {
        id: "api-design",
        name: "API Design",
        description: "Template for API design discussions",
        category: "development",
        tags: &["api", "design", "architecture", "development"],
        system: "You are an API design expert. Help design well-structured, RESTful APIs that \
                 follow best practices for security, performance, and maintainability.",
        user: "I need to design an API for {{project_name}}.\n\nPurpose: {{api_purpose}}\n\
               Key entities: {{entities}}\nMain operations: {{operations}}\n\
               Authentication requirements: {{auth_requirements}}\n\
               Performance considerations: {{performance_notes}}",
        variables: &[
            "project_name",
            "api_purpose",
            "entities",
            "operations",
            "auth_requirements",
            "performance_notes",
        ],
    },
];

/// The default template library
pub fn builtin_templates() -> Vec<Template> {
    let now = Utc::now();
    BUILTINS
        .iter()
        .map(|b| Template {
            id: b.id.to_string(),
            name: b.name.to_string(),
            description: b.description.to_string(),
            category: b.category.to_string(),
            tags: b.tags.iter().map(|t| t.to_string()).collect(),
            variables: b.variables.iter().map(|v| v.to_string()).collect(),
            messages: vec![
                TemplateMessage::new(Role::System, b.system),
                TemplateMessage::new(Role::User, b.user),
            ],
            default_model: super::default_template_model(),
            model_config: ModelConfig::default(),
            created_at: now,
        })
        .collect()
}
