//! Prompt templates served by the embedded provider.
//!
//! Templates use mustache-style tags: `{{name}}` and `{{{name}}}` insert a
//! value verbatim, `{{#name}}..{{/name}}` renders its body only when `name`
//! is non-empty, `{{^name}}..{{/name}}` only when it is empty or missing, and
//! `{{! comment}}` is dropped. Missing values render as the empty string.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::config::{load_document, ConfigError, ConfigFormat};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    pub fn new(name: &str, description: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    /// `group/name`, optionally suffixed with `@version`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "arguments", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<PromptArgument>,
    pub template: String,
}

impl PromptTemplate {
    /// Id without its version suffix. This is the name clients see.
    pub fn name(&self) -> &str {
        bare_id(&self.id)
    }

    /// Declared arguments, or the template's fields when none are declared.
    pub fn arguments(&self) -> Vec<PromptArgument> {
        if !self.args.is_empty() {
            return self.args.clone();
        }
        template_fields(&self.template)
            .into_iter()
            .map(|name| PromptArgument {
                name,
                description: None,
                required: false,
            })
            .collect()
    }

    pub fn fill(&self, values: &HashMap<String, String>) -> String {
        fill_template(&self.template, values)
    }

    /// Description used for `prompts/get`: the description, else the title.
    pub fn display_description(&self) -> Option<&str> {
        self.description.as_deref().or(self.title.as_deref())
    }

    /// `prompts/list` entry.
    pub fn to_mcp_value(&self) -> Value {
        let mut value = json!({
            "name": self.name(),
            "arguments": self.arguments(),
        });
        if let Some(title) = &self.title {
            value["title"] = json!(title);
        }
        if let Some(description) = &self.description {
            value["description"] = json!(description);
        }
        value
    }
}

fn bare_id(id: &str) -> &str {
    id.split_once('@').map_or(id, |(bare, _)| bare)
}

/// On-disk prompt file: a group of templates sharing an id prefix and
/// default category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptGroupFile {
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    prompts: Vec<PromptTemplate>,
}

impl PromptGroupFile {
    fn resolved(self) -> Vec<PromptTemplate> {
        let group_id = self.group_id;
        let category = self.category.or_else(|| group_id.clone());
        self.prompts
            .into_iter()
            .map(|mut prompt| {
                if let Some(group) = &group_id {
                    if !prompt.id.contains('/') {
                        prompt.id = format!("{group}/{}", prompt.id);
                    }
                }
                if prompt.category.is_none() {
                    prompt.category = category.clone();
                }
                prompt
            })
            .collect()
    }
}

/// Prompt templates indexed by bare id.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    prompts: BTreeMap<String, PromptTemplate>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template. A later template with the same bare id replaces the
    /// earlier one.
    pub fn add(&mut self, prompt: PromptTemplate) {
        self.prompts.insert(prompt.name().to_string(), prompt);
    }

    /// Looks up by bare id or by `id@version`.
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.get(bare_id(name))
    }

    pub fn list(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.prompts.values()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Copy holding only the templates in `category`.
    pub fn filter_category(&self, category: &str) -> Self {
        Self {
            prompts: self
                .prompts
                .iter()
                .filter(|(_, prompt)| prompt.category.as_deref() == Some(category))
                .map(|(name, prompt)| (name.clone(), prompt.clone()))
                .collect(),
        }
    }

    /// Loads a prompt file, or every supported file under a directory
    /// (recursively, in name order).
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut library = Self::new();
        if path.is_dir() {
            library.load_directory(path)?;
        } else {
            library.load_file(path)?;
        }
        debug!(path = %path.display(), prompts = library.len(), "Loaded prompt library");
        Ok(library)
    }

    fn load_directory(&mut self, dir: &Path) -> Result<(), ConfigError> {
        let read_error = |source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = fs::read_dir(dir)
            .map_err(read_error)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;
        entries.sort();

        for entry in entries {
            if entry.is_dir() {
                self.load_directory(&entry)?;
            } else if ConfigFormat::from_path(&entry).is_some() {
                self.load_file(&entry)?;
            }
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let group: PromptGroupFile = load_document(path)?;
        for prompt in group.resolved() {
            self.add(prompt);
        }
        Ok(())
    }

    /// Templates bundled with the crate.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        for prompt in builtin_prompts() {
            library.add(prompt);
        }
        library
    }
}

fn builtin_prompts() -> Vec<PromptTemplate> {
    let input = || PromptArgument::new("input", "The text to work with.", true);
    vec![
        PromptTemplate {
            id: "text-qa/answer@1.0.0".to_string(),
            title: Some("Answer Question".to_string()),
            description: Some("Answer a question based on the provided text.".to_string()),
            category: Some("text-qa".to_string()),
            args: vec![
                PromptArgument::new("instruct", "The question to answer.", true),
                input(),
            ],
            template: "Answer the following question about the text below. If you do not know the answer, say you don't know.\n```\n{{{input}}}\n```\nQuestion: {{{instruct}}}\nAnswer:\n".to_string(),
        },
        PromptTemplate {
            id: "text-summarize/summarize@1.0.0".to_string(),
            title: Some("Summarize".to_string()),
            description: Some("Summarize text, optionally for a specific audience.".to_string()),
            category: Some("text-summarize".to_string()),
            args: vec![
                input(),
                PromptArgument::new("audience", "Who the summary is for.", false),
            ],
            template: "Summarize the following text{{#audience}} for {{audience}}{{/audience}}.\n```\n{{{input}}}\n```\nSummary:\n".to_string(),
        },
        PromptTemplate {
            id: "text-translate/translate@1.0.0".to_string(),
            title: Some("Translate".to_string()),
            description: Some("Translate text into another language.".to_string()),
            category: Some("text-translate".to_string()),
            args: vec![
                PromptArgument::new("instruct", "The target language.", true),
                input(),
            ],
            template: "Translate the following text into {{instruct}}.\n```\n{{{input}}}\n```\nTranslation:\n".to_string(),
        },
        PromptTemplate {
            id: "research/key-points@1.0.0".to_string(),
            title: Some("Key Points".to_string()),
            description: Some("Extract the key points of a text as a bulleted list.".to_string()),
            category: Some("research".to_string()),
            args: vec![input()],
            template: "List the key points of the text below as a bulleted list.\n```\n{{{input}}}\n```\n".to_string(),
        },
        PromptTemplate {
            id: "research/questions@1.0.0".to_string(),
            title: Some("Research Questions".to_string()),
            description: Some("Generate research questions about a topic.".to_string()),
            category: Some("research".to_string()),
            args: vec![
                PromptArgument::new("instruct", "The research topic.", true),
                PromptArgument::new("count", "How many questions to generate.", false),
            ],
            template: "Generate {{#count}}{{count}} {{/count}}{{^count}}five {{/count}}research questions about the following topic: {{instruct}}\n".to_string(),
        },
        PromptTemplate {
            id: "research/compare@1.0.0".to_string(),
            title: Some("Compare Sources".to_string()),
            description: Some("Compare two texts and highlight agreements and disagreements.".to_string()),
            category: Some("research".to_string()),
            args: vec![
                PromptArgument::new("first", "The first text.", true),
                PromptArgument::new("second", "The second text.", true),
            ],
            template: "Compare the two texts below. List where they agree and where they disagree.\n\nText A:\n```\n{{{first}}}\n```\n\nText B:\n```\n{{{second}}}\n```\n".to_string(),
        },
    ]
}

enum Tag<'a> {
    Variable(&'a str),
    Section { name: &'a str, inverted: bool },
    Comment,
}

/// Finds the next tag at or after `from`. Returns `(start, end, tag)` where
/// `end` is the index just past the closing braces.
fn next_tag(template: &str, from: usize) -> Option<(usize, usize, Tag<'_>)> {
    let start = from + template[from..].find("{{")?;
    let (inner_start, close) = if template[start..].starts_with("{{{") {
        (start + 3, "}}}")
    } else {
        (start + 2, "}}")
    };
    let inner_end = inner_start + template[inner_start..].find(close)?;
    let end = inner_end + close.len();
    let inner = template[inner_start..inner_end].trim();

    let tag = match inner.chars().next() {
        Some('#') => Tag::Section {
            name: inner[1..].trim(),
            inverted: false,
        },
        Some('^') => Tag::Section {
            name: inner[1..].trim(),
            inverted: true,
        },
        Some('!') | Some('/') => Tag::Comment,
        _ => Tag::Variable(inner),
    };
    Some((start, end, tag))
}

/// Renders `template` with `values`.
pub fn fill_template(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;

    while let Some((start, end, tag)) = next_tag(template, cursor) {
        out.push_str(&template[cursor..start]);
        cursor = end;
        match tag {
            Tag::Variable(name) => {
                if let Some(value) = values.get(name) {
                    out.push_str(value);
                }
            }
            Tag::Comment => {}
            Tag::Section { name, inverted } => {
                let closing = format!("{{{{/{name}}}}}");
                let (body, after) = match template[end..].find(&closing) {
                    Some(offset) => (&template[end..end + offset], end + offset + closing.len()),
                    None => (&template[end..], template.len()),
                };
                let present = values.get(name).is_some_and(|value| !value.is_empty());
                if present != inverted {
                    out.push_str(&fill_template(body, values));
                }
                cursor = after;
            }
        }
    }

    out.push_str(&template[cursor..]);
    out
}

/// Variable and section names referenced by `template`, in first-use order.
pub fn template_fields(template: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let mut cursor = 0;
    while let Some((_, end, tag)) = next_tag(template, cursor) {
        cursor = end;
        let name = match tag {
            Tag::Variable(name) | Tag::Section { name, .. } => name,
            Tag::Comment => continue,
        };
        if !name.is_empty() && !fields.iter().any(|field| field == name) {
            fields.push(name.to_string());
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn fills_answer_template() {
        let library = PromptLibrary::builtin();
        let prompt = library.get("text-qa/answer").expect("builtin prompt");
        let text = prompt.fill(&values(&[
            ("instruct", "What is the meaning of life?"),
            ("input", "42"),
        ]));
        assert_eq!(
            text,
            "Answer the following question about the text below. If you do not know the answer, say you don't know.\n```\n42\n```\nQuestion: What is the meaning of life?\nAnswer:\n"
        );
    }

    #[test]
    fn sections_follow_value_presence() {
        let template = "Hi{{#who}} {{who}}{{/who}}{{^who}} there{{/who}}!{{! ignored }}";
        assert_eq!(fill_template(template, &values(&[("who", "Ada")])), "Hi Ada!");
        assert_eq!(fill_template(template, &HashMap::new()), "Hi there!");
        assert_eq!(fill_template(template, &values(&[("who", "")])), "Hi there!");
    }

    #[test]
    fn unterminated_tags_are_left_alone() {
        assert_eq!(fill_template("a {{b", &values(&[("b", "x")])), "a {{b");
    }

    #[test]
    fn infers_arguments_from_fields() {
        let prompt = PromptTemplate {
            id: "custom/greet".to_string(),
            title: None,
            description: None,
            category: None,
            args: Vec::new(),
            template: "{{greeting}}, {{{name}}}! {{#extra}}{{extra}}{{/extra}} {{greeting}}".to_string(),
        };
        let names: Vec<String> = prompt.arguments().into_iter().map(|arg| arg.name).collect();
        assert_eq!(names, vec!["greeting", "name", "extra"]);
    }

    #[test]
    fn lookup_ignores_version_suffix() {
        let library = PromptLibrary::builtin();
        assert!(library.get("research/key-points@1.0.0").is_some());
        assert!(library.get("research/key-points").is_some());
        assert!(library.get("research/unknown").is_none());
    }

    #[test]
    fn category_filter_keeps_matching_prompts() {
        let research = PromptLibrary::builtin().filter_category("research");
        assert!(!research.is_empty());
        assert!(research
            .list()
            .all(|prompt| prompt.category.as_deref() == Some("research")));
    }

    #[test]
    fn mcp_value_uses_bare_name() {
        let library = PromptLibrary::builtin();
        let value = library
            .get("text-qa/answer")
            .expect("builtin prompt")
            .to_mcp_value();
        assert_eq!(value["name"], "text-qa/answer");
        assert_eq!(value["title"], "Answer Question");
        assert_eq!(value["arguments"][0]["name"], "instruct");
        assert_eq!(value["arguments"][0]["required"], true);
    }

    #[test]
    fn loads_group_files_from_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir(&nested).expect("create nested dir");
        std::fs::write(
            temp_dir.path().join("writing.yaml"),
            "groupId: writing\nprompts:\n  - id: haiku@2.0.0\n    title: Haiku\n    template: Write a haiku about {{topic}}.\n",
        )
        .expect("write yaml");
        std::fs::write(
            nested.join("coding.json"),
            r#"{"groupId": "coding", "category": "dev", "prompts": [{"id": "review", "template": "Review {{{input}}}", "args": [{"name": "input", "required": true}]}]}"#,
        )
        .expect("write json");
        std::fs::write(temp_dir.path().join("notes.txt"), "not a prompt file").expect("write txt");

        let library = PromptLibrary::load_from_path(temp_dir.path()).expect("load library");
        assert_eq!(library.len(), 2);

        let haiku = library.get("writing/haiku").expect("haiku");
        assert_eq!(haiku.category.as_deref(), Some("writing"));
        assert_eq!(haiku.arguments()[0].name, "topic");

        let review = library.get("coding/review").expect("review");
        assert_eq!(review.category.as_deref(), Some("dev"));
        assert!(review.arguments()[0].required);
    }

    #[test]
    fn missing_library_path_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let err = PromptLibrary::load_from_path(&temp_dir.path().join("missing.yaml"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
