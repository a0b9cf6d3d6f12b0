use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

impl ResourceSpec {
    pub fn new(uri: &str, name: &str, description: &str, mime_type: &str) -> Self {
        Self {
            uri: uri.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            mime_type: Some(mime_type.to_string()),
        }
    }

    pub fn to_mcp_value(&self) -> Value {
        let mut value = json!({ "uri": self.uri, "name": self.name });
        if let Some(description) = &self.description {
            value["description"] = json!(description);
        }
        if let Some(mime_type) = &self.mime_type {
            value["mimeType"] = json!(mime_type);
        }
        value
    }

    /// Placeholder text served for this resource, chosen by URI scheme.
    pub fn sample_text(&self) -> String {
        if let Some(path) = self.uri.strip_prefix("file://") {
            let file_name = path.rsplit('/').next().unwrap_or(path);
            format!(
                "Sample content for {file_name}\n\nThis is a test resource provided by the embedded MCP server."
            )
        } else if self.uri.starts_with("data://") {
            format!(
                "Sample data resource: {}",
                self.description.as_deref().unwrap_or(&self.name)
            )
        } else {
            format!("Content for {}", self.name)
        }
    }

    /// `resources/read` result.
    pub fn read_value(&self) -> Value {
        let mut content = json!({ "uri": self.uri, "text": self.sample_text() });
        if let Some(mime_type) = &self.mime_type {
            content["mimeType"] = json!(mime_type);
        }
        json!({ "contents": [content] })
    }
}

pub fn sample_resources() -> Vec<ResourceSpec> {
    vec![
        ResourceSpec::new(
            "file:///sample-data.txt",
            "Sample Text File",
            "A sample text file for testing the MCP Resources view",
            "text/plain",
        ),
        ResourceSpec::new(
            "file:///config.json",
            "Configuration File",
            "Sample JSON configuration for demonstration purposes",
            "application/json",
        ),
        ResourceSpec::new(
            "data://test/example",
            "Test Data Resource",
            "Example data resource with custom URI scheme",
            "text/plain",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_text_depends_on_scheme() {
        let resources = sample_resources();
        assert_eq!(
            resources[0].sample_text(),
            "Sample content for sample-data.txt\n\nThis is a test resource provided by the embedded MCP server."
        );
        assert_eq!(
            resources[2].sample_text(),
            "Sample data resource: Example data resource with custom URI scheme"
        );

        let other = ResourceSpec {
            uri: "mem://notes".to_string(),
            name: "Notes".to_string(),
            description: None,
            mime_type: None,
        };
        assert_eq!(other.sample_text(), "Content for Notes");
        assert!(other.read_value()["contents"][0].get("mimeType").is_none());
    }

    #[test]
    fn read_value_carries_mime_type() {
        let value = sample_resources()[1].read_value();
        assert_eq!(value["contents"][0]["uri"], "file:///config.json");
        assert_eq!(value["contents"][0]["mimeType"], "application/json");
    }
}
