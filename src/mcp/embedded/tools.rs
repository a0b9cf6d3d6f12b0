use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Tool metadata as listed by `tools/list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub title: Option<String>,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
}

impl ToolSpec {
    pub fn to_mcp_value(&self) -> Value {
        let mut value = json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        });
        if let Some(title) = &self.title {
            value["title"] = json!(title);
        }
        if let Some(schema) = &self.output_schema {
            value["outputSchema"] = schema.clone();
        }
        value
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Output(Value),
    Error(String),
}

impl ToolOutcome {
    /// `tools/call` result: the output as serialized text plus structured
    /// content, or a single text block flagged with `isError`.
    pub fn to_mcp_value(&self) -> Value {
        match self {
            ToolOutcome::Output(output) => {
                let text = serde_json::to_string_pretty(output).unwrap_or_else(|_| output.to_string());
                let mut value = json!({ "content": [{ "type": "text", "text": text }] });
                if output.is_object() {
                    value["structuredContent"] = output.clone();
                }
                value
            }
            ToolOutcome::Error(message) => json!({
                "content": [{ "type": "text", "text": message }],
                "isError": true,
            }),
        }
    }
}

#[async_trait]
pub trait ToolLibrary: Send + Sync {
    fn list_tools(&self) -> Vec<ToolSpec>;

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome;
}

fn string_param_schema(name: &str, description: &str, required: bool) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            name: { "type": "string", "description": description }
        }
    });
    if required {
        schema["required"] = json!([name]);
    }
    schema
}

enum StarterTool {
    Echo,
    SentimentAnalysis,
    InternetSearch,
}

impl StarterTool {
    const ALL: [StarterTool; 3] = [
        StarterTool::Echo,
        StarterTool::SentimentAnalysis,
        StarterTool::InternetSearch,
    ];

    fn name(&self) -> &'static str {
        match self {
            StarterTool::Echo => "test_echo",
            StarterTool::SentimentAnalysis => "test_sentiment_analysis",
            StarterTool::InternetSearch => "test_internet_search",
        }
    }

    fn spec(&self) -> ToolSpec {
        match self {
            StarterTool::Echo => ToolSpec {
                name: self.name().to_string(),
                title: Some("Echo".to_string()),
                description: "An echo tool that returns the input as output.".to_string(),
                input_schema: string_param_schema("message", "The message to echo.", true),
                output_schema: None,
            },
            StarterTool::SentimentAnalysis => ToolSpec {
                name: self.name().to_string(),
                title: Some("Sentiment Analysis".to_string()),
                description: "A fake sentiment analysis tool that returns a fixed sentiment."
                    .to_string(),
                input_schema: string_param_schema("input_text", "The text to analyze.", true),
                output_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "input_text": { "type": "string" },
                        "sentiment": { "type": "string", "enum": ["positive", "negative", "neutral"] },
                        "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
                    },
                    "required": ["input_text", "sentiment", "confidence"]
                })),
            },
            StarterTool::InternetSearch => ToolSpec {
                name: self.name().to_string(),
                title: Some("Internet Search".to_string()),
                description: "A fake internet search tool that returns a fixed result.".to_string(),
                input_schema: string_param_schema("query", "The search query.", true),
                output_schema: None,
            },
        }
    }

    fn run(&self, arguments: &Map<String, Value>) -> Value {
        match self {
            StarterTool::Echo => Value::Object(arguments.clone()),
            StarterTool::SentimentAnalysis => json!({
                "input_text": "I love programming!",
                "sentiment": "positive",
                "confidence": 0.95,
            }),
            StarterTool::InternetSearch => json!({
                "query": "example query",
                "num_results": 2,
                "results": [
                    {
                        "title": "Example Domain",
                        "url": "https://www.example.com",
                        "snippet": "This domain is for use in illustrative examples in documents."
                    },
                    {
                        "title": "Example - Wikipedia",
                        "url": "https://en.wikipedia.org/wiki/Example",
                        "snippet": "An example is a representative form or pattern."
                    }
                ]
            }),
        }
    }
}

/// Offline stub tools for exercising `tools/list` and `tools/call`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StarterToolLibrary;

#[async_trait]
impl ToolLibrary for StarterToolLibrary {
    fn list_tools(&self) -> Vec<ToolSpec> {
        StarterTool::ALL.iter().map(StarterTool::spec).collect()
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome {
        match StarterTool::ALL.iter().find(|tool| tool.name() == name) {
            Some(tool) => ToolOutcome::Output(tool.run(arguments)),
            None => ToolOutcome::Error(format!("Tool with name '{name}' not found")),
        }
    }
}
