//! Graph document generation from a natural-language prompt.
//!
//! Talks to an OpenAI-compatible responses endpoint with a strict JSON
//! schema, then repairs whatever comes back: model output is normalized like
//! any other untrusted document, capped in size, and stripped of references
//! to nodes that did not survive.

use std::collections::HashSet;

use serde_json::{Value, json};
use thiserror::Error;

use crate::graph::{DEFAULT_GRAPH_KIND, Graph, SceneDefaults, normalize_graph};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/responses";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT_SECS: u64 = 25;
const MAX_OUTPUT_TOKENS: u32 = 1200;

pub const DEFAULT_MAX_NODES: usize = 28;
pub const MAX_MAX_NODES: usize = 80;
pub const MAX_PROMPT_CHARS: usize = 4000;
pub const AI_GRAPH_NAME: &str = "AI Graph";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model api error: {0}")]
    Api(String),
    #[error("model refused the prompt: {0}")]
    Refused(String),
    #[error("model returned no output")]
    Empty,
    #[error("model returned invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub defaults: SceneDefaults,
}

impl GeneratorConfig {
    /// Reads the generator settings from the environment. `None` (feature
    /// disabled) without an api key.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return None;
        }
        let api_url = std::env::var("GRAPHNOTES_AI_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Some(Self {
            api_url,
            api_key,
            model,
            defaults: SceneDefaults::default(),
        })
    }
}

pub struct GraphGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl GraphGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Option<Self> {
        Self::new(GeneratorConfig::from_env()?).ok()
    }

    /// Produces a loadable document for the prompt. `max_nodes` of zero means
    /// the default cap; anything above the hard ceiling is clamped down.
    pub async fn generate(&self, prompt: &str, max_nodes: usize) -> Result<Graph, GenerateError> {
        let max_nodes = clamp_max_nodes(max_nodes);
        let body = json!({
            "model": self.config.model,
            "input": [
                { "role": "system", "content": build_system_prompt(max_nodes) },
                { "role": "user", "content": prompt },
            ],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "graph_payload",
                    "schema": graph_schema(),
                    "strict": true,
                }
            },
            "temperature": 0.2,
            "max_output_tokens": MAX_OUTPUT_TOKENS,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api(format!(
                "{status}: {}",
                detail.trim()
            )));
        }

        let raw: Value = response.json().await?;
        if let Some(message) = raw
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return Err(GenerateError::Api(message.to_string()));
        }

        let (text, refusal) = extract_output_text(&raw);
        if let Some(refusal) = refusal {
            return Err(GenerateError::Refused(refusal));
        }
        let cleaned = strip_code_fences(&text);
        if cleaned.is_empty() {
            return Err(GenerateError::Empty);
        }

        let document: Value = serde_json::from_str(cleaned)?;
        Ok(sanitize_generated(&document, max_nodes, &self.config.defaults))
    }
}

/// Zero means the default cap; values above the hard ceiling clamp down.
pub fn clamp_max_nodes(value: usize) -> usize {
    if value == 0 {
        DEFAULT_MAX_NODES
    } else {
        value.min(MAX_MAX_NODES)
    }
}

fn build_system_prompt(max_nodes: usize) -> String {
    format!(
        "You are a graph builder. Return ONLY valid JSON matching the schema.\n\
         Rules:\n\
         - Keep node count <= {max_nodes}.\n\
         - Use unique ids for nodes and edges.\n\
         - Provide position.x and position.y for each node.\n\
         - Use type=\"group\" for containers and set child nodes' parentNode to the group id.\n\
         - Include items/notes only if they add value; otherwise use empty arrays.\n\
         - Always include all fields in the schema; use null for optional fields when unused.\n\
         - Use edge type \"smoothstep\".\n\
         - Edges must reference existing node ids."
    )
}

// The editor-facing shape the model is asked for. Deliberately the legacy
// wire shape (type/parentNode/style/data), which the normalizer already
// understands; the model never needs to learn the canonical one.
fn graph_schema() -> Value {
    let note_schema = json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "id": { "type": "string" },
            "title": { "type": "string" },
        },
        "required": ["id", "title"],
    });
    let item_schema = json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "id": { "type": "string" },
            "title": { "type": "string" },
            "notes": { "type": "array", "items": note_schema },
        },
        "required": ["id", "title", "notes"],
    });
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "name": { "type": "string" },
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "id": { "type": "string" },
                        "type": { "type": "string" },
                        "position": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "x": { "type": "number" },
                                "y": { "type": "number" },
                            },
                            "required": ["x", "y"],
                        },
                        "parentNode": { "type": ["string", "null"] },
                        "style": {
                            "type": ["object", "null"],
                            "additionalProperties": false,
                            "properties": {
                                "width": { "type": "number" },
                                "height": { "type": "number" },
                            },
                            "required": ["width", "height"],
                        },
                        "data": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "label": { "type": "string" },
                                "items": { "type": "array", "items": item_schema },
                            },
                            "required": ["label", "items"],
                        },
                    },
                    "required": ["id", "type", "position", "parentNode", "style", "data"],
                },
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "id": { "type": "string" },
                        "source": { "type": "string" },
                        "target": { "type": "string" },
                        "type": { "type": "string" },
                    },
                    "required": ["id", "source", "target", "type"],
                },
            },
        },
        "required": ["name", "nodes", "edges"],
    })
}

// Responses API output first, then the fallbacks other compatible servers
// answer with.
fn extract_output_text(response: &Value) -> (String, Option<String>) {
    let mut text = String::new();
    let mut refusal = None;

    if let Some(output) = response.get("output").and_then(Value::as_array) {
        for item in output {
            let Some(contents) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for content in contents {
                match content.get("type").and_then(Value::as_str) {
                    Some("output_text") => {
                        if let Some(chunk) = content.get("text").and_then(Value::as_str) {
                            text.push_str(chunk);
                        }
                    }
                    Some("refusal") => {
                        if refusal.is_none() {
                            refusal = content
                                .get("refusal")
                                .and_then(Value::as_str)
                                .map(str::to_string);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    if text.is_empty() {
        if let Some(direct) = response.get("output_text").and_then(Value::as_str) {
            text.push_str(direct);
        }
    }
    if text.is_empty() {
        if let Some(content) = response
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
        {
            text.push_str(content);
        }
    }

    (text, refusal)
}

fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Normalization plus the repairs specific to model output: node count
/// capped, container references into the capped-away remainder cleared,
/// edges restricted to surviving nodes, and a usable document name.
fn sanitize_generated(document: &Value, max_nodes: usize, defaults: &SceneDefaults) -> Graph {
    let mut graph = normalize_graph(Some(document), DEFAULT_GRAPH_KIND, defaults);

    if document
        .get("name")
        .and_then(Value::as_str)
        .is_none_or(|name| name.trim().is_empty())
    {
        graph.name = AI_GRAPH_NAME.to_string();
    }

    graph.nodes.truncate(max_nodes);
    let surviving: HashSet<String> = graph.nodes.iter().map(|node| node.id.clone()).collect();
    for node in &mut graph.nodes {
        if node
            .container_id
            .as_deref()
            .is_some_and(|container| !surviving.contains(container))
        {
            node.container_id = None;
        }
    }
    graph
        .edges
        .retain(|edge| surviving.contains(&edge.source) && surviving.contains(&edge.target));

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_handles_zero_and_excess() {
        assert_eq!(clamp_max_nodes(0), DEFAULT_MAX_NODES);
        assert_eq!(clamp_max_nodes(10), 10);
        assert_eq!(clamp_max_nodes(500), MAX_MAX_NODES);
    }

    #[test]
    fn extracts_responses_api_output() {
        let response = json!({
            "output": [{
                "content": [
                    { "type": "output_text", "text": "{\"name\":" },
                    { "type": "output_text", "text": "\"G\"}" },
                ],
            }],
        });
        let (text, refusal) = extract_output_text(&response);
        assert_eq!(text, "{\"name\":\"G\"}");
        assert!(refusal.is_none());
    }

    #[test]
    fn extracts_chat_completions_fallback() {
        let response = json!({
            "choices": [{ "message": { "content": "{}" } }],
        });
        let (text, _) = extract_output_text(&response);
        assert_eq!(text, "{}");
    }

    #[test]
    fn surfaces_refusals() {
        let response = json!({
            "output": [{
                "content": [{ "type": "refusal", "refusal": "cannot help" }],
            }],
        });
        let (_, refusal) = extract_output_text(&response);
        assert_eq!(refusal.as_deref(), Some("cannot help"));
    }

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }

    #[test]
    fn sanitize_caps_nodes_and_restricts_edges() {
        let document = json!({
            "name": "Pipeline",
            "nodes": [
                { "id": "a", "position": { "x": 0, "y": 0 } },
                { "id": "b", "position": { "x": 10, "y": 0 } },
                { "id": "c", "position": { "x": 20, "y": 0 }, "parentNode": "a" },
            ],
            "edges": [
                { "id": "e1", "source": "a", "target": "b" },
                { "id": "e2", "source": "b", "target": "c" },
            ],
        });

        let graph = sanitize_generated(&document, 2, &SceneDefaults::default());
        assert_eq!(graph.name, "Pipeline");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1, "edges into capped nodes are dropped");
        assert_eq!(graph.edges[0].id, "e1");
    }

    #[test]
    fn sanitize_clears_dangling_containers_and_names_result() {
        let document = json!({
            "nodes": [
                { "id": "a", "position": { "x": 0, "y": 0 }, "parentNode": "ghost" },
            ],
            "edges": [],
        });

        let graph = sanitize_generated(&document, 28, &SceneDefaults::default());
        assert_eq!(graph.name, "AI Graph");
        assert!(graph.nodes[0].container_id.is_none());
    }
}
