use std::sync::Arc;

use lf_core::{Engine, export_json, import_json, millis_to_iso8601};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

const DEFAULT_MEMORY_LIMIT: usize = 20;

/// MCP front end for one engine. Every tool call takes the engine lock for
/// its whole duration.
#[derive(Clone)]
pub struct LfServer {
    engine: Arc<Mutex<Engine>>,
    tool_router: ToolRouter<Self>,
}

impl LfServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            tool_router: Self::tool_router(),
        }
    }

    fn stats_json(engine: &Engine) -> serde_json::Value {
        serde_json::to_value(engine.stats()).unwrap_or_default()
    }
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct RespondRequest {
    /// Text to respond to. It is also learned as a new phrase.
    text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LearnRequest {
    /// The prompt phrase
    prompt: String,
    /// The phrase that should follow the prompt
    response: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MemoriesRequest {
    /// Maximum number of entries, most recent first (default 20)
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TagRequest {
    /// Text to extract keywords from
    text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ImportRequest {
    /// Full engine snapshot as returned by lf_export
    state: serde_json::Value,
}

#[tool_router]
impl LfServer {
    #[tool(
        description = "Respond to text using the phrase graph. The input is ingested, the field evolves, and the strongest stable continuation is returned. An empty graph echoes the input."
    )]
    async fn lf_respond(
        &self,
        Parameters(req): Parameters<RespondRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut engine = self.engine.lock().await;
        let response = engine.respond(&req.text);
        let result = serde_json::json!({
            "response": response,
            "stats": Self::stats_json(&engine),
        });
        Ok(json_result(&result))
    }

    #[tool(
        description = "Teach the engine that `response` follows `prompt`. Links the two phrases, reinforces matching phrases, and records the pair in the training log."
    )]
    async fn lf_learn(
        &self,
        Parameters(req): Parameters<LearnRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut engine = self.engine.lock().await;
        engine.learn_from(&req.prompt, &req.response);
        let result = serde_json::json!({
            "learned": true,
            "memories": engine.memories().len(),
            "stats": Self::stats_json(&engine),
        });
        Ok(json_result(&result))
    }

    #[tool(
        description = "Graph statistics: node counts by kind, edge count, field value, curvature, stability and the current phase label."
    )]
    async fn lf_stats(&self) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(json_result(&Self::stats_json(&engine)))
    }

    #[tool(description = "Recent training pairs, most recent first.")]
    async fn lf_memories(
        &self,
        Parameters(req): Parameters<MemoriesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let limit = req.limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
        let memories: Vec<serde_json::Value> = engine
            .memories()
            .into_iter()
            .take(limit)
            .map(|m| {
                serde_json::json!({
                    "prompt": m.prompt,
                    "response": m.response,
                    "timestamp": m.timestamp,
                    "time": millis_to_iso8601(m.timestamp),
                })
            })
            .collect();
        let result = serde_json::json!({
            "count": memories.len(),
            "memories": memories,
        });
        Ok(json_result(&result))
    }

    #[tool(description = "Current global field state: u, recent gradients, curvature and stability.")]
    async fn lf_field(&self) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let field = serde_json::to_value(engine.field_state()).unwrap_or_default();
        Ok(json_result(&field))
    }

    #[tool(description = "Lowercase keywords longer than the configured minimum length.")]
    async fn lf_tag(
        &self,
        Parameters(req): Parameters<TagRequest>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let result = serde_json::json!({ "tags": engine.tag(&req.text) });
        Ok(json_result(&result))
    }

    #[tool(
        description = "Erase everything: nodes, edges, field state and training log. The engine returns to the dead state."
    )]
    async fn lf_clear(&self) -> Result<CallToolResult, McpError> {
        let mut engine = self.engine.lock().await;
        engine.clear_memory();
        let result = serde_json::json!({
            "cleared": true,
            "stats": Self::stats_json(&engine),
        });
        Ok(json_result(&result))
    }

    #[tool(description = "Export the full engine snapshot as JSON.")]
    async fn lf_export(&self) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let json = export_json(&engine.snapshot())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Import a full engine snapshot produced by lf_export. Replaces current state.")]
    async fn lf_import(
        &self,
        Parameters(req): Parameters<ImportRequest>,
    ) -> Result<CallToolResult, McpError> {
        let json_str = serde_json::to_string(&req.state)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let snapshot = import_json(&json_str)
            .map_err(|e| McpError::invalid_params(format!("invalid snapshot JSON: {e}"), None))?;

        let mut engine = self.engine.lock().await;
        engine
            .import(snapshot)
            .map_err(|e| McpError::invalid_params(format!("invalid snapshot: {e}"), None))?;

        let result = serde_json::json!({
            "imported": true,
            "stats": Self::stats_json(&engine),
        });
        Ok(json_result(&result))
    }
}

#[tool_handler]
impl ServerHandler for LfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "A phrase knowledge graph that learns from prompt/response pairs.\n\n\
                 - lf_learn teaches a pair; lf_respond answers from what was learned.\n\
                 - An empty graph echoes input. Use lf_stats to see the current phase.\n\
                 - lf_memories lists recent training pairs; lf_clear erases everything."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lf_core::EngineConfig;
    use lf_store::Store;

    fn make_server() -> LfServer {
        let store = Store::open_in_memory().unwrap();
        LfServer::new(Engine::open(EngineConfig::default(), Box::new(store)))
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> serde_json::Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    async fn learn(server: &LfServer, prompt: &str, response: &str) {
        server
            .lf_learn(Parameters(LearnRequest {
                prompt: prompt.to_string(),
                response: response.to_string(),
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lf_stats_empty() {
        let server = make_server();
        let json = parse_result(&server.lf_stats().await.unwrap());

        assert_eq!(json["totalNodes"], 0);
        assert_eq!(json["totalEdges"], 0);
        assert_eq!(json["phase"], "Dead State");
    }

    #[tokio::test]
    async fn test_lf_respond_echoes_when_empty() {
        let server = make_server();
        let result = server
            .lf_respond(Parameters(RespondRequest {
                text: "anything".to_string(),
            }))
            .await
            .unwrap();

        let json = parse_result(&result);
        assert_eq!(json["response"], "anything");
        assert!(json["stats"]["totalNodes"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_lf_learn_then_respond() {
        let server = make_server();
        learn(&server, "hello", "hi there").await;

        let json = parse_result(
            &server
                .lf_respond(Parameters(RespondRequest {
                    text: "hello".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["response"], "hi there");
    }

    #[tokio::test]
    async fn test_lf_learn_reports_memories() {
        let server = make_server();
        learn(&server, "one", "two").await;
        let json = parse_result(
            &server
                .lf_learn(Parameters(LearnRequest {
                    prompt: "three".to_string(),
                    response: "four".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["learned"], true);
        assert_eq!(json["memories"], 2);
        assert_eq!(json["stats"]["phraseNodes"], 4);
    }

    #[tokio::test]
    async fn test_lf_memories_limit_and_order() {
        let server = make_server();
        for i in 0..3 {
            learn(&server, &format!("prompt {i}"), &format!("response {i}")).await;
        }

        let json = parse_result(
            &server
                .lf_memories(Parameters(MemoriesRequest { limit: Some(2) }))
                .await
                .unwrap(),
        );
        assert_eq!(json["count"], 2);
        assert_eq!(json["memories"][0]["prompt"], "prompt 2");
        assert_eq!(json["memories"][1]["prompt"], "prompt 1");
        assert!(json["memories"][0]["time"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_lf_field() {
        let server = make_server();
        let json = parse_result(&server.lf_field().await.unwrap());
        assert_eq!(json["u"], 0.0);
        assert_eq!(json["stability"], 1.0);
        assert!(json["gradients"].as_array().unwrap().is_empty());

        learn(&server, "hello", "world").await;
        let json = parse_result(&server.lf_field().await.unwrap());
        assert!(!json["gradients"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lf_tag() {
        let server = make_server();
        let json = parse_result(
            &server
                .lf_tag(Parameters(TagRequest {
                    text: "a quick fox jumps".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["tags"], serde_json::json!(["quick", "jumps"]));
    }

    #[tokio::test]
    async fn test_lf_clear() {
        let server = make_server();
        learn(&server, "hello", "hi there").await;

        let json = parse_result(&server.lf_clear().await.unwrap());
        assert_eq!(json["cleared"], true);
        assert_eq!(json["stats"]["totalNodes"], 0);

        let memories = parse_result(
            &server
                .lf_memories(Parameters(MemoriesRequest { limit: None }))
                .await
                .unwrap(),
        );
        assert_eq!(memories["count"], 0);
    }

    #[tokio::test]
    async fn test_lf_export_import_roundtrip() {
        let server = make_server();
        learn(&server, "hello", "hi there").await;
        let stats_before = parse_result(&server.lf_stats().await.unwrap());

        let exported = text_from_result(&server.lf_export().await.unwrap());
        let state: serde_json::Value = serde_json::from_str(&exported).unwrap();

        let server2 = make_server();
        let json = parse_result(
            &server2
                .lf_import(Parameters(ImportRequest { state }))
                .await
                .unwrap(),
        );
        assert_eq!(json["imported"], true);

        let stats_after = parse_result(&server2.lf_stats().await.unwrap());
        assert_eq!(stats_before, stats_after);
    }

    #[tokio::test]
    async fn test_lf_import_rejects_invalid() {
        let server = make_server();
        let result = server
            .lf_import(Parameters(ImportRequest {
                state: serde_json::json!({"graph": {"version": "9.9"}}),
            }))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_tool_registration() {
        let server = make_server();
        let info = server.get_info();

        assert!(info.instructions.is_some());
        assert!(info.capabilities.tools.is_some());
    }
}
