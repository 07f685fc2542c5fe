//! MCP server exposing the documentation search tool.
//!
//! Exactly one tool is advertised; its name and description come from the
//! `[tool]` config table. Each call searches the data directory with a
//! fixed token budget. Search failures are returned as tool-level error
//! results so the session keeps serving later requests.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::{json, Value};

use crate::config::Config;
use crate::search::{DocSearch, SearchRequest, MAX_TOKENS};

/// Arguments accepted by the search tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
    pub query: String,
    pub page: usize,
}

impl SearchArgs {
    /// Validate raw tool arguments: `query` is a required string, `page` an
    /// optional positive number defaulting to 1.
    pub fn parse(arguments: Option<&JsonObject>) -> Result<Self, String> {
        let empty = JsonObject::new();
        let args = arguments.unwrap_or(&empty);

        let query = match args.get("query") {
            Some(Value::String(q)) if !q.trim().is_empty() => q.clone(),
            Some(Value::String(_)) => return Err("query must not be empty".to_string()),
            Some(_) => return Err("query must be a string".to_string()),
            None => return Err("missing required parameter: query".to_string()),
        };

        let page = match args.get("page") {
            None | Some(Value::Null) => 1,
            Some(Value::Number(n)) => match n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)) {
                Some(p) if p >= 1 => p as usize,
                _ => return Err("page must be a number >= 1".to_string()),
            },
            Some(_) => return Err("page must be a number".to_string()),
        };

        Ok(Self { query, page })
    }
}

/// Bridges the configured search tool to the MCP protocol.
///
/// Cheap to clone; every session shares the same searcher.
#[derive(Clone)]
pub struct DocsServer {
    tool_name: String,
    tool_description: String,
    data_dir: PathBuf,
    search: Arc<dyn DocSearch>,
}

impl DocsServer {
    pub fn new(config: &Config, search: Arc<dyn DocSearch>) -> Self {
        Self {
            tool_name: config.tool.name.clone(),
            tool_description: config.tool.description.clone(),
            data_dir: config.data_dir.clone(),
            search,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn input_schema() -> Arc<JsonObject> {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language search query"
                },
                "page": {
                    "type": "number",
                    "description": "Result page, starting at 1",
                    "default": 1
                }
            },
            "required": ["query"]
        });
        match schema {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(JsonObject::new()),
        }
    }

    /// The single rmcp `Tool` descriptor this server advertises.
    pub fn tool(&self) -> Tool {
        Tool {
            name: Cow::Owned(self.tool_name.clone()),
            title: None,
            description: Some(Cow::Owned(self.tool_description.clone())),
            input_schema: Self::input_schema(),
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    /// Run one search call. `Err` is reserved for protocol-level problems.
    pub async fn run_search(&self, arguments: Option<&JsonObject>) -> Result<CallToolResult, McpError> {
        let args = SearchArgs::parse(arguments)
            .map_err(|msg| McpError::new(ErrorCode::INVALID_PARAMS, msg, None))?;

        let request = SearchRequest {
            path: self.data_dir.clone(),
            query: args.query,
            max_tokens: MAX_TOKENS,
            page: args.page,
        };

        match self.search.search(request).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => {
                tracing::warn!(error = %e, "search failed");
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "search failed: {}",
                    e
                ))]))
            }
        }
    }
}

impl ServerHandler for DocsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "docs-harness".to_string(),
                title: Some("Docs Harness".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Use the {} tool to search the documentation.",
                self.tool_name
            )),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(vec![self.tool()])))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        (name == self.tool_name).then(|| self.tool())
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if request.name != self.tool_name {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            ));
        }
        self.run_search(request.arguments.as_ref()).await
    }
}
