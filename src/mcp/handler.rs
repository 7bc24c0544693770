// MCP handler: one tool per diagnostic action, plus the registered-instance list as a resource

use rmcp::{
    model::*,
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::models::InstanceView;
use crate::db::router::{Action, ParamKind, QueryRequest};
use crate::manager::{InstanceManager, ManagerError};

pub const INSTANCES_RESOURCE_URI: &str = "instances://list";
pub const INSTANCE_ARGUMENT: &str = "instance_name";

/// Exposes the query router to MCP clients
#[derive(Clone)]
pub struct RegistryMcpHandler {
    manager: Arc<InstanceManager>,
}

/// JSON schema for an action's arguments: the target instance plus the action's own parameters
fn input_schema(action: Action) -> JsonObject {
    let mut properties = Map::new();
    properties.insert(
        INSTANCE_ARGUMENT.to_string(),
        json!({ "type": "string", "description": "Registered instance to query" }),
    );

    for param in action.parameters() {
        let kind = match param.kind {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
        };
        let mut property = Map::new();
        property.insert("type".to_string(), Value::from(kind));
        if !param.default.is_null() {
            property.insert("default".to_string(), param.default.clone());
        }
        properties.insert(param.name.to_string(), Value::Object(property));
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::from("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema.insert("required".to_string(), json!([INSTANCE_ARGUMENT]));
    schema
}

fn to_json_text(value: &impl serde::Serialize) -> Result<String, McpError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to encode result: {}", e), None))
}

impl RegistryMcpHandler {
    pub fn new(manager: Arc<InstanceManager>) -> Self {
        Self { manager }
    }

    /// Tool catalogue, in action declaration order
    pub fn tools() -> Vec<Tool> {
        Action::ALL
            .iter()
            .map(|action| Tool::new(action.as_str(), action.description(), input_schema(*action)))
            .collect()
    }

    pub fn instances_resource() -> Result<Resource, McpError> {
        serde_json::from_value(json!({
            "uri": INSTANCES_RESOURCE_URI,
            "name": "instances_list",
            "description": "Registered PostgreSQL instances",
            "mimeType": "application/json",
        }))
        .map_err(|e| McpError::internal_error(format!("Failed to build resource: {}", e), None))
    }

    /// Run the tool named after an action. Diagnostic failures come back as
    /// tool errors; malformed calls are protocol errors.
    pub async fn run_tool(&self, name: &str, mut arguments: JsonObject) -> Result<CallToolResult, McpError> {
        let action: Action = name
            .parse()
            .map_err(|_| McpError::invalid_params(format!("Unknown tool '{}'", name), None))?;

        let instance_name = match arguments.remove(INSTANCE_ARGUMENT) {
            Some(Value::String(instance)) if !instance.trim().is_empty() => instance,
            _ => {
                return Err(McpError::invalid_params(
                    format!("'{}' is required", INSTANCE_ARGUMENT),
                    None,
                ))
            }
        };

        let request = QueryRequest {
            instance_name,
            action: action.as_str().to_string(),
            parameters: arguments,
        };

        match self.manager.query(&request).await {
            Ok(response) => {
                let data = response.data.unwrap_or(Value::Null);
                Ok(CallToolResult::success(vec![Content::text(to_json_text(&data)?)]))
            }
            Err(ManagerError::Route(route)) => {
                debug!(instance = %request.instance_name, "[Mcp] {} failed: {}", action, route.source);
                let message = route.response.error.unwrap_or_else(|| route.source.to_string());
                Ok(CallToolResult::error(vec![Content::text(message)]))
            }
            Err(ManagerError::InstanceNotFound(instance)) => Ok(CallToolResult::error(vec![
                Content::text(format!("instance {} not found", instance)),
            ])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Contents of `instances://list`
    pub async fn read_instances(&self) -> Result<ReadResourceResult, McpError> {
        let instances = self
            .manager
            .list_instances()
            .map_err(|e| McpError::internal_error(format!("Failed to list instances: {}", e), None))?;

        let registry = self.manager.registry();
        let mut views = Vec::with_capacity(instances.len());
        for instance in instances {
            let connected = registry.contains(&instance.name).await;
            views.push(InstanceView { instance, connected });
        }

        let contents: ResourceContents = serde_json::from_value(json!({
            "uri": INSTANCES_RESOURCE_URI,
            "mimeType": "application/json",
            "text": to_json_text(&views)?,
        }))
        .map_err(|e| McpError::internal_error(format!("Failed to build contents: {}", e), None))?;

        Ok(ReadResourceResult {
            contents: vec![contents],
        })
    }
}

impl ServerHandler for RegistryMcpHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "psql-registry".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Diagnostics for registered PostgreSQL instances. Read instances://list \
                 for instance names, then call a tool with instance_name."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(Self::tools()))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(tool = %params.name, "[Mcp] call_tool");
        self.run_tool(&params.name, params.arguments.unwrap_or_default())
            .await
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(vec![Self::instances_resource()?]))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if params.uri != INSTANCES_RESOURCE_URI {
            return Err(McpError::invalid_params(
                format!("Resource '{}' not found", params.uri),
                None,
            ));
        }
        self.read_instances().await
    }
}
