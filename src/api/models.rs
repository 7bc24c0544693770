// HTTP request and response bodies

use serde::{Deserialize, Serialize};

use crate::storage::{CreateInstanceInput, Instance};

/// Body of `POST /api/v1/instances`
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInstanceRequest {
    pub name: String,
    pub database_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator_username: Option<String>,
}

impl RegisterInstanceRequest {
    /// Name of the first required field left blank
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("name")
        } else if self.database_name.trim().is_empty() {
            Some("database_name")
        } else {
            None
        }
    }
}

impl From<RegisterInstanceRequest> for CreateInstanceInput {
    fn from(req: RegisterInstanceRequest) -> Self {
        Self {
            name: req.name.trim().to_string(),
            database_name: req.database_name.trim().to_string(),
            description: req.description,
            creator_username: req.creator_username,
        }
    }
}

/// Stored instance plus whether it has a live client
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: Instance,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
