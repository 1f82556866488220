//! Serialized flow document.
//!
//! ```json
//! {
//!   "graph": { "cells": [ { "id": "a", "type": "devs.LaunchModel" }, ... ] },
//!   "models": [ { "id": "a", "name": "Start", "data": { ... }, "links": [ ... ] } ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::FlowError;

/// Whole flow document as authored in the flow editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    pub graph: Graph,
    #[serde(default)]
    pub models: Vec<UnparsedModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub cells: Vec<GraphCell>,
}

/// Node or link entry of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCell {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Option<CellConnection>,
    #[serde(default)]
    pub target: Option<CellConnection>,
    /// Link bend points, presentation only.
    #[serde(default)]
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConnection {
    pub id: String,
    #[serde(default)]
    pub port: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// Model before field decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnparsedModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub links: Vec<ModelLink>,
}

/// Routing guard attached to the link towards `cell`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLink {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub cell: String,
}

impl FlowDocument {
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        serde_json::from_str(json).map_err(|e| FlowError::Parse(e.to_string()))
    }

    /// Decode a stored document, which is either the JSON object itself or a
    /// string holding it.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, FlowError> {
        match value {
            serde_json::Value::String(json) => Self::from_json(json),
            other => Self::deserialize(other).map_err(|e| FlowError::Parse(e.to_string())),
        }
    }
}
