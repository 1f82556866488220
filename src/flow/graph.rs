//! In-memory flow graph.
//!
//! Cells and links live in two arenas owned by the [`Flow`] and refer to
//! each other by index. A flow is built per request and never shared.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use super::document::{FlowDocument, GraphCell, ModelLink, UnparsedModel};
use super::model::Model;
use super::FlowError;

pub type CellId = usize;
pub type LinkId = usize;

/// Kind of a graph entry, decoded from its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellKind {
    Launch,
    CallCapacity,
    LowCost,
    HighCost,
    LocationCheck,
    UserPriority,
    SortServers,
    EndRouting,
    NoRouting,
    Link,
    Unknown,
}

impl CellKind {
    /// Decode a type tag. Editor tags (`devs.LowCostModel`, `devs.FlowLink`)
    /// and bare names (`LowCost`, `Link`) are both accepted.
    pub fn from_tag(tag: &str) -> Self {
        let name = tag.strip_prefix("devs.").unwrap_or(tag);
        let name = name.strip_suffix("Model").unwrap_or(name);
        match name {
            "Launch" => CellKind::Launch,
            "CallCapacity" => CellKind::CallCapacity,
            "LowCost" => CellKind::LowCost,
            "HighCost" => CellKind::HighCost,
            "LocationCheck" => CellKind::LocationCheck,
            "UserPriority" => CellKind::UserPriority,
            "SortServers" => CellKind::SortServers,
            "EndRouting" => CellKind::EndRouting,
            "NoRouting" => CellKind::NoRouting,
            "FlowLink" | "Link" => CellKind::Link,
            _ => CellKind::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CellKind::EndRouting | CellKind::NoRouting)
    }
}

/// Runtime node.
#[derive(Debug, Clone)]
pub struct Cell {
    pub graph: GraphCell,
    pub kind: CellKind,
    pub model: Model,
    /// Outbound links.
    pub source_links: Vec<LinkId>,
    /// Inbound links.
    pub target_links: Vec<LinkId>,
    /// Values produced while traversing this cell.
    pub event_vars: BTreeMap<String, String>,
}

impl Cell {
    pub fn id(&self) -> &str {
        &self.graph.id
    }
}

/// Directed edge between two cells.
#[derive(Debug, Clone)]
pub struct Link {
    pub graph: GraphCell,
    pub source: CellId,
    pub target: CellId,
    /// Routing guard from the source cell's model.
    pub guard: Option<ModelLink>,
}

impl Link {
    pub fn id(&self) -> &str {
        &self.graph.id
    }

    pub fn source_port(&self) -> &str {
        self.graph.source.as_ref().map(|c| c.port.as_str()).unwrap_or("")
    }
}

/// Compare port tags ignoring case, spaces, `_` and `-`.
pub fn port_matches(port: &str, tag: &str) -> bool {
    fn norm(s: &str) -> impl Iterator<Item = char> + '_ {
        s.chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .map(|c| c.to_ascii_lowercase())
    }
    norm(port).eq(norm(tag))
}

/// A built routing flow.
#[derive(Debug, Clone)]
pub struct Flow {
    id: String,
    cells: Vec<Cell>,
    links: Vec<Link>,
    index: HashMap<String, CellId>,
    entry: CellId,
}

impl Flow {
    /// Build a flow from a decoded document.
    pub fn build(id: impl Into<String>, document: &FlowDocument) -> Result<Self, FlowError> {
        let id = id.into();
        let mut builder = Builder::new(document)?;

        for cell in &document.graph.cells {
            if CellKind::from_tag(&cell.kind) != CellKind::Link {
                builder.materialize(&cell.id)?;
            }
        }
        for cell in &document.graph.cells {
            if CellKind::from_tag(&cell.kind) == CellKind::Link {
                builder.attach_link(cell)?;
            }
        }

        let entry = builder.entry()?;
        debug!(
            flow = %id,
            cells = builder.cells.len(),
            links = builder.links.len(),
            "flow built"
        );

        Ok(Self {
            id,
            cells: builder.cells,
            links: builder.links,
            index: builder.index,
            entry,
        })
    }

    /// Decode and build a flow from a stored document value.
    pub fn from_value(id: impl Into<String>, value: &serde_json::Value) -> Result<Self, FlowError> {
        Self::build(id, &FlowDocument::from_value(value)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entry(&self) -> CellId {
        self.entry
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id]
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn find(&self, cell_id: &str) -> Option<CellId> {
        self.index.get(cell_id).copied()
    }

    /// Outbound link of `cell` leaving through `port`.
    pub fn outbound_by_port(&self, cell: CellId, port: &str) -> Option<LinkId> {
        self.cells[cell]
            .source_links
            .iter()
            .copied()
            .find(|&l| port_matches(self.links[l].source_port(), port))
    }
}

struct Builder<'a> {
    graph_cells: HashMap<&'a str, &'a GraphCell>,
    models: HashMap<&'a str, &'a UnparsedModel>,
    cells: Vec<Cell>,
    links: Vec<Link>,
    index: HashMap<String, CellId>,
    order: Vec<&'a str>,
}

impl<'a> Builder<'a> {
    fn new(document: &'a FlowDocument) -> Result<Self, FlowError> {
        let mut graph_cells = HashMap::new();
        let mut order = Vec::new();
        for cell in &document.graph.cells {
            if graph_cells.insert(cell.id.as_str(), cell).is_some() {
                return Err(FlowError::DuplicateCell(cell.id.clone()));
            }
            order.push(cell.id.as_str());
        }

        let mut models = HashMap::new();
        for model in &document.models {
            models.entry(model.id.as_str()).or_insert(model);
        }

        Ok(Self {
            graph_cells,
            models,
            cells: Vec::new(),
            links: Vec::new(),
            index: HashMap::new(),
            order,
        })
    }

    /// Cell index for `id`, creating the cell on first reference.
    fn materialize(&mut self, id: &str) -> Result<CellId, FlowError> {
        if let Some(&idx) = self.index.get(id) {
            return Ok(idx);
        }

        let graph = match self.graph_cells.get(id) {
            Some(cell) if CellKind::from_tag(&cell.kind) != CellKind::Link => *cell,
            _ => {
                return Err(FlowError::DanglingLink {
                    link: String::new(),
                    cell: id.to_string(),
                })
            }
        };

        let model = self
            .models
            .get(id)
            .map(|raw| Model::decode(raw))
            .unwrap_or_else(|| Model {
                id: id.to_string(),
                ..Default::default()
            });

        let idx = self.cells.len();
        self.cells.push(Cell {
            graph: graph.clone(),
            kind: CellKind::from_tag(&graph.kind),
            model,
            source_links: Vec::new(),
            target_links: Vec::new(),
            event_vars: BTreeMap::new(),
        });
        self.index.insert(id.to_string(), idx);
        Ok(idx)
    }

    fn endpoint(&mut self, link: &GraphCell, cell_id: Option<&str>) -> Result<CellId, FlowError> {
        let cell_id = cell_id.ok_or_else(|| FlowError::DanglingLink {
            link: link.id.clone(),
            cell: String::new(),
        })?;
        self.materialize(cell_id).map_err(|e| match e {
            FlowError::DanglingLink { cell, .. } => FlowError::DanglingLink {
                link: link.id.clone(),
                cell,
            },
            other => other,
        })
    }

    fn attach_link(&mut self, link: &GraphCell) -> Result<(), FlowError> {
        let source = self.endpoint(link, link.source.as_ref().map(|c| c.id.as_str()))?;
        let target = self.endpoint(link, link.target.as_ref().map(|c| c.id.as_str()))?;

        let target_id = self.cells[target].graph.id.clone();
        let guard = self.cells[source].model.link_to(&target_id).cloned();

        let idx = self.links.len();
        self.links.push(Link {
            graph: link.clone(),
            source,
            target,
            guard,
        });
        self.cells[source].source_links.push(idx);
        self.cells[target].target_links.push(idx);
        Ok(())
    }

    /// The first Launch cell in document order.
    fn entry(&self) -> Result<CellId, FlowError> {
        let launch = self
            .order
            .iter()
            .filter_map(|id| self.index.get(*id).copied())
            .find(|&idx| self.cells[idx].kind == CellKind::Launch)
            .ok_or(FlowError::MissingEntry)?;

        let cell = &self.cells[launch];
        if !cell.target_links.is_empty() {
            return Err(FlowError::InvalidEntry {
                cell: cell.graph.id.clone(),
                reason: format!("{} inbound links", cell.target_links.len()),
            });
        }
        if cell.source_links.len() != 1 {
            return Err(FlowError::InvalidEntry {
                cell: cell.graph.id.clone(),
                reason: format!("{} outbound links, expected 1", cell.source_links.len()),
            });
        }
        Ok(launch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(id: &str, from: &str, port: &str, to: &str) -> serde_json::Value {
        json!({
            "id": id, "type": "devs.FlowLink",
            "source": { "id": from, "port": port },
            "target": { "id": to, "port": "In" }
        })
    }

    fn build(cells: Vec<serde_json::Value>, models: serde_json::Value) -> Result<Flow, FlowError> {
        Flow::from_value("f1", &json!({ "graph": { "cells": cells }, "models": models }))
    }

    #[test]
    fn test_tags() {
        assert_eq!(CellKind::from_tag("devs.LowCostModel"), CellKind::LowCost);
        assert_eq!(CellKind::from_tag("LowCost"), CellKind::LowCost);
        assert_eq!(CellKind::from_tag("devs.FlowLink"), CellKind::Link);
        assert_eq!(CellKind::from_tag("devs.TeleportModel"), CellKind::Unknown);
    }

    #[test]
    fn test_ports_compare_loosely() {
        assert!(port_matches("No match", "no_match"));
        assert!(port_matches("NoMatch", "No match"));
        assert!(!port_matches("Out", "No match"));
    }

    #[test]
    fn test_build_links_and_models() {
        let flow = build(
            vec![
                json!({ "id": "start", "type": "devs.LaunchModel" }),
                json!({ "id": "cheap", "type": "devs.LowCostModel", "name": "Cheapest" }),
                json!({ "id": "end", "type": "devs.EndRoutingModel" }),
                link("l1", "start", "Out", "cheap"),
                link("l2", "cheap", "No match", "end"),
            ],
            json!([{ "id": "cheap", "name": "Cheapest", "data": { "max_rate": "0.1" },
                     "links": [ { "type": "fallback", "cell": "end" } ] }]),
        )
        .unwrap();

        assert_eq!(flow.cells().len(), 3);
        assert_eq!(flow.links().len(), 2);
        assert_eq!(flow.cell(flow.entry()).id(), "start");

        let cheap = flow.find("cheap").unwrap();
        assert_eq!(flow.cell(cheap).kind, CellKind::LowCost);
        assert_eq!(flow.cell(cheap).target_links.len(), 1);
        assert_eq!(flow.cell(cheap).model.number("max_rate").unwrap(), Some(0.1));

        let out = flow.outbound_by_port(cheap, "No match").unwrap();
        assert_eq!(flow.cell(flow.link(out).target).id(), "end");
        assert_eq!(flow.link(out).guard.as_ref().unwrap().kind, "fallback");
        assert!(flow.outbound_by_port(cheap, "Out").is_none());
    }

    #[test]
    fn test_cell_referenced_twice_is_shared() {
        let flow = build(
            vec![
                json!({ "id": "start", "type": "devs.LaunchModel" }),
                json!({ "id": "a", "type": "devs.LowCostModel" }),
                json!({ "id": "b", "type": "devs.HighCostModel" }),
                json!({ "id": "end", "type": "devs.EndRoutingModel" }),
                link("l1", "start", "Out", "a"),
                link("l2", "a", "No match", "end"),
                link("l3", "b", "No match", "end"),
            ],
            json!([]),
        )
        .unwrap();

        let end = flow.find("end").unwrap();
        assert_eq!(flow.cell(end).target_links.len(), 2);
        assert_eq!(flow.cells().iter().filter(|c| c.id() == "end").count(), 1);
    }

    #[test]
    fn test_dangling_link_is_an_error() {
        let err = build(
            vec![
                json!({ "id": "start", "type": "devs.LaunchModel" }),
                link("l1", "start", "Out", "ghost"),
            ],
            json!([]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FlowError::DanglingLink { ref link, ref cell } if link == "l1" && cell == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_cell_ids_rejected() {
        let err = build(
            vec![
                json!({ "id": "x", "type": "devs.LaunchModel" }),
                json!({ "id": "x", "type": "devs.EndRoutingModel" }),
            ],
            json!([]),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::DuplicateCell(ref id) if id == "x"));
    }

    #[test]
    fn test_entry_requirements() {
        let err = build(vec![json!({ "id": "end", "type": "devs.EndRoutingModel" })], json!([]))
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingEntry));

        let err = build(vec![json!({ "id": "start", "type": "devs.LaunchModel" })], json!([]))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidEntry { .. }));

        let err = build(
            vec![
                json!({ "id": "start", "type": "devs.LaunchModel" }),
                json!({ "id": "a", "type": "devs.LowCostModel" }),
                link("l1", "start", "Out", "a"),
                link("l2", "a", "No match", "start"),
            ],
            json!([]),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::InvalidEntry { .. }));
    }

    #[test]
    fn test_unknown_kind_builds() {
        let flow = build(
            vec![
                json!({ "id": "start", "type": "devs.LaunchModel" }),
                json!({ "id": "odd", "type": "devs.TeleportModel" }),
                link("l1", "start", "Out", "odd"),
            ],
            json!([]),
        )
        .unwrap();
        assert_eq!(flow.cell(flow.find("odd").unwrap()).kind, CellKind::Unknown);
    }
}
