//! Tenant-authored routing flows.
//!
//! A flow document is decoded into [`FlowDocument`], built into a [`Flow`]
//! of cells and links, then walked by [`FlowExecutor`] from its Launch cell
//! until a decision yields providers or a terminal cell is reached.

mod decision;
mod document;
mod executor;
mod graph;
mod model;

pub use decision::{lookup as decision_for, Decision, DecisionFn};
pub use document::{CellConnection, FlowDocument, Graph, GraphCell, ModelLink, UnparsedModel, Vertex};
pub use executor::{FlowExecutor, FlowOutcome, Termination, TraversalContext, PORT_NO_MATCH, PORT_OUT};
pub use graph::{port_matches, Cell, CellId, CellKind, Flow, Link, LinkId};
pub use model::{Model, ModelValue};

use thiserror::Error;

use crate::address::AddressParseError;
use crate::router::RouterError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("malformed flow document: {0}")]
    Parse(String),

    #[error("duplicate cell id '{0}'")]
    DuplicateCell(String),

    #[error("link '{link}' references missing cell '{cell}'")]
    DanglingLink { link: String, cell: String },

    #[error("flow has no Launch cell")]
    MissingEntry,

    #[error("invalid Launch cell '{cell}': {reason}")]
    InvalidEntry { cell: String, reason: String },

    #[error("invalid field '{field}' on cell '{cell}': {reason}")]
    InvalidModelField {
        cell: String,
        field: String,
        reason: String,
    },

    #[error("unsupported cell type '{tag}' on cell '{cell}'")]
    UnknownCellType { cell: String, tag: String },

    #[error("cycle detected at cell '{cell}'")]
    CycleDetected { cell: String },

    #[error(transparent)]
    Address(#[from] AddressParseError),

    #[error(transparent)]
    Router(#[from] RouterError),
}
