//! Flow traversal.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::decision;
use super::graph::{CellId, CellKind, Flow};
use super::FlowError;
use crate::router::{ProviderCatalog, RoutableProvider};
use crate::telemetry::counters;

pub const PORT_OUT: &str = "Out";
pub const PORT_NO_MATCH: &str = "No match";

/// Request data threaded through a traversal.
///
/// Well-known keys: `from`, `to`, `origin_code`, `dest_code`, `source_ip`,
/// `workspace_id`. Decisions add their own as they run.
#[derive(Debug, Clone)]
pub struct TraversalContext {
    vars: BTreeMap<String, String>,
    catalog: Arc<ProviderCatalog>,
}

impl TraversalContext {
    pub fn new(catalog: Arc<ProviderCatalog>) -> Self {
        Self {
            vars: BTreeMap::new(),
            catalog,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn to(&self) -> &str {
        self.var("to").unwrap_or("")
    }

    pub fn from(&self) -> &str {
        self.var("from").unwrap_or("")
    }

    pub fn dest_code(&self) -> Option<&str> {
        self.var("dest_code")
    }

    pub fn origin_code(&self) -> Option<&str> {
        self.var("origin_code")
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.var("source_ip")
    }
}

/// How a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A decision produced providers.
    Routed,
    /// Reached an EndRouting cell.
    EndRouting,
    /// Reached a NoRouting cell.
    NoRouting,
    /// A decision had no link to follow.
    DeadEnd,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Routed => "routed",
            Termination::EndRouting => "end_routing",
            Termination::NoRouting => "no_routing",
            Termination::DeadEnd => "dead_end",
        }
    }
}

/// Result of a traversal. An empty provider list means no route.
#[derive(Debug, Clone, Serialize)]
pub struct FlowOutcome {
    pub flow_id: String,
    pub providers: Vec<RoutableProvider>,
    pub termination: Termination,
    /// Cell ids in visiting order.
    pub path: Vec<String>,
    pub vars: BTreeMap<String, String>,
}

enum Step {
    Next(CellId),
    Done(Vec<RoutableProvider>, Termination),
}

/// Walks a flow from its Launch cell one transition at a time.
#[derive(Debug, Clone, Default)]
pub struct FlowExecutor {
    step_budget: Option<usize>,
}

impl FlowExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of transitions. Defaults to the number of cells.
    pub fn with_step_budget(mut self, steps: usize) -> Self {
        self.step_budget = Some(steps);
        self
    }

    pub fn run(&self, flow: &mut Flow, mut ctx: TraversalContext) -> Result<FlowOutcome, FlowError> {
        let budget = self.step_budget.unwrap_or(flow.cells().len());
        let mut visited: HashSet<CellId> = HashSet::new();
        let mut path = Vec::new();
        let mut current = flow.entry();

        let result = loop {
            let cell_id = flow.cell(current).id().to_string();
            if !visited.insert(current) || path.len() >= budget {
                counters::flow_executed("cycle");
                return Err(FlowError::CycleDetected { cell: cell_id });
            }
            path.push(cell_id);

            match self.step(flow, current, &mut ctx)? {
                Step::Next(next) => current = next,
                Step::Done(providers, termination) => break (providers, termination),
            }
        };

        let (providers, termination) = result;
        debug!(
            flow = %flow.id(),
            steps = path.len(),
            providers = providers.len(),
            termination = termination.as_str(),
            "flow executed"
        );
        counters::flow_executed(termination.as_str());

        Ok(FlowOutcome {
            flow_id: flow.id().to_string(),
            providers,
            termination,
            path,
            vars: ctx.vars,
        })
    }

    fn step(&self, flow: &mut Flow, current: CellId, ctx: &mut TraversalContext) -> Result<Step, FlowError> {
        let kind = flow.cell(current).kind;
        trace!(cell = %flow.cell(current).id(), kind = ?kind, "visiting cell");

        match kind {
            CellKind::Launch => match flow.cell(current).source_links.first() {
                Some(&link) => Ok(Step::Next(flow.link(link).target)),
                None => Ok(Step::Done(Vec::new(), Termination::DeadEnd)),
            },
            CellKind::EndRouting => Ok(Step::Done(Vec::new(), Termination::EndRouting)),
            CellKind::NoRouting => Ok(Step::Done(Vec::new(), Termination::NoRouting)),
            _ => {
                let decision = decision::decide(flow, current, ctx)?;

                let cell = flow.cell_mut(current);
                for (key, value) in &decision.vars {
                    cell.event_vars.insert(key.clone(), value.clone());
                }
                ctx.vars.extend(decision.vars);

                if !decision.providers.is_empty() {
                    return Ok(Step::Done(decision.providers, Termination::Routed));
                }

                let port = if decision.matched { PORT_OUT } else { PORT_NO_MATCH };
                match flow.outbound_by_port(current, port) {
                    Some(link) => Ok(Step::Next(flow.link(link).target)),
                    None => Ok(Step::Done(Vec::new(), Termination::DeadEnd)),
                }
            }
        }
    }
}
