//! Per-kind cell decisions.
//!
//! Each decision is a plain function looked up by [`CellKind`]. It reads the
//! cell's model and the traversal context and reports the providers it
//! produced plus whether the cell matched. The executor turns that into the
//! next link: providers end traversal, otherwise the `Out` port is taken on
//! a match and `No match` on a miss.

use std::cmp::Ordering;

use super::executor::TraversalContext;
use super::graph::{CellKind, Flow};
use super::model::Model;
use super::FlowError;
use crate::address::{parse_network, parse_source};
use crate::router::{Candidate, RoutableProvider};

/// What a decision produced.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub providers: Vec<RoutableProvider>,
    pub matched: bool,
    pub vars: Vec<(String, String)>,
}

impl Decision {
    fn providers(providers: Vec<RoutableProvider>, kind: &str) -> Self {
        let mut vars = vec![("decision".to_string(), kind.to_string())];
        if let Some(first) = providers.first() {
            vars.push(("selected_provider".to_string(), first.provider_id.clone()));
        }
        vars.push(("provider_count".to_string(), providers.len().to_string()));
        Self {
            matched: !providers.is_empty(),
            providers,
            vars,
        }
    }
}

pub type DecisionFn = fn(&Model, &TraversalContext) -> Result<Decision, FlowError>;

const DECISIONS: &[(CellKind, DecisionFn)] = &[
    (CellKind::CallCapacity, call_capacity),
    (CellKind::LowCost, low_cost),
    (CellKind::HighCost, high_cost),
    (CellKind::LocationCheck, location_check),
    (CellKind::UserPriority, user_priority),
    (CellKind::SortServers, sort_servers),
];

/// Decision function for a cell kind, `None` for kinds that do not decide.
pub fn lookup(kind: CellKind) -> Option<DecisionFn> {
    DECISIONS.iter().find(|(k, _)| *k == kind).map(|(_, f)| *f)
}

/// Run the decision of a cell.
pub fn decide(flow: &Flow, cell: usize, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let cell = flow.cell(cell);
    let decide = lookup(cell.kind).ok_or_else(|| FlowError::UnknownCellType {
        cell: cell.id().to_string(),
        tag: cell.graph.kind.clone(),
    })?;
    decide(&cell.model, ctx)
}

/// Best candidate of each provider matching the destination, best first.
fn candidates(ctx: &TraversalContext) -> Result<Vec<Candidate>, FlowError> {
    Ok(ctx.catalog().candidates(ctx.to())?)
}

/// Resolve candidates to routable providers, dropping those without hosts.
fn resolve<'a, I>(ctx: &TraversalContext, candidates: I) -> Result<Vec<RoutableProvider>, FlowError>
where
    I: IntoIterator<Item = (&'a Candidate, String)>,
{
    let mut out = Vec::new();
    for (candidate, number) in candidates {
        if let Some(p) = ctx.catalog().routable(candidate, ctx.to(), number)? {
            out.push(p);
        }
    }
    Ok(out)
}

fn resolve_default(ctx: &TraversalContext, candidates: &[Candidate]) -> Result<Vec<RoutableProvider>, FlowError> {
    resolve(
        ctx,
        candidates.iter().map(|c| (c, c.dial_number(ctx.to()))),
    )
}

fn low_cost(model: &Model, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let max_rate = model.number("max_rate")?;
    let mut list: Vec<Candidate> = candidates(ctx)?
        .into_iter()
        .filter(|c| max_rate.map_or(true, |max| c.rate <= max))
        .collect();
    list.sort_by(|a, b| a.rate.total_cmp(&b.rate));
    Ok(Decision::providers(resolve_default(ctx, &list)?, "low_cost"))
}

fn high_cost(model: &Model, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let min_rate = model.number("min_rate")?;
    let mut list: Vec<Candidate> = candidates(ctx)?
        .into_iter()
        .filter(|c| min_rate.map_or(true, |min| c.rate >= min))
        .collect();
    list.sort_by(|a, b| b.rate.total_cmp(&a.rate));
    Ok(Decision::providers(resolve_default(ctx, &list)?, "high_cost"))
}

fn call_capacity(model: &Model, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let max_channels = model.number("max_channels")?;
    let mut list: Vec<Candidate> = candidates(ctx)?
        .into_iter()
        .filter(|c| max_channels.map_or(true, |max| (c.active_channels as f64) < max))
        .collect();
    list.sort_by_key(|c| c.active_channels);
    Ok(Decision::providers(resolve_default(ctx, &list)?, "call_capacity"))
}

/// Listed providers in listed order. Entries match provider id or name.
fn user_priority(model: &Model, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let order = model.list("providers")?.unwrap_or_default();
    let prefixes = model.map("prefixes")?;
    let all = candidates(ctx)?;

    let mut picked: Vec<(&Candidate, String)> = Vec::new();
    for wanted in &order {
        let found = all
            .iter()
            .find(|c| &c.provider_id == wanted || &c.provider_name == wanted);
        if let Some(c) = found {
            if picked.iter().any(|(p, _)| p.provider_id == c.provider_id) {
                continue;
            }
            let number = prefixes
                .and_then(|m| m.get(&c.provider_id).or_else(|| m.get(&c.provider_name)))
                .map(|prefix| format!("{}{}", prefix, ctx.to()))
                .unwrap_or_else(|| c.dial_number(ctx.to()));
            picked.push((c, number));
        }
    }

    Ok(Decision::providers(resolve(ctx, picked)?, "user_priority"))
}

fn sort_servers(model: &Model, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let key = model.str("sort_by")?.unwrap_or("specificity").to_string();
    let descending = model.bool("descending")?.unwrap_or(false);

    let compare: fn(&Candidate, &Candidate) -> Ordering = match key.as_str() {
        "rate" => |a, b| a.rate.total_cmp(&b.rate),
        "channels" => |a, b| a.active_channels.cmp(&b.active_channels),
        "name" => |a, b| a.provider_name.cmp(&b.provider_name),
        "specificity" => |a, b| crate::router::compare_candidates(a, b),
        other => {
            return Err(FlowError::InvalidModelField {
                cell: model.id.clone(),
                field: "sort_by".into(),
                reason: format!("unknown sort key '{}'", other),
            })
        }
    };

    let mut list = candidates(ctx)?;
    list.sort_by(|a, b| {
        let ord = compare(a, b);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });

    Ok(Decision::providers(resolve_default(ctx, &list)?, "sort_servers"))
}

/// Branch on where the call comes from and goes to. Every configured
/// criterion must hold. Never yields providers.
fn location_check(model: &Model, ctx: &TraversalContext) -> Result<Decision, FlowError> {
    let mut matched = true;

    if let Some(countries) = model.list("countries")? {
        matched &= ctx
            .dest_code()
            .map_or(false, |code| countries.iter().any(|c| c == code));
    }
    if let Some(origins) = model.list("origin_countries")? {
        matched &= ctx
            .origin_code()
            .map_or(false, |code| origins.iter().any(|c| c == code));
    }
    if let Some(networks) = model.list("networks")? {
        let inside = match ctx.source_ip() {
            Some(source) => {
                let ip = parse_source(source)?;
                let mut inside = false;
                for net in &networks {
                    if parse_network(net)?.contains(&ip) {
                        inside = true;
                        break;
                    }
                }
                inside
            }
            None => false,
        };
        matched &= inside;
    }

    Ok(Decision {
        providers: Vec::new(),
        matched,
        vars: vec![
            ("decision".to_string(), "location_check".to_string()),
            ("location_match".to_string(), matched.to_string()),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::document::UnparsedModel;
    use crate::router::ProviderCatalog;
    use crate::store::{ProviderHost, ProviderRate};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn rate(id: &str, name: &str, rate: f64, channels: u32, prefixes: &[&str]) -> ProviderRate {
        ProviderRate {
            provider_id: id.into(),
            provider_name: name.into(),
            dial_prefix: "00".into(),
            rate,
            rate_prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
            active_channels: channels,
        }
    }

    fn ctx(to: &str) -> TraversalContext {
        let rates = vec![
            rate("p1", "alpha", 0.03, 10, &["44"]),
            rate("p2", "beta", 0.01, 40, &["44"]),
            rate("p3", "gamma", 0.02, 5, &["4420"]),
            rate("p4", "delta", 0.001, 0, &["^1"]),
        ];
        let mut hosts = HashMap::new();
        for id in ["p1", "p2", "p3", "p4"] {
            hosts.insert(
                id.to_string(),
                vec![ProviderHost {
                    address: format!("{}.example.net", id),
                    priority_prefixes: String::new(),
                }],
            );
        }
        TraversalContext::new(Arc::new(ProviderCatalog::new(rates, hosts)))
            .with_var("from", "15551230000")
            .with_var("to", to)
            .with_var("origin_code", "1")
            .with_var("dest_code", "44")
    }

    fn model(data: serde_json::Value) -> Model {
        let raw: UnparsedModel =
            serde_json::from_value(json!({ "id": "c", "data": data })).unwrap();
        Model::decode(&raw)
    }

    fn ids(d: &Decision) -> Vec<&str> {
        d.providers.iter().map(|p| p.provider_id.as_str()).collect()
    }

    #[test]
    fn test_table_covers_decision_kinds_only() {
        assert!(lookup(CellKind::LowCost).is_some());
        assert!(lookup(CellKind::LocationCheck).is_some());
        assert!(lookup(CellKind::Launch).is_none());
        assert!(lookup(CellKind::EndRouting).is_none());
        assert!(lookup(CellKind::Unknown).is_none());
    }

    #[test]
    fn test_low_cost_orders_by_rate_with_limit() {
        let d = low_cost(&model(json!({})), &ctx("442071234567")).unwrap();
        assert_eq!(ids(&d), vec!["p2", "p3", "p1"]);
        assert!(d.matched);
        assert_eq!(d.providers[0].number, "00442071234567");

        let d = low_cost(&model(json!({ "max_rate": "0.02" })), &ctx("442071234567")).unwrap();
        assert_eq!(ids(&d), vec!["p2", "p3"]);
    }

    #[test]
    fn test_high_cost_orders_descending() {
        let d = high_cost(&model(json!({ "min_rate": "0.02" })), &ctx("442071234567")).unwrap();
        assert_eq!(ids(&d), vec!["p1", "p3"]);
    }

    #[test]
    fn test_call_capacity_prefers_idle_providers() {
        let d = call_capacity(&model(json!({ "max_channels": "30" })), &ctx("442071234567")).unwrap();
        assert_eq!(ids(&d), vec!["p3", "p1"]);
    }

    #[test]
    fn test_no_candidates_is_a_miss() {
        let d = low_cost(&model(json!({})), &ctx("8612345")).unwrap();
        assert!(d.providers.is_empty());
        assert!(!d.matched);
    }

    #[test]
    fn test_user_priority_order_and_prefix_override() {
        let d = user_priority(
            &model(json!({
                "providers": ["gamma", "p1", "delta", "p1"],
                "prefixes": { "p1": "9" }
            })),
            &ctx("442071234567"),
        )
        .unwrap();
        assert_eq!(ids(&d), vec!["p3", "p1"]);
        assert_eq!(d.providers[1].number, "9442071234567");
    }

    #[test]
    fn test_sort_servers_keys() {
        let d = sort_servers(&model(json!({ "sort_by": "name" })), &ctx("442071234567")).unwrap();
        assert_eq!(ids(&d), vec!["p1", "p2", "p3"]);

        let d = sort_servers(
            &model(json!({ "sort_by": "channels", "descending": true })),
            &ctx("442071234567"),
        )
        .unwrap();
        assert_eq!(ids(&d), vec!["p2", "p1", "p3"]);

        let d = sort_servers(&model(json!({})), &ctx("442071234567")).unwrap();
        assert_eq!(ids(&d)[0], "p3");

        assert!(sort_servers(&model(json!({ "sort_by": "vibes" })), &ctx("44")).is_err());
    }

    #[test]
    fn test_location_check_criteria() {
        let c = ctx("442071234567").with_var("source_ip", "10.1.2.3:5060");

        let d = location_check(&model(json!({ "countries": ["44", "33"] })), &c).unwrap();
        assert!(d.matched);
        assert!(d.providers.is_empty());

        let d = location_check(
            &model(json!({ "countries": ["44"], "origin_countries": ["33"] })),
            &c,
        )
        .unwrap();
        assert!(!d.matched);

        let d = location_check(&model(json!({ "networks": ["10.0.0.0/8"] })), &c).unwrap();
        assert!(d.matched);

        let d = location_check(&model(json!({ "networks": ["10.0.0.0/8"] })), &ctx("44")).unwrap();
        assert!(!d.matched);

        assert!(matches!(
            location_check(&model(json!({ "networks": ["10.0.0.0/99"] })), &c),
            Err(FlowError::Address(_))
        ));
    }
}
