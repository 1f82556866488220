//! End-to-end routing over the in-memory store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use siprouted::address::{cidr_contains, Admission, AddressParseError};
use siprouted::config::{Config, NotificationConfig};
use siprouted::notify::{FirstCallNotifier, Mailer, Notice, NotificationPool, NotifyError, OutboundCall};
use siprouted::router::{to_cents, RoutePath, RouterError};
use siprouted::service::{DidDecision, DidRejection, InboundRoute};
use siprouted::store::{
    CircuitBreakerConfig, GuardedStore, MemoryStore, RoutingData, StoreError, TrunkRef, WhitelistScope,
};
use siprouted::trunk::{Liveness, LivenessProbe, SipUri, TargetSource};
use siprouted::{EntryContext, RoutingError, RoutingService};

const FIXTURE: &str = r#"
notifications:
  workers: 1
  queue_capacity: 8

data:
  workspaces:
    - id: ws-acme
      name: Acme
      creator_id: u-acme
      byo_enabled: true
      notify_email: owner@acme.example
    - id: ws-open
      name: Open
      creator_id: u-open
      ip_whitelist_disabled: true

  providers:
    - id: p-wide
      name: wide
      dial_prefix: "00"
      rates:
        - rate: 0.02
          prefixes: ["^1"]
      hosts:
        - address: sip.wide.example
    - id: p-toronto
      name: toronto
      dial_prefix: "11"
      rates:
        - rate: 0.01
          prefixes: ["^1416"]
      hosts:
        - address: sip.toronto.example
    - id: p-uk
      name: uk
      rates:
        - rate: 0.015
          prefixes: ["^44"]
      hosts:
        - address: uk1.example
        - address: uk2.example
          priority_prefixes: "^4420"
      whitelist:
        - ip: 203.0.113.0
          range: /24
    - id: p-retired
      name: retired
      active: false
      rates:
        - rate: 0.001
          prefixes: ["^44"]
      hosts:
        - address: retired.example

  byo_carriers:
    - workspace_id: ws-acme
      name: acme-carrier
      address: 10.9.9.9
      routes:
        - prefix: "^33"
          prepend: "+"
      whitelist:
        - ip: 198.51.100.7

  whitelists:
    workspaces:
      ws-acme:
        - ip: 192.168.1.0
          range: "24"
      ws-open:
        - ip: 10.0.0.1

  trunks:
    - id: t-main
      endpoints:
        - uri: sip:b.trunk.example
          priority: 2
        - uri: sip:a.trunk.example
          priority: 1
      recovery_uri: sip:r.trunk.example

  dids:
    - did: "15145550100"
      workspace_id: ws-acme
      kind: platform
      trunk_id: t-main
    - did: "442071230000"
      workspace_id: ws-acme
      kind: platform
    - did: "33123456789"
      workspace_id: ws-acme
      kind: byo

  blocked_numbers:
    - workspace_id: ws-acme
      number: "+15555550199"

  flows:
    - flow_id: tenant-uk
      selector: { kind: tenant, user_id: u-acme, dest_code: "44" }
      document:
        graph:
          cells:
            - { id: start, type: devs.LaunchModel }
            - { id: pick, type: devs.UserPriorityModel }
            - { id: none, type: devs.NoRoutingModel }
            - { id: l1, type: devs.FlowLink, source: { id: start, port: Out }, target: { id: pick, port: In } }
            - { id: l2, type: devs.FlowLink, source: { id: pick, port: No match }, target: { id: none, port: In } }
        models:
          - id: pick
            data: { providers: [uk] }
    - flow_id: country-1
      selector: { kind: country, dest_code: "1" }
      document:
        graph:
          cells:
            - { id: start, type: devs.LaunchModel }
            - { id: where, type: devs.LocationCheckModel }
            - { id: cheap, type: devs.LowCostModel }
            - { id: none, type: devs.NoRoutingModel }
            - { id: l1, type: devs.FlowLink, source: { id: start, port: Out }, target: { id: where, port: In } }
            - { id: l2, type: devs.FlowLink, source: { id: where, port: Out }, target: { id: cheap, port: In } }
            - { id: l3, type: devs.FlowLink, source: { id: where, port: No match }, target: { id: none, port: In } }
        models:
          - id: where
            data: { countries: ["1"] }
"#;

/// Online for a fixed set of hosts.
struct Scripted {
    online: HashSet<String>,
}

impl Scripted {
    fn new(online: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            online: online.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl LivenessProbe for Scripted {
    async fn probe(&self, uri: &SipUri) -> Liveness {
        if self.online.contains(&uri.host) {
            Liveness::Online
        } else {
            Liveness::Offline("scripted".into())
        }
    }
}

fn memory() -> Arc<MemoryStore> {
    let config = Config::from_yaml(FIXTURE).unwrap();
    Arc::new(MemoryStore::new(config.data))
}

fn service_with(store: Arc<MemoryStore>, online: &[&str]) -> RoutingService {
    RoutingService::new(store, Scripted::new(online))
}

fn service() -> RoutingService {
    service_with(memory(), &[])
}

fn lcr_store(rows: &[(&str, &str, f64)]) -> RoutingService {
    let providers: Vec<serde_json::Value> = rows
        .iter()
        .map(|(id, prefix, rate)| {
            serde_json::json!({
                "id": id,
                "name": id,
                "rates": [{ "rate": rate, "prefixes": [prefix] }],
                "hosts": [{ "address": format!("{}.example", id) }],
            })
        })
        .collect();
    let data: RoutingData = serde_json::from_value(serde_json::json!({ "providers": providers })).unwrap();
    service_with(Arc::new(MemoryStore::new(data)), &[])
}

// ---------------------------------------------------------------------------
// Least cost routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_longer_prefix_beats_lower_rate() {
    let svc = lcr_store(&[("P1", "1", 0.02), ("P2", "1416", 0.01)]);
    let routes = svc.resolve_route(None, "442071234567", "14165551234").await.unwrap();
    assert_eq!(routes[0].provider_id, "P2");

    // Even when the longer prefix is the more expensive one.
    let svc = lcr_store(&[("P1", "1", 0.01), ("P2", "1416", 0.02)]);
    let routes = svc.resolve_route(None, "442071234567", "14165551234").await.unwrap();
    assert_eq!(routes[0].provider_id, "P2");
    assert_eq!(routes[1].provider_id, "P1");
}

#[tokio::test]
async fn test_equal_prefix_lower_rate_wins() {
    let svc = lcr_store(&[("P1", "1416", 0.02), ("P2", "1416", 0.01)]);
    let routes = svc.resolve_route(None, "442071234567", "14165551234").await.unwrap();
    assert_eq!(routes[0].provider_id, "P2");
    assert_eq!(routes[0].rate, Some(0.01));
}

#[tokio::test]
async fn test_platform_routes_are_ranked_and_rewritten() {
    let routes = service().resolve_route(None, "15145550100", "14165551234").await.unwrap();
    let ids: Vec<_> = routes.iter().map(|r| r.provider_id.as_str()).collect();
    assert_eq!(ids, vec!["p-toronto", "p-wide"]);

    assert_eq!(routes[0].address, "sip.toronto.example");
    assert_eq!(routes[0].number, "1114165551234");
    assert_eq!(routes[0].path, RoutePath::Platform);
    assert_eq!(routes[1].number, "0014165551234");
}

#[tokio::test]
async fn test_inactive_provider_is_ignored_and_priority_host_used() {
    let svc = service();

    let routes = svc.resolve_route(None, "15145550100", "447700900000").await.unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].provider_id, "p-uk");
    assert_eq!(routes[0].address, "uk1.example");

    let routes = svc.resolve_route(None, "15145550100", "442071234567").await.unwrap();
    assert_eq!(routes[0].address, "uk2.example");
}

#[tokio::test]
async fn test_byo_workspace_uses_only_its_carriers() {
    let svc = service();

    let routes = svc
        .resolve_route(Some("ws-acme"), "15145550100", "33123456789")
        .await
        .unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].path, RoutePath::Byo);
    assert_eq!(routes[0].address, "10.9.9.9");
    assert_eq!(routes[0].number, "+33123456789");

    // p-uk carries this destination on the platform, but BYO workspaces
    // never fall through to platform providers.
    let err = svc
        .resolve_route(Some("ws-acme"), "15145550100", "442071234567")
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::Router(RouterError::NoRouteFound { .. })));

    let routes = svc
        .resolve_route(Some("ws-open"), "15145550100", "442071234567")
        .await
        .unwrap();
    assert_eq!(routes[0].path, RoutePath::Platform);
}

#[tokio::test]
async fn test_no_route_and_unknown_workspace() {
    let svc = service();

    let err = svc.resolve_route(None, "15145550100", "8613800000000").await.unwrap_err();
    assert!(matches!(err, RoutingError::Router(RouterError::NoRouteFound { .. })));

    let err = svc
        .resolve_route(Some("ws-missing"), "15145550100", "14165551234")
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::UnknownWorkspace(_)));
}

#[test]
fn test_cents_truncate() {
    assert_eq!(to_cents(12.345), 1234);
}

// ---------------------------------------------------------------------------
// Flow selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tenant_flow_preferred() {
    let outcome = service()
        .route_by_flow("u-acme", EntryContext::for_call("+1 514 555 0100", "+44 20 7123 4567"))
        .await
        .unwrap();
    assert_eq!(outcome.flow_id, "tenant-uk");
    assert_eq!(outcome.providers.len(), 1);
    assert_eq!(outcome.providers[0].provider_id, "p-uk");
}

#[tokio::test]
async fn test_country_flow_fallback() {
    let outcome = service()
        .route_by_flow("u-someone", EntryContext::for_call("+442071234567", "+14165551234"))
        .await
        .unwrap();
    assert_eq!(outcome.flow_id, "country-1");
    assert_eq!(outcome.path, vec!["start", "where", "cheap"]);
    let ids: Vec<_> = outcome.providers.iter().map(|p| p.provider_id.as_str()).collect();
    assert_eq!(ids, vec!["p-toronto", "p-wide"]);
}

#[tokio::test]
async fn test_no_flow_for_destination() {
    let err = service()
        .route_by_flow("u-acme", EntryContext::for_call("+15145550100", "+33123456789"))
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::NoFlow(_)));
}

#[test]
fn test_entry_context_from_international_numbers() {
    let entry = EntryContext::for_call("+1 514 555 0100", "0044 20 7123 4567");
    assert_eq!(entry.from, "15145550100");
    assert_eq!(entry.to, "442071234567");
    assert_eq!(entry.origin_code.as_deref(), Some("1"));
    assert_eq!(entry.dest_code.as_deref(), Some("44"));
}

#[tokio::test]
async fn test_national_destination_has_no_country() {
    let entry = EntryContext::for_call("+15145550100", "6505555555");
    assert_eq!(entry.to, "6505555555");
    assert!(entry.dest_code.is_none());

    let err = service().route_by_flow("u-acme", entry).await.unwrap_err();
    assert!(matches!(err, RoutingError::Number(_)));
}

// ---------------------------------------------------------------------------
// Address admission
// ---------------------------------------------------------------------------

#[test]
fn test_cidr_contains() {
    assert!(cidr_contains("192.168.1.5", "192.168.1.0/24").unwrap());
    assert!(!cidr_contains("192.168.1.5", "10.0.0.0/8").unwrap());
    assert!(matches!(
        cidr_contains("192.168.1.5", "192.168.1.0/33"),
        Err(AddressParseError::InvalidNetwork(_))
    ));
}

#[tokio::test]
async fn test_whitelist_bypass_reads_no_rows() {
    let store = memory();
    let svc = service_with(store.clone(), &[]);

    let scope = WhitelistScope::Workspace {
        workspace_id: "ws-open".into(),
    };
    for source in ["8.8.8.8", "10.0.0.1", "2001:db8::1"] {
        assert_eq!(
            svc.validate_source_address(&scope, source).await.unwrap(),
            Admission::Bypassed
        );
    }
    assert_eq!(store.whitelist_lookups(), 0);
}

#[tokio::test]
async fn test_workspace_whitelist() {
    let svc = service();
    let scope = WhitelistScope::Workspace {
        workspace_id: "ws-acme".into(),
    };

    assert_eq!(
        svc.validate_source_address(&scope, "192.168.1.5:5060").await.unwrap(),
        Admission::Admitted
    );
    assert_eq!(
        svc.validate_source_address(&scope, "10.1.1.1").await.unwrap(),
        Admission::Rejected
    );
    assert!(matches!(
        svc.validate_source_address(&scope, "999.1.1.1").await,
        Err(RoutingError::Address(_))
    ));
}

// ---------------------------------------------------------------------------
// Trunk failover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_trunk_failover_to_next_endpoint() {
    let svc = service_with(memory(), &["b.trunk.example", "r.trunk.example"]);
    let target = svc
        .resolve_trunk_target(&TrunkRef::Trunk("t-main".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.uri, "sip:b.trunk.example");
}

#[tokio::test]
async fn test_trunk_failover_to_recovery() {
    let svc = service_with(memory(), &["r.trunk.example"]);
    let target = svc
        .resolve_trunk_target(&TrunkRef::Did("15145550100".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.uri, "sip:r.trunk.example");
    assert_eq!(target.source, TargetSource::Recovery);
}

#[tokio::test]
async fn test_trunk_all_offline_is_not_found() {
    let svc = service_with(memory(), &[]);
    assert!(svc
        .resolve_trunk_target(&TrunkRef::Trunk("t-main".into()))
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Incoming DIDs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_incoming_did_decisions() {
    let svc = service();

    assert_eq!(
        svc.validate_incoming_did("15145550100", "15145550111", "1.2.3.4").await.unwrap(),
        DidDecision::Accepted(InboundRoute::UserSipTrunk {
            workspace_id: "ws-acme".into(),
            trunk_id: "t-main".into(),
        })
    );

    assert_eq!(
        svc.validate_incoming_did("442071230000", "15145550111", "203.0.113.50").await.unwrap(),
        DidDecision::Accepted(InboundRoute::NetworkManaged {
            workspace_id: "ws-acme".into(),
        })
    );

    assert_eq!(
        svc.validate_incoming_did("442071230000", "15145550111", "1.2.3.4").await.unwrap(),
        DidDecision::Rejected(DidRejection::NotWhitelisted)
    );

    assert_eq!(
        svc.validate_incoming_did("442071230000", "+1 555 555 0199", "203.0.113.50")
            .await
            .unwrap(),
        DidDecision::Rejected(DidRejection::Blocked)
    );

    // National form is read as a North American number.
    assert_eq!(
        svc.validate_incoming_did("442071230000", "(555) 555-0199", "203.0.113.50")
            .await
            .unwrap(),
        DidDecision::Rejected(DidRejection::Blocked)
    );

    assert_eq!(
        svc.validate_incoming_did("33123456789", "15145550111", "198.51.100.7").await.unwrap(),
        DidDecision::Accepted(InboundRoute::ByoCarrier {
            workspace_id: "ws-acme".into(),
        })
    );

    assert_eq!(
        svc.validate_incoming_did("33123456789", "15145550111", "203.0.113.50").await.unwrap(),
        DidDecision::Rejected(DidRejection::NotWhitelisted)
    );

    assert_eq!(
        svc.validate_incoming_did("19995550000", "15145550111", "203.0.113.50").await.unwrap(),
        DidDecision::Rejected(DidRejection::UnknownDid)
    );
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_store_outage_trips_breaker() {
    let memory = memory();
    memory.set_offline(true);
    let guarded = Arc::new(GuardedStore::new(
        memory,
        CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            open_timeout: Duration::from_secs(60),
        },
        Some(Duration::from_secs(1)),
    ));
    let svc = RoutingService::new(guarded, Scripted::new(&[]));

    for _ in 0..2 {
        let err = svc.resolve_route(None, "15145550100", "14165551234").await.unwrap_err();
        assert!(matches!(
            err,
            RoutingError::Router(RouterError::Store(StoreError::Unavailable(_)))
        ));
    }
    let err = svc.resolve_route(None, "15145550100", "14165551234").await.unwrap_err();
    assert!(matches!(
        err,
        RoutingError::Router(RouterError::Store(StoreError::CircuitOpen))
    ));
}

// ---------------------------------------------------------------------------
// First-call notification
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Notice>>,
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_first_call_notification_is_detached() {
    let store = memory();
    store.record_outbound_call("ws-acme", "1");
    let outbox = Arc::new(Outbox::default());
    let pool = NotificationPool::start(
        &NotificationConfig {
            workers: 2,
            queue_capacity: 8,
        },
        Arc::new(FirstCallNotifier::new(store.clone(), outbox.clone())),
    );
    let svc = service_with(store, &[]).with_notifications(pool);

    let call = |to: &str, dest_code: &str| OutboundCall {
        workspace_id: "ws-acme".into(),
        from: "15145550100".into(),
        to: to.into(),
        dest_code: dest_code.into(),
        notify_email: Some("owner@acme.example".into()),
    };
    assert!(svc.notify_outbound_call(call("442071234567", "44")));
    assert!(svc.notify_outbound_call(call("14165551234", "1")));
    svc.shutdown().await;

    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("442071234567"));
}

#[tokio::test]
async fn test_notification_without_pool_is_dropped() {
    let svc = service();
    assert!(!svc.notify_outbound_call(OutboundCall {
        workspace_id: "ws-acme".into(),
        from: "1".into(),
        to: "2".into(),
        dest_code: "44".into(),
        notify_email: None,
    }));
}
