use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;
use crate::address::row_network;
use crate::flow::Flow;
use crate::trunk::SipUri;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.notifications.workers == 0 {
            anyhow::bail!("notifications.workers must be at least 1");
        }
        if self.notifications.queue_capacity == 0 {
            anyhow::bail!("notifications.queue_capacity must be at least 1");
        }

        let breaker = &self.store.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            anyhow::bail!("circuit breaker thresholds must be at least 1");
        }

        if !(0.0..=1.0).contains(&self.telemetry.trace_sample_rate) {
            anyhow::bail!(
                "trace_sample_rate must be between 0.0 and 1.0, got {}",
                self.telemetry.trace_sample_rate
            );
        }

        let data = &self.data;

        let mut workspaces = HashSet::new();
        for ws in &data.workspaces {
            if !workspaces.insert(ws.id.as_str()) {
                anyhow::bail!("duplicate workspace id: {}", ws.id);
            }
        }

        // Provider ids are unique; whitelist rows parse
        let mut providers = HashSet::new();
        for provider in &data.providers {
            if !providers.insert(provider.id.as_str()) {
                anyhow::bail!("duplicate provider id: {}", provider.id);
            }
            for row in &provider.whitelist {
                row_network(&row.ip, &row.range)
                    .with_context(|| format!("provider '{}' has an invalid whitelist row", provider.id))?;
            }
        }

        for carrier in &data.byo_carriers {
            if !workspaces.contains(carrier.workspace_id.as_str()) {
                anyhow::bail!(
                    "BYO carrier '{}' references unknown workspace: {}",
                    carrier.name,
                    carrier.workspace_id
                );
            }
            for row in &carrier.whitelist {
                row_network(&row.ip, &row.range)
                    .with_context(|| format!("BYO carrier '{}' has an invalid whitelist row", carrier.name))?;
            }
        }

        for row in &data.whitelists.media_servers {
            row_network(&row.ip, &row.range).context("invalid media server whitelist row")?;
        }
        for (workspace_id, rows) in &data.whitelists.workspaces {
            for row in rows {
                row_network(&row.ip, &row.range)
                    .with_context(|| format!("workspace '{}' has an invalid whitelist row", workspace_id))?;
            }
        }

        // Trunk endpoints are SIP URIs
        let mut trunks = HashSet::new();
        for trunk in &data.trunks {
            if !trunks.insert(trunk.id.as_str()) {
                anyhow::bail!("duplicate trunk id: {}", trunk.id);
            }
            let uris = trunk
                .endpoints
                .endpoints
                .iter()
                .map(|e| e.uri.as_str())
                .chain(trunk.endpoints.recovery_uri.as_deref());
            for uri in uris {
                SipUri::parse(uri).with_context(|| format!("trunk '{}' has an invalid endpoint", trunk.id))?;
            }
        }

        let mut dids = HashSet::new();
        for did in &data.dids {
            if !dids.insert(did.did.as_str()) {
                anyhow::bail!("duplicate DID: {}", did.did);
            }
            if !workspaces.contains(did.workspace_id.as_str()) {
                anyhow::bail!("DID '{}' references unknown workspace: {}", did.did, did.workspace_id);
            }
            if let Some(trunk_id) = &did.trunk_id {
                if !trunks.contains(trunk_id.as_str()) {
                    anyhow::bail!("DID '{}' references unknown trunk: {}", did.did, trunk_id);
                }
            }
        }

        // Every stored flow must build
        let mut flows = HashSet::new();
        for flow in &data.flows {
            if !flows.insert(flow.flow_id.as_str()) {
                anyhow::bail!("duplicate flow id: {}", flow.flow_id);
            }
            Flow::from_value(flow.flow_id.as_str(), &flow.document)
                .with_context(|| format!("flow '{}' ({}) does not build", flow.flow_id, flow.selector))?;
        }

        info!(
            workspaces = data.workspaces.len(),
            providers = data.providers.len(),
            trunks = data.trunks.len(),
            flows = data.flows.len(),
            "configuration validated successfully"
        );
        Ok(())
    }
}
