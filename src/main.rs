use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use siprouted::config::Config;
use siprouted::notify::OutboundCall;
use siprouted::store::{RoutingDataStore, TrunkRef, WhitelistScope};
use siprouted::telemetry::{counters, init_tracing, shutdown_tracing, Metrics, MetricsConfig, TracingConfig};
use siprouted::{EntryContext, RoutingService};

#[derive(Parser, Debug)]
#[command(name = "siprouted")]
#[command(author, version, about = "Call routing core for a multi-tenant voice platform")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ranked routes for an outbound call (numbers in +E.164 form)
    Route {
        from: String,
        to: String,
        /// Workspace to route for; BYO workspaces use only their own carriers
        #[arg(long)]
        workspace: Option<String>,
        /// Queue the first-call notification for the routed call
        #[arg(long)]
        notify: bool,
    },
    /// Route an outbound call through the user's routing flow
    Flow {
        user: String,
        from: String,
        to: String,
        #[arg(long)]
        source_ip: Option<String>,
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Check a source address against a whitelist
    Admit {
        #[arg(value_enum)]
        scope: ScopeArg,
        source: String,
        /// Workspace for the byo-carriers and workspace scopes
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Live endpoint of a trunk
    Trunk {
        id: String,
        /// Treat the id as a DID number
        #[arg(long)]
        did: bool,
    },
    /// Admission decision for an incoming call to a DID
    Did {
        did: String,
        caller: String,
        source_ip: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ScopeArg {
    Providers,
    ByoCarriers,
    Workspace,
    MediaServers,
}

impl ScopeArg {
    fn scope(self, workspace: Option<String>) -> Result<WhitelistScope> {
        let required = || workspace.clone().context("--workspace is required for this scope");
        Ok(match self {
            ScopeArg::Providers => WhitelistScope::Providers,
            ScopeArg::MediaServers => WhitelistScope::MediaServers,
            ScopeArg::ByoCarriers => WhitelistScope::ByoCarriers {
                workspace_id: required()?,
            },
            ScopeArg::Workspace => WhitelistScope::Workspace {
                workspace_id: required()?,
            },
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&TracingConfig::from(&config.telemetry))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting siprouted"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let admin = if config.admin.enabled {
        let metrics = Metrics::new(&MetricsConfig {
            address: config.admin.address,
        })?;
        counters::init(&metrics.meter("siprouted"));
        metrics.admin_state().set_ready(true);
        let server = metrics.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                warn!(error = %e, "admin server stopped");
            }
        }))
    } else {
        None
    };

    let service = RoutingService::from_config(&config);

    match args.command {
        None if admin.is_some() => {
            info!("serving admin endpoint, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        None => info!("no command given"),
        Some(Command::Route {
            from,
            to,
            workspace,
            notify,
        }) => {
            let entry = EntryContext::for_call(from, to);
            let routes = service
                .resolve_route(workspace.as_deref(), &entry.from, &entry.to)
                .await?;
            if notify {
                if let Some(workspace_id) = workspace.clone() {
                    let settings = service.store().workspace(&workspace_id).await?;
                    service.notify_outbound_call(OutboundCall {
                        workspace_id,
                        from: entry.from,
                        to: entry.to,
                        dest_code: entry.dest_code.unwrap_or_default(),
                        notify_email: settings.and_then(|s| s.notify_email),
                    });
                }
            }
            print_json(&routes)?;
        }
        Some(Command::Flow {
            user,
            from,
            to,
            source_ip,
            workspace,
        }) => {
            let mut entry = EntryContext::for_call(from, to);
            entry.source_ip = source_ip;
            entry.workspace_id = workspace;
            let outcome = service.route_by_flow(&user, entry).await?;
            print_json(&outcome)?;
        }
        Some(Command::Admit {
            scope,
            source,
            workspace,
        }) => {
            let scope = scope.scope(workspace)?;
            let admission = service.validate_source_address(&scope, &source).await?;
            print_json(&serde_json::json!({
                "scope": scope,
                "source": source,
                "admission": admission,
            }))?;
        }
        Some(Command::Trunk { id, did }) => {
            let trunk = if did { TrunkRef::Did(id) } else { TrunkRef::Trunk(id) };
            let target = service.resolve_trunk_target(&trunk).await?;
            print_json(&serde_json::json!({ "trunk": trunk, "target": target }))?;
        }
        Some(Command::Did { did, caller, source_ip }) => {
            let decision = service.validate_incoming_did(&did, &caller, &source_ip).await?;
            print_json(&decision)?;
        }
    }

    service.shutdown().await;
    if let Some(handle) = admin {
        handle.abort();
    }
    if config.telemetry.otlp_endpoint.is_some() {
        shutdown_tracing();
    }

    Ok(())
}
