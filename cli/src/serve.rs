// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node host
//!
//! Runs one service per process, chosen by the config's `node.role`:
//!
//! - **directory** serves the roster and endpoint table.
//! - **root** registers its endpoint, then serves campaigns and its relays.
//! - **relay** / **leaf** start serving, join their superior through the
//!   directory and keep the uplink running. A terminal uplink failure
//!   (retries exhausted, or evicted by the superior) stops the process with
//!   an error so a supervisor can restart it.
//!
//! Every node deregisters its endpoint on the way out.

use anyhow::{anyhow, Context, Result};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use troops_core::application::backoff::retry_with_backoff;
use troops_core::application::join::{enlist, Enlistable};
use troops_core::application::leaf::{LeafNode, LeafServices};
use troops_core::application::relay::{RelayNode, RelayServices, RelaySettings};
use troops_core::application::root::{RootNode, RootServices, RootSettings};
use troops_core::application::uplink::{UplinkError, UplinkSettings};
use troops_core::application::Directory;
use troops_core::domain::directory::Roster;
use troops_core::domain::link::{DirectoryLink, SubordinateLink};
use troops_core::domain::node::{NodeId, NodeIdentity, NodeRole};
use troops_core::domain::node_config::{NodeConfigManifest, ServiceRole};
use troops_core::domain::sink::AlertChannel;
use troops_core::infrastructure::alerts::{LogAlertChannel, WebhookAlertChannel};
use troops_core::infrastructure::event_bus::EventBus;
use troops_core::infrastructure::readings::ProviderRegistry;
use troops_core::infrastructure::sinks::SinkRegistry;
use troops_core::presentation::api::{directory_router, leaf_router, relay_router, root_router};
use troops_sdk::transport::default_client;
use troops_sdk::{HttpConnector, HttpDirectoryClient, HttpSubordinateLink};

pub async fn run(config: NodeConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    info!(
        node_id = %config.spec.node.id,
        role = ?config.spec.node.role,
        endpoint = %config.advertised_endpoint(),
        "Configuration loaded"
    );

    match config.spec.node.role {
        ServiceRole::Directory => serve_directory(&config).await,
        ServiceRole::Root => serve_root(&config).await,
        ServiceRole::Relay => serve_relay(&config).await,
        ServiceRole::Leaf => serve_leaf(&config).await,
    }
}

pub fn identity(config: &NodeConfigManifest, role: NodeRole) -> NodeIdentity {
    let identity = NodeIdentity::new(
        config.spec.node.id.clone(),
        config.display_name(),
        role,
        config.advertised_endpoint(),
    );
    match &config.spec.node.place {
        Some(place) => identity.with_place(place.clone()),
        None => identity,
    }
}

pub fn uplink_settings(config: &NodeConfigManifest) -> UplinkSettings {
    UplinkSettings {
        mode: config.spec.liveness.mode,
        interval: config.spec.liveness.interval(),
        retry: config.spec.retry.policy(),
    }
}

fn downlink(config: &NodeConfigManifest) -> Option<Arc<dyn SubordinateLink>> {
    if config.spec.liveness.push_directives {
        Some(Arc::new(HttpSubordinateLink::new()))
    } else {
        None
    }
}

fn alert_channel(config: &NodeConfigManifest) -> Arc<dyn AlertChannel> {
    let alerts = &config.spec.alerts;
    match &alerts.webhook_url {
        Some(url) => Arc::new(
            WebhookAlertChannel::new(default_client(), url.clone())
                .with_channel(alerts.channel.clone())
                .with_username(alerts.username.clone()),
        ),
        None => Arc::new(LogAlertChannel),
    }
}

fn directory_client(config: &NodeConfigManifest) -> Option<HttpDirectoryClient> {
    config.spec.directory.url.as_ref().map(HttpDirectoryClient::new)
}

async fn bind(config: &NodeConfigManifest) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.spec.network.bind_address, config.spec.network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on {}", addr);
    Ok(listener)
}

fn spawn_server<F>(listener: TcpListener, app: Router, shutdown: F) -> JoinHandle<std::io::Result<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(shutdown).await })
}

async fn finish_server(server: JoinHandle<std::io::Result<()>>) -> Result<()> {
    server
        .await
        .context("HTTP server task failed")?
        .context("HTTP server failed")
}

async fn deregister(directory: Option<&HttpDirectoryClient>, id: &NodeId) {
    let Some(directory) = directory else {
        return;
    };
    match directory.deregister(id).await {
        Ok(()) => info!(node_id = %id, "Endpoint deregistered"),
        Err(e) => warn!(node_id = %id, error = %e, "Failed to deregister endpoint"),
    }
}

async fn serve_directory(config: &NodeConfigManifest) -> Result<()> {
    let roster_path = config
        .spec
        .directory
        .roster_path
        .as_ref()
        .ok_or_else(|| anyhow!("spec.directory.roster_path is required for the directory role"))?;
    let roster = Roster::from_yaml_file(roster_path)
        .with_context(|| format!("Failed to load roster from {:?}", roster_path))?;
    let directory = Arc::new(Directory::from_roster(&roster).context("Invalid roster")?);

    let listener = bind(config).await?;
    axum::serve(listener, directory_router(directory))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Directory shutting down");
    Ok(())
}

async fn serve_root(config: &NodeConfigManifest) -> Result<()> {
    let identity = identity(config, NodeRole::Root);
    let id = identity.id.clone();
    let endpoint = identity.endpoint.clone();

    let root = RootNode::new(
        identity,
        RootSettings {
            deadline: config.spec.liveness.deadline(),
            report_cache: config.spec.reports.cache_capacity,
        },
        RootServices {
            downlink: downlink(config),
            sinks: Arc::new(SinkRegistry::with_http(default_client())),
            alerts: alert_channel(config),
            events: EventBus::with_default_capacity(),
        },
    );

    let listener = bind(config).await?;
    let server = spawn_server(listener, root_router(root.clone()), root.shutdown_token().cancelled_owned());

    let directory = directory_client(config);
    if let Some(directory) = &directory {
        let policy = config.spec.retry.policy();
        let registered = retry_with_backoff(&policy, "register_endpoint", || {
            directory.register_endpoint(&id, &endpoint)
        })
        .await;
        if let Err(e) = registered {
            root.shutdown();
            return Err(e).context("Failed to register endpoint with the directory");
        }
        info!(node_id = %id, endpoint = %endpoint, "Endpoint registered with directory");
    } else {
        warn!("No directory configured; relays must be pointed at this root another way");
    }

    shutdown_signal().await;
    info!("Root shutting down");
    root.shutdown();
    deregister(directory.as_ref(), &id).await;
    finish_server(server).await
}

async fn serve_relay(config: &NodeConfigManifest) -> Result<()> {
    let relay = RelayNode::new(
        identity(config, NodeRole::Relay),
        RelaySettings {
            deadline: config.spec.liveness.deadline(),
        },
        RelayServices {
            downlink: downlink(config),
            events: EventBus::with_default_capacity(),
        },
    );
    let app = relay_router(relay.clone());
    serve_subordinate(config, relay, app).await
}

async fn serve_leaf(config: &NodeConfigManifest) -> Result<()> {
    let leaf = LeafNode::new(
        identity(config, NodeRole::Leaf),
        LeafServices {
            providers: Arc::new(ProviderRegistry::from_config(&config.spec.readings)),
            events: EventBus::with_default_capacity(),
        },
    );
    let app = leaf_router(leaf.clone());
    serve_subordinate(config, leaf, app).await
}

async fn serve_subordinate<N>(config: &NodeConfigManifest, node: Arc<N>, app: Router) -> Result<()>
where
    N: Enlistable + 'static,
{
    let id = NodeId::new(config.spec.node.id.clone());
    let directory = directory_client(config)
        .ok_or_else(|| anyhow!("spec.directory.url is required to join a superior"))?;
    let shutdown = Enlistable::shutdown_token(node.as_ref());

    let listener = bind(config).await?;
    let server = spawn_server(listener, app, shutdown.clone().cancelled_owned());

    let joined = enlist(
        &node,
        &directory,
        &HttpConnector::new(),
        &config.spec.retry.policy(),
        uplink_settings(config),
    )
    .await;
    let uplink = match joined {
        Ok(uplink) => uplink,
        Err(e) => {
            shutdown.cancel();
            deregister(Some(&directory), &id).await;
            return Err(e).context("Failed to join superior");
        }
    };

    let outcome: Result<()> = tokio::select! {
        _ = shutdown_signal() => Ok(()),
        finished = uplink => match finished {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(uplink_failure(e)),
            Err(e) => Err(anyhow!(e).context("Uplink task failed")),
        },
    };

    info!(node_id = %id, "Shutting down");
    shutdown.cancel();
    deregister(Some(&directory), &id).await;
    finish_server(server).await?;
    outcome
}

fn uplink_failure(err: UplinkError) -> anyhow::Error {
    error!(error = %err, "Lost contact with superior; restart to rejoin");
    anyhow!(err).context("Uplink terminated")
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
