use std::sync::Arc;

use tokio::time::Instant;

use lanmedia_core::RuntimeConfig;

use crate::error::DaemonError;
use crate::events::ContentEvents;
use crate::http::UpnpHttp;
use crate::pidfile::PidFile;
use crate::reactor::{Collaborators, Reactor};
use crate::revision::RevisionTracker;
use crate::schedule::AnnounceSchedule;
use crate::shutdown::{ShutdownReport, Teardown};
use crate::signal::{install_handlers, QuitSignal};
use crate::sockets::{SocketPlan, Sockets};
use crate::ssdp::{Discovery, Ssdp};
use crate::startup::{prepare_catalog, start_background};
use crate::uptime::StartupClock;

/// Process-wide state, built once at startup and passed to every component.
#[derive(Debug, Clone)]
pub struct DaemonContext {
    pub config: Arc<RuntimeConfig>,
    pub quit: QuitSignal,
    pub clock: StartupClock,
}

impl DaemonContext {
    pub fn new(config: RuntimeConfig) -> Self {
        let clock = StartupClock::new(config.uptime);
        Self {
            config: Arc::new(config),
            quit: QuitSignal::new(),
            clock,
        }
    }
}

/// Set up logging, start the runtime and block until the daemon exits.
pub fn start_blocking(config: RuntimeConfig) -> Result<(), DaemonError> {
    crate::logging::init_tracing(config.debug, &config.log_dir)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    let context = DaemonContext::new(config);
    runtime.block_on(run(context))
}

/// Run the daemon on the configured sockets until a termination signal.
pub async fn run(context: DaemonContext) -> Result<(), DaemonError> {
    install_handlers(&context.quit)?;
    let plan = SocketPlan::from_config(&context.config);
    serve(&context, plan).await.map(|_| ())
}

/// Startup, reactor and shutdown against `plan`. Whatever startup acquired is
/// released when it fails.
pub async fn serve(context: &DaemonContext, plan: SocketPlan) -> Result<ShutdownReport, DaemonError> {
    let mut teardown = Teardown::new();
    let result = serve_inner(context, plan, &mut teardown).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "daemon failed");
        teardown.abort();
    }
    result
}

async fn serve_inner(
    context: &DaemonContext,
    plan: SocketPlan,
    teardown: &mut Teardown,
) -> Result<ShutdownReport, DaemonError> {
    let config = &context.config;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        addresses = config.lan_addrs.len(),
        media_dirs = config.media_dirs.len(),
        "lanmedia starting",
    );

    // A running instance owns the catalog; refuse before touching it.
    teardown.set_pid_file(PidFile::acquire(&config.pid_file)?);
    let prepared = prepare_catalog(config)?;
    teardown.set_catalog(prepared.catalog.clone());

    let work = start_background(config, &prepared)?;
    if let Some(watch) = work.watch {
        teardown.set_watch(watch);
    }
    if let Some(rescan) = work.rescan {
        tokio::spawn(rescan.report());
    }

    let sockets = Sockets::open(&plan)?;
    let http_port = sockets
        .listen_addr()
        .map(|addr| addr.port())
        .unwrap_or(config.port);
    let schedule = AnnounceSchedule::new(Instant::now(), config.notify_interval);
    let mut discovery = Ssdp::new(
        &config.identity,
        http_port,
        config.lan_addrs.clone(),
        schedule.advertisement_lifetime(),
    );
    // Clear whatever a previous run left advertised.
    if let Err(err) = discovery.goodbye(sockets.notify()) {
        tracing::warn!(error = %err, "startup leaving announcement failed");
    }

    let update_id = prepared.catalog.update_id()?;
    let events = ContentEvents::new(update_id);
    let handler = UpnpHttp::new(
        config.clone(),
        prepared.catalog.clone(),
        events.subscribe(),
        context.clock,
    );
    let mut reactor = Reactor::new(
        sockets,
        Collaborators {
            discovery,
            handler,
            events,
            counter: prepared.catalog.clone(),
        },
        schedule,
        RevisionTracker::new(update_id, 0),
        context.quit.clone(),
    );
    tracing::info!(http_port, update_id, "serving");

    reactor.run().await?;
    Ok(teardown.run(reactor.teardown_parts()))
}
