//! Process wiring: startup order, signal handling, shutdown protocol
//!
//! Startup: config, registry evaluation, one broadcaster per enabled module
//! (plus the system stream), routes, then pollers. Shutdown: the root token
//! is cancelled, broadcasters drain their sessions with a goodbye, the
//! server stops, pollers are joined.

use anyhow::Context;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    arguments::Arguments,
    broadcast::Broadcaster,
    config::{self, Config},
    errors::DashResult,
    logger::{self, LogTag},
    modules::{ModuleRegistry, ModuleState},
    probes,
    scheduler::PollScheduler,
    system_events::SystemEvents,
    webserver::{self, AppState, ModuleRuntime},
};

/// Run hostdash with the built-in probes until a shutdown signal arrives
pub async fn run(args: Arguments) -> anyhow::Result<()> {
    logger::init(&args, None);

    let config = config::load(&args).context("Failed to load configuration")?;
    logger::init(&args, Some(&config.logger.min_level));

    logger::info(
        LogTag::System,
        &format!("hostdash {} starting up...", env!("CARGO_PKG_VERSION")),
    );

    let mut registry = ModuleRegistry::new();
    probes::register_builtin(&mut registry).context("Failed to set up built-in probes")?;

    run_with_registry(config, registry, async {
        if let Err(e) = wait_for_shutdown_signal().await {
            logger::error(
                LogTag::System,
                &format!("Signal handling failed, shutting down: {}", e),
            );
        }
    })
    .await
}

/// Run with an explicit set of candidate modules until `shutdown` resolves
pub async fn run_with_registry<F>(
    config: Config,
    registry: ModuleRegistry,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let config = Arc::new(config);
    let cancel = CancellationToken::new();

    // 1. Decide once which modules run
    let registry = registry.evaluate(&config).await;

    // 2. Broadcasters exist before any poller or route
    let system = SystemEvents::new(&config.broadcast).context("Failed to create system events")?;
    let mut state = AppState::new(config.clone(), registry.clone(), system.clone());
    let mut pending = Vec::new();

    for entry in registry.enabled_modules() {
        let descriptor = &entry.descriptor;
        let topics: Vec<&str> = descriptor.topics.iter().map(String::as_str).collect();
        let hub = Broadcaster::new(&descriptor.name, &topics, &config.broadcast)
            .with_context(|| format!("Failed to create broadcaster for {}", descriptor.name))?;
        let module_state = Arc::new(ModuleState::new());

        state.insert_runtime(ModuleRuntime {
            descriptor: descriptor.clone(),
            hub: hub.clone(),
            state: module_state.clone(),
        });
        pending.push((entry.module.clone(), hub, module_state));
    }
    let state = Arc::new(state);

    // 3. Routes
    let listener = webserver::bind(&config.webserver)
        .await
        .context("Failed to start webserver")?;

    // 4. Background tasks
    let mut gc_tasks: Vec<_> = state
        .hubs()
        .iter()
        .map(|hub| hub.spawn_gc(cancel.child_token()))
        .collect();

    let mut scheduler = PollScheduler::new(config.scheduler.clone(), cancel.child_token());
    for (module, hub, module_state) in pending {
        let interval = scheduler.interval_for(module.as_ref(), &config.module(module.name()));
        scheduler.spawn(module, hub, module_state, interval);
    }

    for descriptor in registry.descriptors() {
        if descriptor.enabled {
            system.info(&format!(
                "Module {} enabled at /api/{} (topics: {})",
                descriptor.name,
                descriptor.route_root,
                descriptor.topics.join(", ")
            ));
        } else {
            system.warning(&format!(
                "Module {} disabled: {}",
                descriptor.name,
                descriptor.disabled_reason.as_deref().unwrap_or("unknown reason")
            ));
        }
    }

    logger::info(
        LogTag::System,
        &format!(
            "{} of {} module(s) running",
            scheduler.len(),
            registry.len()
        ),
    );

    let mut server = tokio::spawn(webserver::serve(listener, state.clone(), cancel.clone()));

    tokio::pin!(shutdown);
    let early_exit = tokio::select! {
        _ = &mut shutdown => None,
        result = &mut server => Some(result),
    };

    // 5. Shutdown protocol
    logger::info(LogTag::System, "Shutting down...");
    cancel.cancel();

    let server_result = match early_exit {
        Some(result) => Some(result),
        None => {
            let bound = config.broadcast.shutdown_deadline() + config.scheduler.join_grace();
            match tokio::time::timeout(bound, &mut server).await {
                Ok(result) => Some(result),
                Err(_) => {
                    logger::warning(
                        LogTag::Webserver,
                        &format!("Webserver did not stop within {:?}, aborting", bound),
                    );
                    server.abort();
                    None
                }
            }
        }
    };

    let aborted = scheduler.join(config.scheduler.join_grace()).await;
    if aborted > 0 {
        logger::warning(
            LogTag::Scheduler,
            &format!("{} poller(s) aborted during shutdown", aborted),
        );
    }

    for task in gc_tasks.drain(..) {
        let _ = task.await;
    }

    match server_result {
        Some(Ok(Err(e))) => Err(e).context("Webserver failed"),
        Some(Err(e)) => Err(e).context("Webserver task panicked"),
        _ => {
            logger::info(LogTag::System, "hostdash stopped");
            Ok(())
        }
    }
}

/// Resolve on the first termination signal
///
/// A second Ctrl+C while shutting down exits immediately with code 130.
pub async fn wait_for_shutdown_signal() -> DashResult<()> {
    logger::info(
        LogTag::System,
        "Waiting for shutdown signal (press Ctrl+C twice to force kill)",
    );

    #[cfg(unix)]
    let signal_name = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigquit = signal(SignalKind::quit())?;

        tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = sighup.recv() => "SIGHUP",
            _ = sigquit.recv() => "SIGQUIT",
        }
    };

    #[cfg(not(unix))]
    let signal_name = {
        tokio::signal::ctrl_c().await?;
        "CTRL_C"
    };

    logger::warning(
        LogTag::System,
        &format!(
            "Shutdown signal received ({}). Press Ctrl+C again to force kill.",
            signal_name
        ),
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logger::error(LogTag::System, "Second Ctrl+C detected, forcing immediate exit.");
            // conventional exit code for SIGINT
            std::process::exit(130);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{FakeModule, Probe};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.webserver.host = "127.0.0.1".to_string();
        config.webserver.port = 0;
        config.broadcast.shutdown_deadline_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_startup_polls_enabled_modules_and_shuts_down() {
        let host = FakeModule::new("Host", "host", &["host"])
            .with_interval(Duration::from_millis(100))
            .arc();
        let docker = FakeModule::new("Docker", "virt/docker", &["docker"])
            .with_probe(Probe::Fail)
            .arc();

        let mut registry = ModuleRegistry::new();
        registry.register(host.clone());
        registry.register(docker.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(run_with_registry(test_config(), registry, async move {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(350)).await;
        stop_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(host.collected.load(Ordering::SeqCst) >= 1);
        assert_eq!(docker.probed.load(Ordering::SeqCst), 1);
        assert_eq!(docker.collected.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.webserver.port = taken.local_addr().unwrap().port();

        let mut registry = ModuleRegistry::new();
        registry.register(FakeModule::new("Host", "host", &["host"]).arc());

        let err = run_with_registry(config, registry, std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Address already in use"));
    }
}
