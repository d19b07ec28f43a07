//! Connected mode: pairing page, WhatsApp client, and the single event worker.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::campaign::{CampaignEngine, DeliveryMode};
use crate::channels::{ClientEvent, CommandRouter, LifecycleMonitor};
use crate::config::Config;
use crate::error::BotError;

/// Events waiting for the worker before the client's callbacks block.
#[cfg_attr(not(feature = "whatsapp"), allow(dead_code))]
const EVENT_QUEUE: usize = 64;

#[cfg(feature = "whatsapp")]
pub(crate) async fn cmd_connect(config: &Config, phone: &str, sweep: bool) -> Result<()> {
    use anyhow::Context;
    use std::sync::Arc;

    use crate::channels::whatsapp::{SessionStore, WhatsAppAgent, WhatsAppMessenger};
    use crate::channels::{Messenger, PairingIdentity};
    use crate::pairing::PairingPublisher;
    use crate::pairing::server::{self, PairingServerState};

    let expected = PairingIdentity::new(phone);
    if expected.as_str().is_empty() || !expected.as_str().bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("'{phone}' is not a phone number");
    }

    let db_path = config.session.database_path();
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create session directory: {:?}", parent))?;
    }
    let store = Arc::new(
        SessionStore::open(&db_path, expected.as_str())
            .await
            .with_context(|| format!("Failed to open session database: {:?}", db_path))?,
    );

    let messenger = Arc::new(WhatsAppMessenger::new(store.clone()));
    let port: Arc<dyn Messenger> = messenger.clone();
    let publisher = Arc::new(PairingPublisher::new());
    let engine = Arc::new(CampaignEngine::new(port.clone(), config.campaign.clone()));
    let router = CommandRouter::new(engine.clone(), port.clone());
    let monitor = LifecycleMonitor::new(expected.clone(), publisher.clone(), port);

    let account = expected.as_str().to_string();
    let (addr, server) = server::spawn(
        config.server.port,
        PairingServerState {
            account: account.clone(),
            publisher: publisher.clone(),
        },
    )
    .await
    .with_context(|| format!("Failed to start pairing page on port {}", config.server.port))?;

    if !config.server.stand_alone {
        open_browser(&format!("http://localhost:{}/{}", addr.port(), account));
    }

    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE);
    let client = WhatsAppAgent::new(store, messenger.clone(), publisher, tx)
        .start()
        .await?;
    tracing::info!("WhatsApp: client started for {}", account);

    let outcome = tokio::select! {
        result = event_loop(&mut rx, &monitor, &router, &engine, sweep) => result,
        _ = shutdown_signal() => {
            tracing::info!("Shutdown requested");
            Ok(())
        }
    };

    messenger.disconnect().await;
    client.abort();
    server.abort();
    outcome.map_err(anyhow::Error::from)
}

#[cfg(not(feature = "whatsapp"))]
pub(crate) async fn cmd_connect(_config: &Config, _phone: &str, _sweep: bool) -> Result<()> {
    anyhow::bail!("invitabot was built without the `whatsapp` feature")
}

/// Drain client events strictly in arrival order.
///
/// Returns `SessionTerminated` when the monitor ends the session, `Ok` when the
/// client side of the queue closes. With `sweep`, the first verified connection
/// triggers one production pass over the ledger.
#[cfg_attr(not(feature = "whatsapp"), allow(dead_code))]
pub(crate) async fn event_loop(
    rx: &mut mpsc::Receiver<ClientEvent>,
    monitor: &LifecycleMonitor,
    router: &CommandRouter,
    engine: &CampaignEngine,
    sweep: bool,
) -> std::result::Result<(), BotError> {
    let mut swept = false;
    while let Some(event) = rx.recv().await {
        let connected = matches!(event, ClientEvent::Connected);
        if let Some(message) = monitor.handle(event).await? {
            router.dispatch(&message).await;
            continue;
        }

        if connected && sweep && !swept {
            swept = true;
            match engine.sweep(&DeliveryMode::Production).await {
                Ok(report) => {
                    for (row, e) in &report.failures {
                        tracing::warn!("Campaign: row {} still pending: {}", row, e);
                    }
                }
                Err(e) => tracing::error!("Campaign: sweep aborted: {}", e),
            }
        }
    }

    tracing::warn!("WhatsApp: event queue closed");
    Ok(())
}

#[cfg(feature = "whatsapp")]
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(feature = "whatsapp")]
fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let spawned = std::process::Command::new("open").arg(url).spawn();

    #[cfg(target_os = "linux")]
    let spawned = std::process::Command::new("xdg-open").arg(url).spawn();

    #[cfg(target_os = "windows")]
    let spawned = std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn();

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let spawned: std::io::Result<std::process::Child> = Err(std::io::Error::other(
        "no browser launcher for this platform",
    ));

    match spawned {
        Ok(_) => tracing::info!("Pairing: opened {} in the browser", url),
        Err(e) => tracing::warn!("Pairing: open {} manually ({})", url, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::fixtures::{Fixture, fixture};
    use crate::channels::testing::Sent;
    use crate::channels::{InboundMessage, PairingIdentity};
    use crate::error::TerminationReason;
    use crate::pairing::{PairingPublisher, PairingStatus};
    use std::sync::Arc;

    const LEDGER: &str = "\
id,name,guests,phone,table,status
1,Ana,2,521234,A,pendiente
2,Luis,1,525678,B,pendiente
";

    struct Worker {
        monitor: LifecycleMonitor,
        router: CommandRouter,
        engine: Arc<CampaignEngine>,
        publisher: Arc<PairingPublisher>,
    }

    fn worker(fx: &Fixture) -> Worker {
        let publisher = Arc::new(PairingPublisher::new());
        let engine = Arc::new(fx.restart());
        Worker {
            monitor: LifecycleMonitor::new(
                PairingIdentity::new("555"),
                publisher.clone(),
                fx.messenger.clone(),
            ),
            router: CommandRouter::new(engine.clone(), fx.messenger.clone()),
            engine,
            publisher,
        }
    }

    fn command(body: &str) -> ClientEvent {
        ClientEvent::MessageReceived(InboundMessage {
            sender: "5550001@s.whatsapp.net".into(),
            sender_alt: None,
            chat: "5550001@s.whatsapp.net".into(),
            body: body.into(),
        })
    }

    async fn drain(w: &Worker, events: Vec<ClientEvent>, sweep: bool) -> Result<(), BotError> {
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        event_loop(&mut rx, &w.monitor, &w.router, &w.engine, sweep).await
    }

    #[tokio::test]
    async fn test_commands_answered_in_order() {
        let fx = fixture(LEDGER, "Hola {{name}}", &["1", "2"]);
        fx.messenger.paired_as("555");
        let w = worker(&fx);

        drain(
            &w,
            vec![ClientEvent::Connected, command("!ping"), command("!status")],
            false,
        )
        .await
        .unwrap();

        assert_eq!(w.publisher.current().await, PairingStatus::Connected);
        let texts: Vec<String> = fx
            .messenger
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { body, .. } => Some(body),
                Sent::Document { .. } => None,
            })
            .collect();
        assert_eq!(texts, vec!["!pong", "2 rows: 0 sent, 2 pending"]);
    }

    #[tokio::test]
    async fn test_sweep_runs_once_after_verified_connect() {
        let fx = fixture(LEDGER, "Hola {{name}}", &["1", "2"]);
        fx.messenger.paired_as("555");
        let w = worker(&fx);

        drain(&w, vec![ClientEvent::Connected, ClientEvent::Connected], true)
            .await
            .unwrap();

        let documents = fx
            .messenger
            .sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Document { .. }))
            .count();
        assert_eq!(documents, 2);
        assert_eq!(w.engine.summary().unwrap().sent, 2);
    }

    #[tokio::test]
    async fn test_mismatch_stops_before_sweep() {
        let fx = fixture(LEDGER, "Hola {{name}}", &["1", "2"]);
        fx.messenger.paired_as("777");
        let w = worker(&fx);

        let err = drain(&w, vec![ClientEvent::Connected, command("!ping")], true)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BotError::SessionTerminated(TerminationReason::IdentityMismatch { .. })
        ));
        assert_eq!(err.exit_code(), 9);
        assert!(fx.messenger.sent().is_empty());
        assert_eq!(w.engine.summary().unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_logout_terminates() {
        let fx = fixture(LEDGER, "Hola", &["1", "2"]);
        let w = worker(&fx);
        let err = drain(&w, vec![ClientEvent::LoggedOut], false).await.unwrap_err();
        assert_eq!(err.exit_code(), 9);
        assert_eq!(w.publisher.current().await, PairingStatus::LoggedOut);
    }
}
