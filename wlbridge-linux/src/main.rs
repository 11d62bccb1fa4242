// wlbridge: bridges peer 802.11 traffic between a local wireless interface and a remote server.
//
// Live capture needs the `pcap` feature (`cargo build --release --features pcap`). Default
// builds leave it out so the workspace builds and tests on hosts without libpcap; such a binary
// refuses to start with "built without packet capture support".

mod capture;
mod cli;
mod config;
mod hopper;
#[cfg(feature = "pcap")]
mod pcap_capture;
mod pipeline;
mod queue;
mod radio;
mod session;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wlbridge_core::{ChannelState, Classifier, PeerRegistry};

use crate::capture::CaptureDevice;
use crate::config::Settings;
use crate::hopper::ChannelController;
use crate::pipeline::{CaptureEnd, CaptureStats};
use crate::radio::IwRadio;
use crate::session::{Dispatcher, Session};

/// How long queued frames may take to reach the server after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(&cli.log_level);

    let settings = config::load(&cli).context("invalid configuration")?;
    tracing::info!(
        interface = %settings.interface,
        server = %settings.server,
        monitor = settings.monitor,
        promiscuous = settings.promiscuous,
        channel_hopping = settings.channel_hopping,
        "starting wlbridge"
    );

    let radio = Arc::new(IwRadio::new(settings.interface.clone()));
    if settings.alt_monitor {
        radio.alt_monitor();
    }

    let device = capture::open(&settings)
        .with_context(|| format!("could not open capture on {}", settings.interface))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(settings, device, radio))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(settings: Settings, device: CaptureDevice, radio: Arc<IwRadio>) -> anyhow::Result<()> {
    let stream = session::connect(&settings.server)
        .await
        .with_context(|| format!("could not connect to {}", settings.server))?;

    let registry = Arc::new(PeerRegistry::new());
    let state = Arc::new(if settings.channel_hopping {
        ChannelState::hopping()
    } else {
        ChannelState::fixed()
    });
    let controller = Arc::new(ChannelController::new(state.clone(), radio));
    controller.start_hopping(settings.hop_interval);

    let (forward_tx, forward_rx) = queue::forward_queue(settings.queue_capacity);
    let (inject, _inject_thread) =
        capture::spawn_injector(device.injector).context("could not start injection thread")?;
    let session = Session::new(stream, forward_rx, Dispatcher::new(registry.clone(), inject));

    let classifier = Classifier::new(registry, state);
    let mut source = device.source;
    let (capture_tx, capture_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let mut stats = CaptureStats::default();
            let end = pipeline::run_capture(
                source.as_mut(),
                &classifier,
                &controller,
                &forward_tx,
                &mut stats,
            );
            tracing::info!(
                captured = stats.captured,
                forwarded = stats.forwarded,
                discovered = stats.discovered,
                "capture worker stopped"
            );
            let _ = capture_tx.send(end);
        })
        .context("could not start capture thread")?;

    let shutdown = CancellationToken::new();
    let mut session_task = tokio::spawn(session.run(shutdown.clone()));
    tokio::select! {
        result = &mut session_task => {
            result?.context("connection to server lost")?;
        }
        end = capture_rx => {
            match end {
                Ok(Ok(CaptureEnd::Exhausted)) => {
                    tracing::info!("capture device has no more frames, flushing queue");
                }
                Ok(Ok(CaptureEnd::QueueClosed)) => {}
                Ok(Err(e)) => return Err(anyhow::Error::new(e).context("capture failed")),
                Err(_) => anyhow::bail!("capture worker exited unexpectedly"),
            }
            // The worker dropped its queue handle; the session ends once the writer drains.
            session_task.await?.context("connection to server lost")?;
        }
        r = shutdown_signal() => {
            r?;
            tracing::info!("shutting down");
            shutdown.cancel();
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut session_task).await {
                Ok(result) => result?.context("connection to server lost")?,
                Err(_) => {
                    tracing::warn!("forwarding queue did not drain in time");
                    session_task.abort();
                }
            }
        }
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
