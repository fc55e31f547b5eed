//! Join a multicast group and log every datagram received.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use cotcast::prelude::*;
use tracing_subscriber::EnvFilter;

/// Listen for Cursor-on-Target datagrams on a multicast group.
#[derive(Parser, Debug)]
#[command(name = "cotcast-listen", version, about)]
struct Cli {
    /// Multicast group address.
    #[arg(long, default_value = "239.2.3.1")]
    group: String,

    /// Group port.
    #[arg(long, default_value_t = 6969)]
    port: u16,

    /// IPv4 address of the local adapter. Empty lets the OS choose.
    #[arg(long, default_value = "")]
    adapter: String,

    /// Listener configuration file (TOML). Overrides --group, --port and --adapter.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Send this text to the group once the listener is running.
    #[arg(long)]
    send: Option<String>,

    /// Stop after this many seconds instead of running until killed.
    #[arg(long)]
    duration: Option<u64>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,cotcast_core=debug,cotcast_net=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let (group, config) = match &cli.config {
        Some(path) => {
            let listener = ListenerConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            (listener.group_address()?, listener.channel)
        }
        None => (
            GroupAddress::parse(&cli.group, cli.port, &cli.adapter)?,
            ChannelConfig::default(),
        ),
    };

    let channel = MulticastChannel::with_config(group, config);
    channel.add_observer(named("log", |payload: &[u8], sender| -> ObserverResult {
        tracing::info!(
            %sender,
            len = payload.len(),
            "{}",
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }));

    channel
        .start()
        .with_context(|| format!("failed to join {}", channel.group()))?;
    tracing::info!(group = %channel.group(), "listening");

    if let Some(text) = &cli.send {
        let sent = channel.send(text.as_bytes())?;
        tracing::info!(sent, "sent datagram to group");
    }

    match cli.duration {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => loop {
            std::thread::park();
        },
    }

    let outcome = channel.stop();
    if !outcome.is_clean() {
        bail!("receive loop did not stop within {:?}", channel.config().stop_timeout);
    }
    tracing::info!(%outcome, "listener stopped");
    Ok(())
}
