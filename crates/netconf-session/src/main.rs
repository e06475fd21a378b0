//! `netconf-rpc`: send one RPC to a NETCONF server and print the reply.
//!
//! ```text
//! netconf-rpc <config.toml> <rpc.xml>
//! ```
//!
//! # Flow
//!
//! ```text
//! main()
//!  └─ load_config()                  -- [ssh] and [session] tables
//!  └─ NetconfSession::connect()      -- spawns ssh -s <host> netconf
//!  └─ send_receive_rpc(rpc, true)    -- message-id stamped automatically
//!  └─ print reply, close session
//! ```
//!
//! Logs go to stderr so the reply on stdout can be piped.  Set `RUST_LOG`
//! (e.g. `RUST_LOG=netconf_session=debug`) for framing details.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use netconf_core::XmlDocument;
use netconf_session::infrastructure::{config::load_config, ssh_process::SshProcessOpener};
use netconf_session::NetconfSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(config_path), Some(rpc_path)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: netconf-rpc <config.toml> <rpc.xml>");
    };
    let config_path = PathBuf::from(config_path);
    let rpc_path = PathBuf::from(rpc_path);

    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let rpc_text = tokio::fs::read_to_string(&rpc_path)
        .await
        .with_context(|| format!("reading {}", rpc_path.display()))?;
    let rpc = XmlDocument::parse(rpc_text)
        .with_context(|| format!("parsing {}", rpc_path.display()))?;

    let opener = SshProcessOpener::new(config.ssh.clone());
    let mut session = NetconfSession::connect(&opener, config.session)
        .await
        .context("opening NETCONF session")?;
    info!(
        mode = %session.protocol_mode(),
        session_id = ?session.session_id(),
        capabilities = session.server_capabilities().len(),
        "session established"
    );

    let result = session.send_receive_rpc(&rpc, true).await;
    if let Err(e) = session.close().await {
        warn!("error while closing session: {e}");
    }

    let reply = result.context("rpc failed")?;
    println!("{reply}");
    Ok(())
}
