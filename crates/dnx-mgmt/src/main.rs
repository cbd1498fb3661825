//! `dnxmgr` - a one-shot management client. Sends a single `MgmtRequest`
//! to a running `dnxcld` agent's management listener and prints the
//! reply payload, matching `dnxmgr`'s traditional contract: exit 0 and
//! print `Reply` on ACK, exit non-zero on NAK or any transport failure.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dnx_core::transport::{open_active, RecvOutcome};
use dnx_core::{decode, encode, DnxMessage, MgmtRequest, MgmtStatus, ObjectKind, Transport, Xid, MAX_MESSAGE_SIZE};

/// DNX management client.
#[derive(Parser, Debug)]
#[command(name = "dnxmgr", about = "DNX management client", disable_version_flag = true)]
struct Args {
    /// Agent host to connect to.
    #[arg(short = 's', long = "server")]
    host: String,

    /// Agent management port.
    #[arg(short = 'p', long = "port")]
    port: u16,

    /// Command string: the management verb, e.g. SHUTDOWN, STATUS.
    #[arg(short = 'c', long = "command")]
    command: String,

    /// How long to wait for a reply before giving up.
    #[arg(long = "timeout-secs", default_value_t = 10)]
    timeout_secs: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("dnxmgr: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` on an ACK reply, `Ok(false)` on NAK.
fn run(args: &Args) -> Result<bool> {
    let url = format!("udp://{}:{}", args.host, args.port);
    let channel = open_active(&url).with_context(|| format!("connecting to {url}"))?;
    let peer: SocketAddr = channel
        .default_peer()
        .context("active channel has no destination")?;

    let xid = Xid::new(ObjectKind::Manager, std::process::id(), 0);
    let request = DnxMessage::MgmtRequest(MgmtRequest {
        xid,
        action: args.command.clone(),
    });
    let encoded = encode(&request).context("encoding MgmtRequest")?;
    channel.send(encoded.as_bytes(), peer).context("sending MgmtRequest")?;

    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let outcome = channel
        .recv(&mut buf, Duration::from_secs(args.timeout_secs))
        .context("waiting for MgmtReply")?;

    let size = match outcome {
        RecvOutcome::Data { size, .. } => size,
        RecvOutcome::Timeout => anyhow::bail!("timed out waiting for a reply from {url}"),
    };

    let text = std::str::from_utf8(&buf[..size]).context("reply was not valid UTF-8")?;
    let reply = match decode(text).context("decoding MgmtReply")? {
        DnxMessage::MgmtReply(r) => r,
        other => anyhow::bail!("expected MgmtReply, got {other:?}"),
    };

    println!("{}", reply.reply);
    Ok(reply.status == MgmtStatus::Ack)
}
