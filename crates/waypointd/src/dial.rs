//! Outbound dialing — direct TCP or through a SOCKS5 proxy.
//!
//! The proxy is an opaque dial-through: we speak just enough SOCKS5 to ask
//! it for a CONNECT and hand the stream to the hello exchange. Target
//! addresses are always sent as domain-type (ATYP 0x03) so i2p/onion names
//! reach the proxy unresolved.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use waypoint_core::wire::WIRE_VERSION;
use waypoint_core::HostPort;
use waypoint_services::BootstrapCandidate;

/// Longest hello line we will read back. Anything bigger is not a waypoint
/// daemon.
const MAX_HELLO_LINE: u64 = 4096;

/// What the remote daemon told us in its hello reply.
#[derive(Debug, serde::Deserialize)]
pub struct HelloReply {
    pub waypoint: u8,
    #[serde(default)]
    pub peers: u64,
}

#[derive(Debug, serde::Serialize)]
struct HelloRequest {
    waypoint: u8,
}

/// Dial a bootstrap candidate and complete the hello exchange.
///
/// The whole attempt — TCP connect, SOCKS negotiation, hello roundtrip —
/// runs under one timeout. Every failure is local to this candidate.
pub async fn dial(candidate: &BootstrapCandidate, timeout: Duration) -> Result<HelloReply> {
    tokio::time::timeout(timeout, attempt(candidate))
        .await
        .map_err(|_| anyhow::anyhow!("dial timed out after {}s", timeout.as_secs()))?
}

async fn attempt(candidate: &BootstrapCandidate) -> Result<HelloReply> {
    let stream = match &candidate.proxy {
        None => TcpStream::connect((candidate.address.as_str(), candidate.port))
            .await
            .context("direct connect failed")?,
        Some(proxy) => socks5_connect(proxy, &candidate.address, candidate.port)
            .await
            .context("proxied connect failed")?,
    };
    hello(stream).await
}

/// One-line JSON hello: send our version, read the peer's.
async fn hello(stream: TcpStream) -> Result<HelloReply> {
    let mut stream = BufReader::new(stream);

    let mut request = serde_json::to_vec(&HelloRequest {
        waypoint: WIRE_VERSION,
    })?;
    request.push(b'\n');
    stream.get_mut().write_all(&request).await?;

    let mut line = String::new();
    (&mut stream)
        .take(MAX_HELLO_LINE)
        .read_line(&mut line)
        .await
        .context("reading hello reply")?;
    if line.is_empty() {
        bail!("peer closed the connection without a hello");
    }

    let reply: HelloReply = serde_json::from_str(line.trim()).context("malformed hello reply")?;
    if reply.waypoint != WIRE_VERSION {
        bail!("peer speaks wire version {}, we need {}", reply.waypoint, WIRE_VERSION);
    }
    Ok(reply)
}

/// Minimal SOCKS5 CONNECT (RFC 1928), no authentication.
async fn socks5_connect(proxy: &HostPort, host: &str, port: u16) -> Result<TcpStream> {
    if host.len() > 255 {
        bail!("target hostname too long for SOCKS5");
    }

    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .with_context(|| format!("proxy {} unreachable", proxy))?;

    // greeting: version 5, one method, no-auth
    stream.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply != [0x05, 0x00] {
        bail!("proxy refused no-auth method selection");
    }

    // CONNECT request, ATYP = domain
    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[0x05, 0x01, 0x00, 0x03, host.len() as u8]);
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    // reply header: ver, rep, rsv, atyp
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[1] != 0x00 {
        bail!("proxy CONNECT failed with code {:#04x}", head[1]);
    }
    // drain the bound address the proxy reports
    let addr_len = match head[3] {
        0x01 => 4usize,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => bail!("proxy sent unknown address type {:#04x}", other),
    };
    let mut rest = vec![0u8; addr_len + 2];
    stream.read_exact(&mut rest).await?;

    Ok(stream)
}
