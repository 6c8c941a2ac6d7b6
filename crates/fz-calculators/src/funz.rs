//! UDP-discovered calculator (`funz://`).
//!
//! Discovery listens for a UDP broadcast announcing a TCP port, then opens
//! a length-prefixed framing directly on `tokio::net::{UdpSocket,
//! TcpStream}`: a `u32` op-code, a `u32` payload length, then the payload,
//! all big-endian.

use crate::common::{write_run_artifacts, BackendOutcome};
use fz_core::Cancellation;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum OpCode {
    PushDir = 1,
    RunCode = 2,
    Stdout = 3,
    Stderr = 4,
    PullDir = 5,
    Disconnect = 6,
    Ack = 7,
}

impl OpCode {
    fn from_u32(n: u32) -> Option<Self> {
        match n {
            1 => Some(Self::PushDir),
            2 => Some(Self::RunCode),
            3 => Some(Self::Stdout),
            4 => Some(Self::Stderr),
            5 => Some(Self::PullDir),
            6 => Some(Self::Disconnect),
            7 => Some(Self::Ack),
            _ => None,
        }
    }
}

/// A daemon advertisement, parsed from one UDP broadcast message (spec
/// §4.4.4): version line, TCP port line, then one code name per line.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonAdvertisement {
    pub version: String,
    pub tcp_port: u16,
    pub codes: Vec<String>,
}

/// Parse a single broadcast datagram. Returns `None` on malformed input
/// or a version mismatch.
pub fn parse_advertisement(datagram: &[u8]) -> Option<DaemonAdvertisement> {
    let text = std::str::from_utf8(datagram).ok()?;
    let mut lines = text.lines();
    let version = lines.next()?.trim().to_string();
    if version != PROTOCOL_VERSION {
        return None;
    }
    let tcp_port: u16 = lines.next()?.trim().parse().ok()?;
    let codes = lines.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
    Some(DaemonAdvertisement { version, tcp_port, codes })
}

/// Listen on `bind_port` for up to `discovery_timeout` for the first
/// advertisement whose code list contains `code`. `host` restricts which
/// sender address is accepted (`None` accepts any).
pub async fn discover(
    bind_port: u16,
    host: Option<&str>,
    code: &str,
    discovery_timeout: Duration,
) -> Result<(std::net::SocketAddr, DaemonAdvertisement), String> {
    let socket = UdpSocket::bind(("0.0.0.0", bind_port))
        .await
        .map_err(|e| format!("failed to bind discovery socket: {e}"))?;

    let mut buf = vec![0u8; 4096];
    let deadline = tokio::time::Instant::now() + discovery_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(format!("no funz daemon advertised code '{code}' within timeout"));
        }

        let recv = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(format!("discovery recv failed: {e}")),
            Err(_) => return Err(format!("no funz daemon advertised code '{code}' within timeout")),
        };
        let (n, from) = recv;

        if let Some(expected_host) = host {
            if from.ip().to_string() != expected_host {
                continue;
            }
        }

        if let Some(ad) = parse_advertisement(&buf[..n]) {
            if ad.codes.iter().any(|c| c == code) {
                return Ok((from, ad));
            }
        }
    }
}

async fn write_frame(stream: &mut TcpStream, op: OpCode, payload: &[u8]) -> std::io::Result<()> {
    stream.write_u32(op as u32).await?;
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(payload).await
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<(OpCode, Vec<u8>)> {
    let op_raw = stream.read_u32().await?;
    let len = stream.read_u32().await? as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    let op = OpCode::from_u32(op_raw)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "unknown op-code"))?;
    Ok((op, payload))
}

/// Serialize `dir`'s regular files as `<relpath>\0<len as 8 hex digits>\0<bytes>`
/// repeated, for the push/pull frame payloads.
fn pack_dir(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    for (rel, abs) in files {
        let bytes = std::fs::read(&abs)?;
        out.extend_from_slice(rel.to_string_lossy().as_bytes());
        out.push(0);
        out.extend_from_slice(format!("{:08x}", bytes.len()).as_bytes());
        out.push(0);
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

fn collect_files(root: &Path, current: &Path, out: &mut Vec<(std::path::PathBuf, std::path::PathBuf)>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            out.push((rel, path));
        }
    }
    Ok(())
}

fn unpack_dir(payload: &[u8], dest: &Path) -> std::io::Result<()> {
    let mut offset = 0;
    while offset < payload.len() {
        let name_end = payload[offset..].iter().position(|&b| b == 0).map(|p| offset + p);
        let Some(name_end) = name_end else { break };
        let rel = String::from_utf8_lossy(&payload[offset..name_end]).into_owned();
        offset = name_end + 1;

        let len_end = offset + 8;
        let len_hex = std::str::from_utf8(&payload[offset..len_end])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let len = usize::from_str_radix(len_hex, 16)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        offset = len_end + 1;

        let bytes = &payload[offset..offset + len];
        offset += len;

        let dst = dest.join(&rel);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dst, bytes)?;
    }
    Ok(())
}

/// Execute `code` against the case directory on the daemon advertising it:
/// discover, connect, push, run, collect stdout/stderr, pull, disconnect.
pub async fn execute(
    bind_port: u16,
    host: Option<&str>,
    code: &str,
    case_dir: &Path,
    discovery_timeout: Duration,
    cancellation: &Cancellation,
) -> BackendOutcome {
    let command_label = format!("funz://{}/{}", host.unwrap_or("*"), code);

    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(command_label);
    }

    let (addr, ad) = match discover(bind_port, host, code, discovery_timeout).await {
        Ok(pair) => pair,
        Err(e) => return BackendOutcome::error(command_label, e),
    };

    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(command_label);
    }

    let connect_addr = (addr.ip(), ad.tcp_port);
    let mut stream = match TcpStream::connect(connect_addr).await {
        Ok(s) => s,
        Err(e) => return BackendOutcome::error(command_label, format!("funz connect failed: {e}")),
    };

    let start = SystemTime::now();

    let push_payload = match pack_dir(case_dir) {
        Ok(p) => p,
        Err(e) => return BackendOutcome::error(command_label, format!("failed to pack case directory: {e}")),
    };
    if let Err(e) = write_frame(&mut stream, OpCode::PushDir, &push_payload).await {
        return BackendOutcome::error(command_label, format!("push directory failed: {e}"));
    }
    if let Err(e) = read_frame(&mut stream).await {
        return BackendOutcome::error(command_label, format!("push ack failed: {e}"));
    }

    if let Err(e) = write_frame(&mut stream, OpCode::RunCode, code.as_bytes()).await {
        return BackendOutcome::error(command_label, format!("run request failed: {e}"));
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut exit_code = 1;
    loop {
        let (op, payload) = match read_frame(&mut stream).await {
            Ok(pair) => pair,
            Err(e) => return BackendOutcome::error(command_label, format!("stream read failed: {e}")),
        };
        match op {
            OpCode::Stdout => stdout.push_str(&String::from_utf8_lossy(&payload)),
            OpCode::Stderr => stderr.push_str(&String::from_utf8_lossy(&payload)),
            OpCode::Ack => {
                exit_code = payload.first().copied().unwrap_or(0) as i32;
                break;
            }
            _ => {}
        }
    }

    if let Err(e) = write_frame(&mut stream, OpCode::PullDir, &[]).await {
        return BackendOutcome::error(command_label, format!("pull request failed: {e}"));
    }
    match read_frame(&mut stream).await {
        Ok((OpCode::PullDir, payload)) => {
            if let Err(e) = unpack_dir(&payload, case_dir) {
                return BackendOutcome::error(command_label, format!("failed to unpack pulled directory: {e}"));
            }
        }
        Ok(_) => {}
        Err(e) => return BackendOutcome::error(command_label, format!("pull failed: {e}")),
    }

    let _ = write_frame(&mut stream, OpCode::Disconnect, &[]).await;

    let end = SystemTime::now();
    if let Err(e) = write_run_artifacts(case_dir, &stdout, &stderr, &command_label, exit_code, start, end) {
        return BackendOutcome::error(command_label, format!("failed to write run artifacts: {e}"));
    }

    if exit_code == 0 {
        BackendOutcome::done(command_label)
    } else {
        BackendOutcome::error(command_label, format!("remote code exited {exit_code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    #[test]
    fn parses_well_formed_advertisement() {
        let datagram = b"1\n5555\nmatlab\npython\n";
        let ad = parse_advertisement(datagram).unwrap();
        assert_eq!(ad.tcp_port, 5555);
        assert_eq!(ad.codes, vec!["matlab".to_string(), "python".to_string()]);
    }

    #[test]
    fn rejects_version_mismatch() {
        let datagram = b"2\n5555\nmatlab\n";
        assert!(parse_advertisement(datagram).is_none());
    }

    #[test]
    fn rejects_malformed_port() {
        let datagram = b"1\nnotaport\nmatlab\n";
        assert!(parse_advertisement(datagram).is_none());
    }

    #[test]
    fn pack_and_unpack_round_trip() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/b.txt"), "world").unwrap();

        let packed = pack_dir(src.path()).unwrap();

        let dst = tempdir().unwrap();
        unpack_dir(&packed, dst.path()).unwrap();

        assert_eq!(std::fs::read_to_string(dst.path().join("a.txt")).unwrap(), "hello");
        assert_eq!(std::fs::read_to_string(dst.path().join("sub/b.txt")).unwrap(), "world");
    }

    #[tokio::test]
    async fn discover_times_out_when_no_daemon_advertises() {
        let result = discover(0, None, "matlab", Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_before_start_never_discovers() {
        let case_dir = tempdir().unwrap();
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let outcome = execute(
            0,
            None,
            "matlab",
            case_dir.path(),
            Duration::from_millis(50),
            &cancellation,
        )
        .await;

        assert_eq!(outcome.err.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn frame_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (op, payload) = read_frame(&mut stream).await.unwrap();
            assert_eq!(op, OpCode::RunCode);
            assert_eq!(payload, b"matlab");
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut client, OpCode::RunCode, b"matlab").await.unwrap();
        server.await.unwrap();
    }
}
