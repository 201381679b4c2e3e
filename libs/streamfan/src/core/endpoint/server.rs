// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Minimal RTSP responder and UDP relay sockets for the mount table.
//!
//! The server answers `OPTIONS` and `DESCRIBE` for mounted paths and keeps
//! one UDP socket per mount. A relay counts as active once a datagram has
//! arrived on its port.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::mounts::{MountEntry, MountPoints};
use crate::core::error::{Result, StreamError};

/// Largest datagram a relay accepts.
const MAX_DATAGRAM: usize = 65_536;

/// Upper bound on one request head, request line and headers together.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    /// Listening, nothing received yet.
    Waiting,
    Active { packets: u64 },
}

pub struct StreamServer;

impl StreamServer {
    /// Bind the RTSP listener on `bind` and one UDP relay per mount on
    /// `relay_ip`, then serve in the background of the current runtime.
    pub async fn attach(
        mounts: MountPoints,
        bind: SocketAddr,
        relay_ip: IpAddr,
    ) -> Result<ServerHandle> {
        let listener = TcpListener::bind(bind).await.map_err(|e| {
            StreamError::Other(anyhow::anyhow!("Failed to bind to {}: {}", bind, e))
        })?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut relays = BTreeMap::new();
        let mut tasks = Vec::with_capacity(mounts.len() + 1);
        for entry in mounts.entries() {
            let addr = SocketAddr::new(relay_ip, entry.relay_port);
            let socket = UdpSocket::bind(addr).await.map_err(|e| {
                StreamError::Other(anyhow::anyhow!(
                    "Failed to bind relay {} on {}: {}",
                    entry.path,
                    addr,
                    e
                ))
            })?;
            let packets = Arc::new(AtomicU64::new(0));
            relays.insert(entry.path.clone(), Arc::clone(&packets));
            tasks.push(tokio::spawn(relay_loop(
                entry.path.clone(),
                socket,
                packets,
                shutdown_rx.clone(),
            )));
        }

        let mounts = Arc::new(mounts);
        tasks.push(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&mounts),
            local_addr.ip().to_string(),
            shutdown_rx,
        )));

        tracing::info!(
            "[StreamServer] Listening on rtsp://{} with {} mounts",
            local_addr,
            mounts.len()
        );

        Ok(ServerHandle {
            local_addr,
            relays,
            shutdown_tx,
            tasks,
        })
    }
}

/// Running server. Dropping the handle also stops the background tasks;
/// [`shutdown`](Self::shutdown) additionally waits for them.
pub struct ServerHandle {
    local_addr: SocketAddr,
    relays: BTreeMap<String, Arc<AtomicU64>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn relay_status(&self, path: &str) -> Option<RelayStatus> {
        let packets = self.relays.get(path)?.load(Ordering::Acquire);
        Some(if packets == 0 {
            RelayStatus::Waiting
        } else {
            RelayStatus::Active { packets }
        })
    }

    pub fn active_relays(&self) -> usize {
        self.relays
            .values()
            .filter(|p| p.load(Ordering::Acquire) > 0)
            .count()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("[StreamServer] Stopped");
    }
}

async fn relay_loop(
    path: String,
    socket: UdpSocket,
    packets: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((_, from)) => {
                    if packets.fetch_add(1, Ordering::AcqRel) == 0 {
                        tracing::info!(
                            "[StreamServer] Relay {} active (first packet from {})",
                            path,
                            from
                        );
                    }
                }
                Err(e) => tracing::debug!("[StreamServer] Relay {} receive error: {}", path, e),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    mounts: Arc<MountPoints>,
    host: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clients = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("[StreamServer] Client {}", peer);
                    let mounts = Arc::clone(&mounts);
                    let host = host.clone();
                    clients.spawn(async move {
                        if let Err(e) = serve_client(stream, mounts, host).await {
                            tracing::debug!("[StreamServer] Client {} dropped: {}", peer, e);
                        }
                    });
                }
                Err(e) => tracing::warn!("[StreamServer] Accept failed: {}", e),
            },
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }

    if !clients.is_empty() {
        tracing::debug!("[StreamServer] Closing {} client connections", clients.len());
    }
    clients.shutdown().await;
}

/// One parsed request head.
#[derive(Debug, PartialEq, Eq)]
struct Request {
    method: String,
    url: String,
    cseq: Option<String>,
}

/// Path part of an `rtsp://host:port/path` URL, without query or trailing `/`.
fn request_path(url: &str) -> &str {
    let without_scheme = url.strip_prefix("rtsp://").unwrap_or(url);
    let path = match without_scheme.find('/') {
        Some(i) if url.starts_with("rtsp://") => &without_scheme[i..],
        Some(_) => without_scheme,
        None => "/",
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

fn response(status: &str, cseq: Option<&str>, headers: &[(&str, String)], body: &str) -> String {
    let mut out = format!("RTSP/1.0 {}\r\n", status);
    if let Some(cseq) = cseq {
        out.push_str(&format!("CSeq: {}\r\n", cseq));
    }
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    if !body.is_empty() {
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

fn handle_request(request: &Request, mounts: &MountPoints, host: &str) -> String {
    let cseq = request.cseq.as_deref();
    match request.method.as_str() {
        "OPTIONS" => response(
            "200 OK",
            cseq,
            &[("Public", "OPTIONS, DESCRIBE".to_string())],
            "",
        ),
        "DESCRIBE" => {
            let path = request_path(&request.url);
            match mounts.get(path) {
                Some(MountEntry { relay, .. }) => response(
                    "200 OK",
                    cseq,
                    &[
                        ("Content-Type", "application/sdp".to_string()),
                        ("Content-Base", format!("{}/", request.url.trim_end_matches('/'))),
                    ],
                    &relay.sdp(host, path),
                ),
                None => response("404 Not Found", cseq, &[], ""),
            }
        }
        _ => response("501 Not Implemented", cseq, &[], ""),
    }
}

enum HeadLine {
    Text(String),
    Eof,
    TooLong,
}

/// Read one line, charging it against the request's remaining `budget`.
async fn read_head_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    budget: &mut usize,
) -> std::io::Result<HeadLine> {
    let mut line = String::new();
    let limit = u64::try_from(*budget).unwrap_or(u64::MAX);
    let n = (&mut *reader).take(limit).read_line(&mut line).await?;
    if n == 0 {
        return Ok(if *budget == 0 {
            HeadLine::TooLong
        } else {
            HeadLine::Eof
        });
    }

    *budget = budget.saturating_sub(n);
    if *budget == 0 && !line.ends_with('\n') {
        return Ok(HeadLine::TooLong);
    }
    Ok(HeadLine::Text(line))
}

async fn serve_client(stream: TcpStream, mounts: Arc<MountPoints>, host: String) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let mut budget = MAX_REQUEST_BYTES;
        let line = match read_head_line(&mut reader, &mut budget).await? {
            HeadLine::Text(line) => line,
            HeadLine::Eof => return Ok(()),
            HeadLine::TooLong => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(method), Some(url)) = (parts.next(), parts.next()) else {
            write
                .write_all(response("400 Bad Request", None, &[], "").as_bytes())
                .await?;
            continue;
        };
        let mut request = Request {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            cseq: None,
        };

        let mut oversized = false;
        loop {
            let header = match read_head_line(&mut reader, &mut budget).await? {
                HeadLine::Text(header) => header,
                HeadLine::Eof => return Ok(()),
                HeadLine::TooLong => {
                    oversized = true;
                    break;
                }
            };
            let header = header.trim();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.trim().eq_ignore_ascii_case("cseq") {
                    request.cseq = Some(value.trim().to_string());
                }
            }
        }
        if oversized {
            break;
        }

        tracing::debug!("[StreamServer] {} {}", request.method, request.url);
        let reply = handle_request(&request, &mounts, &host);
        write.write_all(reply.as_bytes()).await?;
    }

    // Request head over the limit: answer once and close.
    tracing::debug!(
        "[StreamServer] Request head exceeds {} bytes, closing",
        MAX_REQUEST_BYTES
    );
    write
        .write_all(response("400 Bad Request", None, &[], "").as_bytes())
        .await?;
    write.shutdown().await?;
    Ok(())
}
