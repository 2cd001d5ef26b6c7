//! A minimal TNS listener for integration tests.
//!
//! Accepts CONNECTs for the configured service names and SIDs, refuses the
//! rest with the matching listener error, and answers `COMMAND=ping`.
//! Accepted sockets are held open until the client hangs up or the listener
//! is shut down.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const CONNECT: u8 = 1;
const ACCEPT: u8 = 2;
const REFUSE: u8 = 4;
const DATA: u8 = 6;

const PING_REPLY: &str = "(DESCRIPTION=(TMP=)(VSNNUM=352321536)(ERR=0)(ALIAS=LISTENER))";

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    accepted: AtomicUsize,
    pings: AtomicUsize,
}

pub struct FakeListener {
    port: u16,
    counters: Arc<Counters>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FakeListener {
    /// Listen on an ephemeral localhost port.
    pub async fn start(services: &[&str], sids: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let counters = Arc::new(Counters::default());
        let (shutdown, rx) = watch::channel(false);
        let services: Arc<[String]> = services.iter().map(|s| s.to_string()).collect();
        let sids: Arc<[String]> = sids.iter().map(|s| s.to_string()).collect();

        let task = tokio::spawn({
            let counters = Arc::clone(&counters);
            let mut stop = rx.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        accepted = listener.accept() => {
                            let Ok((socket, _)) = accepted else { break };
                            tokio::spawn(serve(
                                socket,
                                Arc::clone(&services),
                                Arc::clone(&sids),
                                Arc::clone(&counters),
                                rx.clone(),
                            ));
                        }
                    }
                }
            }
        });

        Self {
            port,
            counters,
            shutdown,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// EZConnect string for `service` on this listener.
    pub fn target(&self, service: &str) -> String {
        format!("127.0.0.1:{}/{}", self.port, service)
    }

    /// Connect descriptor naming `sid` on this listener.
    pub fn sid_target(&self, sid: &str) -> String {
        format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=tcp)(HOST=127.0.0.1)(PORT={}))(CONNECT_DATA=(SID={})))",
            self.port, sid
        )
    }

    /// Accepted sessions the client has not yet hung up.
    pub fn active_sessions(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.counters.pings.load(Ordering::SeqCst)
    }

    /// Wait until the active session count settles at `expected`.
    pub async fn wait_for_active(&self, expected: usize) -> usize {
        for _ in 0..200 {
            if self.active_sessions() == expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.active_sessions()
    }

    /// Stop accepting and drop every held session.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn read_packet(socket: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 8];
    socket.read_exact(&mut header).await.ok()?;
    let len = u16::from_be_bytes([header[0], header[1]]) as usize;
    let mut payload = vec![0u8; len.checked_sub(8)?];
    socket.read_exact(&mut payload).await.ok()?;
    Some((header[4], payload))
}

async fn write_packet(socket: &mut TcpStream, packet_type: u8, payload: &[u8]) {
    let len = (payload.len() + 8) as u16;
    let mut packet = Vec::with_capacity(payload.len() + 8);
    packet.extend_from_slice(&len.to_be_bytes());
    packet.extend_from_slice(&[0, 0, packet_type, 0, 0, 0]);
    packet.extend_from_slice(payload);
    let _ = socket.write_all(&packet).await;
}

/// Connect data either trails the CONNECT payload or follows in a DATA packet.
async fn read_connect_data(socket: &mut TcpStream) -> Option<String> {
    let (packet_type, payload) = read_packet(socket).await?;
    if packet_type != CONNECT || payload.len() < 26 {
        return None;
    }
    let data_len = u16::from_be_bytes([payload[16], payload[17]]) as usize;
    let offset = u16::from_be_bytes([payload[18], payload[19]]) as usize;
    let inline = offset
        .checked_sub(8)
        .and_then(|start| payload.get(start..start + data_len));
    let data = match inline {
        Some(data) => data.to_vec(),
        None => {
            let (packet_type, data) = read_packet(socket).await?;
            if packet_type != DATA || data.len() < 2 {
                return None;
            }
            data[2..].to_vec()
        }
    };
    Some(String::from_utf8_lossy(&data).into_owned())
}

fn descriptor_value<'a>(descriptor: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("({key}=");
    let start = descriptor.find(&pattern)? + pattern.len();
    let end = descriptor[start..].find(')')? + start;
    Some(&descriptor[start..end])
}

fn refuse_payload(text: &str) -> Vec<u8> {
    let mut payload = vec![1, 0];
    payload.extend_from_slice(&(text.len() as u16).to_be_bytes());
    payload.extend_from_slice(text.as_bytes());
    payload
}

fn accept_payload() -> Vec<u8> {
    let mut payload = Vec::with_capacity(28);
    payload.extend_from_slice(&315u16.to_be_bytes());
    payload.extend_from_slice(&[0, 0]); // options
    payload.extend_from_slice(&[0; 10]);
    payload.push(0); // nsi flags
    payload.extend_from_slice(&[0; 9]);
    payload.extend_from_slice(&8192u32.to_be_bytes());
    payload
}

async fn serve(
    mut socket: TcpStream,
    services: Arc<[String]>,
    sids: Arc<[String]>,
    counters: Arc<Counters>,
    mut stop: watch::Receiver<bool>,
) {
    let Some(data) = read_connect_data(&mut socket).await else {
        return;
    };

    if descriptor_value(&data, "COMMAND") == Some("ping") {
        counters.pings.fetch_add(1, Ordering::SeqCst);
        write_packet(&mut socket, REFUSE, &refuse_payload(PING_REPLY)).await;
        return;
    }

    let known = match (
        descriptor_value(&data, "SERVICE_NAME"),
        descriptor_value(&data, "SID"),
    ) {
        (Some(service), _) if services.iter().any(|s| s == service) => true,
        (Some(_), _) => {
            let refusal = refuse_payload("(DESCRIPTION=(ERR=12514))");
            write_packet(&mut socket, REFUSE, &refusal).await;
            false
        }
        (None, Some(sid)) if sids.iter().any(|s| s == sid) => true,
        _ => {
            let refusal = refuse_payload("(DESCRIPTION=(ERR=12505))");
            write_packet(&mut socket, REFUSE, &refusal).await;
            false
        }
    };
    if !known {
        return;
    }

    counters.accepted.fetch_add(1, Ordering::SeqCst);
    counters.active.fetch_add(1, Ordering::SeqCst);
    write_packet(&mut socket, ACCEPT, &accept_payload()).await;

    let mut sink = [0u8; 256];
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            read = socket.read(&mut sink) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
        }
    }
    counters.active.fetch_sub(1, Ordering::SeqCst);
}
