//! In-process mock key-value store, served over real TCP.
//!
//! Implements just enough of the collaborator contract (SET, GET, DEL,
//! EXPIRE, TTL, PERSIST, METRICS) for the harness to be exercised
//! end-to-end: lazy expiry on access, TTL sentinels `-1`/`-2`, and a
//! Prometheus-style METRICS payload with monotonic command counters.

use bytes::{Buf, Bytes, BytesMut};
use kvcheck::frame::{self, Frame};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, Instant};

/// Binds the mock store on an ephemeral port and serves connections until
/// the test process exits. Returns the address to connect to.
pub async fn spawn_store() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket));
        }
    });

    addr
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    set: u64,
    get: u64,
    del: u64,
    expire: u64,
    ttl: u64,
    persist: u64,
}

async fn serve(mut socket: TcpStream) {
    let mut store: HashMap<String, Entry> = HashMap::new();
    let mut counters = Counters::default();
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        // Accumulate bytes until one full command frame is buffered.
        let frame = loop {
            let mut cursor = Cursor::new(&buffer[..]);
            match Frame::parse(&mut cursor) {
                Ok(frame) => {
                    let len = cursor.position() as usize;
                    buffer.advance(len);
                    break frame;
                }
                Err(frame::Error::Incomplete) => match socket.read_buf(&mut buffer).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                },
                Err(_) => return,
            }
        };

        let reply = respond(frame, &mut store, &mut counters);

        if socket.write_all(&reply).await.is_err() {
            return;
        }
    }
}

fn respond(
    frame: Frame,
    store: &mut HashMap<String, Entry>,
    counters: &mut Counters,
) -> Vec<u8> {
    let parts = match frame {
        Frame::Array(parts) => parts,
        _ => return error("ERR expected an array of bulk strings"),
    };

    let mut args = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Frame::Bulk(data) => args.push(String::from_utf8_lossy(&data).into_owned()),
            _ => return error("ERR expected an array of bulk strings"),
        }
    }

    if args.is_empty() {
        return error("ERR empty command");
    }

    match (args[0].to_uppercase().as_str(), args.len()) {
        ("SET", 3) => {
            counters.set += 1;
            store.insert(
                args[1].clone(),
                Entry {
                    value: Bytes::from(args[2].clone().into_bytes()),
                    expires_at: None,
                },
            );
            b"+OK\r\n".to_vec()
        }
        ("GET", 2) => {
            counters.get += 1;
            evict(store, &args[1]);
            match store.get(&args[1]) {
                Some(entry) => bulk(&entry.value),
                None => b"$-1\r\n".to_vec(),
            }
        }
        ("DEL", n) if n >= 2 => {
            counters.del += 1;
            let mut removed = 0;
            for key in &args[1..] {
                evict(store, key);
                if store.remove(key.as_str()).is_some() {
                    removed += 1;
                }
            }
            integer(removed)
        }
        ("EXPIRE", 3) => {
            counters.expire += 1;
            let seconds = match args[2].parse::<u64>() {
                Ok(seconds) => seconds,
                Err(_) => return error("ERR value is not an integer or out of range"),
            };
            evict(store, &args[1]);
            match store.get_mut(&args[1]) {
                Some(entry) => {
                    entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                    integer(1)
                }
                None => integer(0),
            }
        }
        ("TTL", 2) => {
            counters.ttl += 1;
            evict(store, &args[1]);
            match store.get(&args[1]) {
                None => integer(-2),
                Some(Entry {
                    expires_at: None, ..
                }) => integer(-1),
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => integer(at.saturating_duration_since(Instant::now()).as_secs() as i64),
            }
        }
        ("PERSIST", 2) => {
            counters.persist += 1;
            evict(store, &args[1]);
            match store.get_mut(&args[1]) {
                Some(entry) if entry.expires_at.is_some() => {
                    entry.expires_at = None;
                    integer(1)
                }
                _ => integer(0),
            }
        }
        ("METRICS", 1) => bulk(render_metrics(counters, store.len()).as_bytes()),
        _ => error("ERR unknown command"),
    }
}

/// Removes `key` if its timeout has lapsed.
fn evict(store: &mut HashMap<String, Entry>, key: &str) {
    let expired = matches!(
        store.get(key),
        Some(Entry {
            expires_at: Some(at),
            ..
        }) if *at <= Instant::now()
    );

    if expired {
        store.remove(key);
    }
}

fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

fn error(message: &str) -> Vec<u8> {
    format!("-{}\r\n", message).into_bytes()
}

fn render_metrics(counters: &Counters, keys: usize) -> String {
    format!(
        "# HELP commands_total Total number of commands processed\n\
         # TYPE commands_total counter\n\
         commands_total{{command=\"set\"}} {}\n\
         commands_total{{command=\"get\"}} {}\n\
         commands_total{{command=\"del\"}} {}\n\
         commands_total{{command=\"expire\"}} {}\n\
         commands_total{{command=\"ttl\"}} {}\n\
         commands_total{{command=\"persist\"}} {}\n\
         # HELP keys Current number of live keys\n\
         # TYPE keys gauge\n\
         keys {}\n",
        counters.set,
        counters.get,
        counters.del,
        counters.expire,
        counters.ttl,
        counters.persist,
        keys
    )
}
