//! In-process MariaDB server for tests
//!
//! Speaks just enough of the protocol to exercise the client: the v10
//! greeting, `mysql_native_password` / `caching_sha2_password` logins (with
//! an optional plugin switch), `SELECT VERSION()`, COM_PING and COM_QUIT.
//! `SELECT BOGUS_COLUMNS` answers with an impossible column count.
//! Statements starting with `SELECT SLEEP` are never answered.

#![allow(dead_code)]

use bytes::{BufMut, BytesMut};
use mariadb_wire::auth::{scramble_caching_sha2, scramble_native};
use mariadb_wire::protocol::constants::{capabilities, commands, plugins};
use mariadb_wire::protocol::encode::put_lenenc_bytes;
use mariadb_wire::protocol::encode_packets;
use mariadb_wire::ConnectionConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;

pub const SERVER_VERSION: &str = "11.4.2-MariaDB-mock";
pub const USER: &str = "tye";
pub const PASSWORD: &str = "1234";
pub const DATABASE: &str = "mydata";

const NONCE: &[u8; 20] = b"abcdefghijklmnopqrst";
const SWITCH_NONCE: &[u8; 20] = b"ZYXWVUTSRQPONMLKJIHG";

const SERVER_CAPABILITIES: u32 = capabilities::LONG_PASSWORD
    | capabilities::LONG_FLAG
    | capabilities::CONNECT_WITH_DB
    | capabilities::PROTOCOL_41
    | capabilities::TRANSACTIONS
    | capabilities::SECURE_CONNECTION
    | capabilities::PLUGIN_AUTH
    | capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA
    | capabilities::CONNECT_ATTRS;

/// How the server authenticates logins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `mysql_native_password` from the greeting on
    Native,
    /// `caching_sha2_password`, scramble found in the server cache
    CachingSha2Fast,
    /// `caching_sha2_password`, cache miss: the password is sent in cleartext
    CachingSha2Full,
    /// Greeting offers `caching_sha2_password`, then switches to native
    SwitchToNative,
}

/// Counters shared between the server tasks and the test
#[derive(Debug, Default)]
pub struct Stats {
    accepted: AtomicUsize,
    active: AtomicUsize,
    quits: AtomicUsize,
    queries: AtomicUsize,
    next_connection_id: AtomicU32,
}

struct ActiveGuard(Arc<Stats>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub enum Endpoint {
    Tcp(u16),
    Unix(PathBuf, tempfile::TempDir),
}

pub struct MockServer {
    endpoint: Endpoint,
    stats: Arc<Stats>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Start a TCP server on an ephemeral port
    pub async fn start(mode: AuthMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stats = Arc::new(Stats::default());

        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, mode, task_stats.clone()));
            }
        });

        Self {
            endpoint: Endpoint::Tcp(port),
            stats,
            task,
        }
    }

    /// Start a server on a Unix socket in a temporary directory
    pub async fn start_unix(mode: AuthMode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mysqld.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let stats = Arc::new(Stats::default());

        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, mode, task_stats.clone()));
            }
        });

        Self {
            endpoint: Endpoint::Unix(path, dir),
            stats,
            task,
        }
    }

    /// Configuration with the correct credentials
    pub fn config(&self) -> ConnectionConfig {
        self.config_with(PASSWORD, DATABASE)
    }

    pub fn config_with(&self, password: &str, database: &str) -> ConnectionConfig {
        let builder = ConnectionConfig::builder("127.0.0.1", USER, database)
            .password(password)
            .connect_timeout(Duration::from_secs(5));
        match &self.endpoint {
            Endpoint::Tcp(port) => builder.port(*port).build(),
            Endpoint::Unix(path, _) => builder.socket(path.clone()).build(),
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self.endpoint {
            Endpoint::Tcp(port) => Some(port),
            Endpoint::Unix(..) => None,
        }
    }

    pub fn accepted(&self) -> usize {
        self.stats.accepted.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.stats.quits.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.stats.queries.load(Ordering::SeqCst)
    }

    /// Sessions whose socket is still open on the server side
    pub fn active(&self) -> usize {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Wait until the server has seen every session end
    pub async fn wait_idle(&self) {
        for _ in 0..200 {
            if self.active() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} sessions still open on the mock server", self.active());
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(mut stream: S, mode: AuthMode, stats: Arc<Stats>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stats.accepted.fetch_add(1, Ordering::SeqCst);
    stats.active.fetch_add(1, Ordering::SeqCst);
    let _guard = ActiveGuard(stats.clone());
    let connection_id = stats.next_connection_id.fetch_add(1, Ordering::SeqCst) + 100;

    let greeting_plugin = match mode {
        AuthMode::Native => plugins::NATIVE_PASSWORD,
        _ => plugins::CACHING_SHA2_PASSWORD,
    };
    if write_packet(&mut stream, 0, &greeting(connection_id, greeting_plugin))
        .await
        .is_err()
    {
        return;
    }

    let Some((_, response)) = read_packet(&mut stream).await else {
        return;
    };
    let login = parse_handshake_response(&response);

    let Some(seq) = authenticate(&mut stream, mode, &login).await else {
        return;
    };

    if login.database.as_deref() != Some(DATABASE) {
        let msg = format!(
            "Unknown database '{}'",
            login.database.unwrap_or_default()
        );
        let _ = write_packet(&mut stream, seq, &err_packet(1049, "42000", &msg)).await;
        return;
    }
    if write_packet(&mut stream, seq, &ok_packet()).await.is_err() {
        return;
    }

    while let Some((_, payload)) = read_packet(&mut stream).await {
        let Some((&command, rest)) = payload.split_first() else {
            return;
        };

        match command {
            commands::QUIT => {
                stats.quits.fetch_add(1, Ordering::SeqCst);
                return;
            }
            commands::PING => {
                if write_packet(&mut stream, 1, &ok_packet()).await.is_err() {
                    return;
                }
            }
            commands::QUERY => {
                stats.queries.fetch_add(1, Ordering::SeqCst);
                let sql = String::from_utf8_lossy(rest).to_string();
                if sql.to_uppercase().starts_with("SELECT SLEEP") {
                    continue;
                }
                if answer_query(&mut stream, &sql).await.is_err() {
                    return;
                }
            }
            _ => {
                let reply = err_packet(1047, "08S01", "Unknown command");
                if write_packet(&mut stream, 1, &reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Run the login exchange; returns the sequence id for the final OK/ERR
async fn authenticate<S>(stream: &mut S, mode: AuthMode, login: &Login) -> Option<u8>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let denied = || {
        err_packet(
            1045,
            "28000",
            &format!("Access denied for user '{}'@'localhost' (using password: YES)", login.user),
        )
    };

    match mode {
        AuthMode::Native => {
            if login.auth_response != scramble_native(PASSWORD.as_bytes(), NONCE) {
                let _ = write_packet(stream, 2, &denied()).await;
                return None;
            }
            Some(2)
        }
        AuthMode::CachingSha2Fast => {
            if login.auth_response != scramble_caching_sha2(PASSWORD.as_bytes(), NONCE) {
                let _ = write_packet(stream, 2, &denied()).await;
                return None;
            }
            write_packet(stream, 2, &[0x01, 0x03]).await.ok()?;
            Some(3)
        }
        AuthMode::CachingSha2Full => {
            write_packet(stream, 2, &[0x01, 0x04]).await.ok()?;
            let (_, cleartext) = read_packet(stream).await?;
            let mut expected = PASSWORD.as_bytes().to_vec();
            expected.push(0);
            if cleartext != expected {
                let _ = write_packet(stream, 4, &denied()).await;
                return None;
            }
            Some(4)
        }
        AuthMode::SwitchToNative => {
            let mut switch = vec![0xFE];
            switch.extend_from_slice(plugins::NATIVE_PASSWORD.as_bytes());
            switch.push(0);
            switch.extend_from_slice(SWITCH_NONCE);
            switch.push(0);
            write_packet(stream, 2, &switch).await.ok()?;

            let (_, scramble) = read_packet(stream).await?;
            if scramble != scramble_native(PASSWORD.as_bytes(), SWITCH_NONCE) {
                let _ = write_packet(stream, 4, &denied()).await;
                return None;
            }
            Some(4)
        }
    }
}

async fn answer_query<S>(stream: &mut S, sql: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let normalized = sql.trim().trim_end_matches(';').to_uppercase();
    match normalized.as_str() {
        "SELECT VERSION()" => {
            let mut packets = vec![
                vec![1],
                column_definition("VERSION()"),
                eof_packet(),
            ];
            let mut row = BytesMut::new();
            put_lenenc_bytes(&mut row, SERVER_VERSION.as_bytes());
            packets.push(row.to_vec());
            packets.push(eof_packet());
            write_sequence(stream, &packets).await
        }
        "SELECT 1, NULL" => {
            let packets = vec![
                vec![2],
                column_definition("1"),
                column_definition("NULL"),
                eof_packet(),
                vec![1, b'1', 0xFB],
                eof_packet(),
            ];
            write_sequence(stream, &packets).await
        }
        "DO 1" => write_packet(stream, 1, &ok_packet()).await,
        // Column count far beyond anything a real server sends
        "SELECT BOGUS_COLUMNS" => {
            let count = [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
            write_packet(stream, 1, &count).await
        }
        _ => {
            let msg = format!(
                "You have an error in your SQL syntax near '{}' at line 1",
                sql
            );
            write_packet(stream, 1, &err_packet(1064, "42000", &msg)).await
        }
    }
}

async fn write_sequence<S>(stream: &mut S, payloads: &[Vec<u8>]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    for (i, payload) in payloads.iter().enumerate() {
        let mut seq = (i + 1) as u8;
        buf.extend_from_slice(&encode_packets(payload, &mut seq));
    }
    stream.write_all(&buf).await?;
    stream.flush().await
}

struct Login {
    user: String,
    auth_response: Vec<u8>,
    database: Option<String>,
}

fn parse_handshake_response(payload: &[u8]) -> Login {
    let caps = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let mut pos = 32;

    let user_end = pos + payload[pos..].iter().position(|&b| b == 0).unwrap();
    let user = String::from_utf8_lossy(&payload[pos..user_end]).to_string();
    pos = user_end + 1;

    // Responses here are always shorter than 0xFB bytes
    let auth_len = payload[pos] as usize;
    let auth_response = payload[pos + 1..pos + 1 + auth_len].to_vec();
    pos += 1 + auth_len;

    let database = if caps & capabilities::CONNECT_WITH_DB != 0 {
        let end = pos + payload[pos..].iter().position(|&b| b == 0).unwrap();
        Some(String::from_utf8_lossy(&payload[pos..end]).to_string())
    } else {
        None
    };

    Login {
        user,
        auth_response,
        database,
    }
}

fn greeting(connection_id: u32, plugin: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(10);
    buf.put_slice(SERVER_VERSION.as_bytes());
    buf.put_u8(0);
    buf.put_u32_le(connection_id);
    buf.put_slice(&NONCE[..8]);
    buf.put_u8(0);
    buf.put_u16_le(SERVER_CAPABILITIES as u16);
    buf.put_u8(45);
    buf.put_u16_le(0x0002);
    buf.put_u16_le((SERVER_CAPABILITIES >> 16) as u16);
    buf.put_u8(21);
    buf.put_bytes(0, 10);
    buf.put_slice(&NONCE[8..]);
    buf.put_u8(0);
    buf.put_slice(plugin.as_bytes());
    buf.put_u8(0);
    buf.to_vec()
}

fn ok_packet() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

fn eof_packet() -> Vec<u8> {
    vec![0xFE, 0x00, 0x00, 0x02, 0x00]
}

pub fn err_packet(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut buf = vec![0xFF];
    buf.extend_from_slice(&code.to_le_bytes());
    buf.push(b'#');
    buf.extend_from_slice(sql_state.as_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf
}

fn column_definition(name: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_lenenc_bytes(&mut buf, b"def");
    put_lenenc_bytes(&mut buf, b"");
    put_lenenc_bytes(&mut buf, b"");
    put_lenenc_bytes(&mut buf, b"");
    put_lenenc_bytes(&mut buf, name.as_bytes());
    put_lenenc_bytes(&mut buf, b"");
    buf.put_u8(0x0C);
    buf.put_u16_le(45);
    buf.put_u32_le(256);
    buf.put_u8(0xFD); // VAR_STRING
    buf.put_u16_le(0);
    buf.put_u8(0x27);
    buf.put_u16_le(0);
    buf.to_vec()
}

async fn write_packet<S>(stream: &mut S, seq: u8, payload: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut seq = seq;
    stream.write_all(&encode_packets(payload, &mut seq)).await?;
    stream.flush().await
}

async fn read_packet<S>(stream: &mut S) -> Option<(u8, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.ok()?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some((header[3], payload))
}
