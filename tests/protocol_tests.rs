//! End-to-end protocol tests over real TCP connections.

use flashcache::connection::ConnectionStats;
use flashcache::server::accept_loop;
use flashcache::storage::{StorageEngine, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const TIMEOUT: Duration = Duration::from_secs(2);

async fn start_server(storage: Arc<StorageEngine>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(ConnectionStats::new());
    tokio::spawn(accept_loop(listener, storage, stats));
    addr
}

struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream: BufReader::new(stream),
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.get_mut().write_all(bytes).await.unwrap();
    }

    /// Reads exactly `expected.len()` bytes and compares them.
    async fn expect(&mut self, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(TIMEOUT, self.stream.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .expect("connection closed before full reply");
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    /// Sends a request and checks the reply.
    async fn roundtrip(&mut self, request: &[u8], reply: &[u8]) {
        self.send(request).await;
        self.expect(reply).await;
    }

    /// Asserts the server closed the connection.
    async fn expect_closed(&mut self) {
        let mut buf = [0u8; 1];
        let result = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for close");
        assert!(matches!(result, Ok(0) | Err(_)), "connection still open");
    }
}

async fn setup() -> (Client, Arc<StorageEngine>, SocketAddr) {
    let storage = Arc::new(StorageEngine::new());
    let addr = start_server(Arc::clone(&storage)).await;
    (Client::connect(addr).await, storage, addr)
}

#[tokio::test]
async fn set_then_get_returns_payload() {
    let (mut client, _, _) = setup().await;

    client
        .roundtrip(b"set greeting 0 0 11\r\nhello world\r\n", b"STORED\r\n")
        .await;
    client
        .roundtrip(
            b"get greeting\r\n",
            b"VALUE greeting 0 11\r\nhello world\r\nEND\r\n",
        )
        .await;
}

#[tokio::test]
async fn get_missing_key_returns_end() {
    let (mut client, _, _) = setup().await;
    client.roundtrip(b"get nope\r\n", b"END\r\n").await;
}

#[tokio::test]
async fn add_only_stores_absent_keys() {
    let (mut client, _, _) = setup().await;

    client.roundtrip(b"add k 0 0 1\r\na\r\n", b"STORED\r\n").await;
    client.roundtrip(b"add k 0 0 1\r\nb\r\n", b"NOT_STORED\r\n").await;
    client
        .roundtrip(b"get k\r\n", b"VALUE k 0 1\r\na\r\nEND\r\n")
        .await;
}

#[tokio::test]
async fn replace_only_stores_present_keys() {
    let (mut client, _, _) = setup().await;

    client
        .roundtrip(b"replace k 0 0 1\r\na\r\n", b"NOT_STORED\r\n")
        .await;
    client.roundtrip(b"set k 0 0 1\r\na\r\n", b"STORED\r\n").await;
    client
        .roundtrip(b"replace k 3 0 1\r\nb\r\n", b"STORED\r\n")
        .await;
    client
        .roundtrip(b"get k\r\n", b"VALUE k 3 1\r\nb\r\nEND\r\n")
        .await;
}

#[tokio::test]
async fn append_and_prepend() {
    let (mut client, _, _) = setup().await;

    client
        .roundtrip(b"append k 0 0 1\r\nx\r\n", b"NOT_STORED\r\n")
        .await;
    client
        .roundtrip(b"prepend k 0 0 1\r\nx\r\n", b"NOT_STORED\r\n")
        .await;

    client.roundtrip(b"set k 1 0 3\r\nmid\r\n", b"STORED\r\n").await;
    client
        .roundtrip(b"append k 2 0 4\r\n-end\r\n", b"STORED\r\n")
        .await;
    client
        .roundtrip(b"prepend k 5 0 6\r\nstart-\r\n", b"STORED\r\n")
        .await;

    // Flags follow the most recent command
    client
        .roundtrip(b"get k\r\n", b"VALUE k 5 13\r\nstart-mid-end\r\nEND\r\n")
        .await;
}

#[tokio::test]
async fn cas_semantics() {
    let (mut client, _, _) = setup().await;

    client
        .roundtrip(b"cas k 0 0 1 1\r\nx\r\n", b"NOT_FOUND\r\n")
        .await;

    client.roundtrip(b"set k 7 0 3\r\nold\r\n", b"STORED\r\n").await;

    // Any cas unique is accepted; zero flags and an empty payload keep the old ones
    client
        .roundtrip(b"cas k 0 0 0 12345\r\n\r\n", b"STORED\r\n")
        .await;
    client
        .roundtrip(b"get k\r\n", b"VALUE k 7 3\r\nold\r\nEND\r\n")
        .await;

    client
        .roundtrip(b"cas k 9 0 3 1\r\nnew\r\n", b"STORED\r\n")
        .await;
    client
        .roundtrip(b"get k\r\n", b"VALUE k 9 3\r\nnew\r\nEND\r\n")
        .await;
}

#[tokio::test]
async fn delete_always_replies_deleted() {
    let (mut client, storage, _) = setup().await;

    client.roundtrip(b"delete ghost\r\n", b"DELETED\r\n").await;

    client.roundtrip(b"set k 0 0 1\r\nv\r\n", b"STORED\r\n").await;
    client.roundtrip(b"delete k\r\n", b"DELETED\r\n").await;
    client.roundtrip(b"get k\r\n", b"END\r\n").await;
    assert!(storage.get(b"k").is_none());
}

#[tokio::test]
async fn malformed_command_ends_session() {
    let (mut client, _, _) = setup().await;

    client.roundtrip(b"set k 0 0\r\n", b"ERROR\r\n").await;
    client.expect_closed().await;
}

#[tokio::test]
async fn unknown_command_ends_session() {
    let (mut client, _, addr) = setup().await;

    client.roundtrip(b"stats\r\n", b"ERROR\r\n").await;
    client.expect_closed().await;

    // Other clients are unaffected
    let mut other = Client::connect(addr).await;
    other.roundtrip(b"get k\r\n", b"END\r\n").await;
}

#[tokio::test]
async fn noreply_suppresses_replies() {
    let (mut client, _, _) = setup().await;

    client.send(b"set a 0 0 1 noreply\r\n1\r\n").await;
    client.send(b"add b 0 0 1 noreply\r\n2\r\n").await;
    client.send(b"replace b 4 0 1 noreply\r\n3\r\n").await;
    client.send(b"append a 0 0 1 noreply\r\n+\r\n").await;
    client.send(b"prepend a 0 0 1 noreply\r\n-\r\n").await;
    client.send(b"cas b 6 0 1 99 noreply\r\n4\r\n").await;
    client.send(b"delete a noreply\r\n").await;

    // Misses are silent too
    client.send(b"replace none 0 0 1 noreply\r\nx\r\n").await;
    client.send(b"cas none 0 0 1 1 noreply\r\nx\r\n").await;
    client.send(b"add b 0 0 1 noreply\r\nx\r\n").await;

    // Only the get replies reach the wire
    client.roundtrip(b"get a\r\n", b"END\r\n").await;
    client
        .roundtrip(b"get b\r\n", b"VALUE b 6 1\r\n4\r\nEND\r\n")
        .await;
    client.roundtrip(b"get none\r\n", b"END\r\n").await;
}

#[tokio::test]
async fn noreply_does_not_hide_server_errors() {
    let storage = Arc::new(StorageEngine::with_max_item_size(4));
    let addr = start_server(storage).await;
    let mut client = Client::connect(addr).await;

    client.send(b"set k 0 0 9 noreply\r\n123456789\r\n").await;
    client
        .expect(b"SERVER_ERROR object too large for cache\r\n")
        .await;

    // Successful quiet writes stay quiet afterwards
    client.send(b"set k 0 0 4 noreply\r\n1234\r\n").await;
    client
        .roundtrip(b"get k\r\n", b"VALUE k 0 4\r\n1234\r\nEND\r\n")
        .await;
}

#[tokio::test]
async fn capacity_budget_evicts_older_items() {
    let storage = Arc::new(StorageEngine::with_limits(1024, 16));
    let addr = start_server(Arc::clone(&storage)).await;
    let mut client = Client::connect(addr).await;

    for i in 0..10 {
        let request = format!("set key{} 0 0 8\r\n{:08}\r\n", i, i);
        client.roundtrip(request.as_bytes(), b"STORED\r\n").await;
    }

    // The latest write is always kept; older ones made room for it
    client
        .roundtrip(b"get key9\r\n", b"VALUE key9 0 8\r\n00000009\r\nEND\r\n")
        .await;
    let stats = storage.stats();
    assert_eq!(stats.keys, 2);
    assert!(stats.total_cost <= 16);

    client
        .roundtrip(
            b"set huge 0 0 17\r\n12345678901234567\r\n",
            b"SERVER_ERROR out of memory storing object\r\n",
        )
        .await;
}

#[tokio::test]
async fn bare_newlines_and_case_insensitive_verbs() {
    let (mut client, _, _) = setup().await;

    client.roundtrip(b"SET k 0 0 2\nhi\r\n", b"STORED\r\n").await;
    client
        .roundtrip(b"Get k\n", b"VALUE k 0 2\r\nhi\r\nEND\r\n")
        .await;
}

#[tokio::test]
async fn oversized_item_keeps_connection_open() {
    let storage = Arc::new(StorageEngine::with_max_item_size(8));
    let addr = start_server(storage).await;
    let mut client = Client::connect(addr).await;

    client
        .roundtrip(
            b"set big 0 0 9\r\n123456789\r\n",
            b"SERVER_ERROR object too large for cache\r\n",
        )
        .await;

    // Still usable
    client.roundtrip(b"set ok 0 0 1\r\n1\r\n", b"STORED\r\n").await;
}

#[tokio::test]
async fn positive_exptime_expires() {
    let (mut client, _, _) = setup().await;

    client.roundtrip(b"set k 0 1 1\r\nv\r\n", b"STORED\r\n").await;
    client
        .roundtrip(b"get k\r\n", b"VALUE k 0 1\r\nv\r\nEND\r\n")
        .await;

    tokio::time::sleep(Duration::from_millis(1100)).await;
    client.roundtrip(b"get k\r\n", b"END\r\n").await;
}

#[tokio::test]
async fn concurrent_clients_with_disjoint_keys() {
    let storage = Arc::new(StorageEngine::new());
    let addr = start_server(Arc::clone(&storage)).await;

    let mut tasks = Vec::new();
    for client_id in 0..8 {
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            for round in 0..25 {
                let key = format!("client{}", client_id);
                let value = format!("value-{}-{}", client_id, round);
                let request = format!("set {} {} 0 {}\r\n{}\r\n", key, client_id, value.len(), value);
                client.roundtrip(request.as_bytes(), b"STORED\r\n").await;
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    // Each key holds its own client's last write
    let mut client = Client::connect(addr).await;
    for client_id in 0..8 {
        let value = format!("value-{}-24", client_id);
        let request = format!("get client{}\r\n", client_id);
        let reply = format!(
            "VALUE client{} {} {}\r\n{}\r\nEND\r\n",
            client_id,
            client_id,
            value.len(),
            value
        );
        client.roundtrip(request.as_bytes(), reply.as_bytes()).await;
    }
    assert_eq!(storage.len(), 8);
}
