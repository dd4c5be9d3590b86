// Integration test: external edits reach event-stream subscribers through
// the real watcher, and our own writes are not reported twice.

mod support;

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::time::{timeout, Instant};

use support::{test_config, TestServer};

/// Minimal event-stream reader over a streaming HTTP response.
struct EventReader {
    response: reqwest::Response,
    buffer: String,
}

impl EventReader {
    async fn open(server: &TestServer) -> Self {
        let response = reqwest::get(server.http("/api/events")).await.unwrap();
        assert_eq!(response.status(), 200);
        Self { response, buffer: String::new() }
    }

    /// Next data payload, skipping keepalive comments. `None` on timeout or
    /// end of stream.
    async fn next(&mut self, within: Duration) -> Option<Value> {
        let deadline = Instant::now() + within;
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..end + 2).collect();
                let data = frame.lines().find_map(|line| line.strip_prefix("data:"));
                match data {
                    Some(data) => return Some(serde_json::from_str(data.trim()).unwrap()),
                    None => continue,
                }
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let chunk = timeout(remaining, self.response.chunk()).await.ok()?.ok()??;
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    /// Everything that arrives within `window`.
    async fn collect(&mut self, window: Duration) -> Vec<Value> {
        let deadline = Instant::now() + window;
        let mut events = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match self.next(remaining).await {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }
}

fn changes_for<'a>(events: &'a [Value], name: &str) -> Vec<&'a Value> {
    events.iter().filter(|event| event["type"] == "change" && event["name"] == name).collect()
}

fn write_external(root: &Path, name: &str, content: &str) {
    let path = root.join("tracks").join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn external_edit_is_broadcast_with_listing() {
    let tmp = TempDir::new().unwrap();
    write_external(tmp.path(), "loop.strudel", "s(\"bd\")");
    let server = TestServer::start(test_config(tmp.path())).await;
    let mut events = EventReader::open(&server).await;

    let snapshot = events.next(Duration::from_secs(2)).await.unwrap();
    assert_eq!(snapshot, json!({"type": "tracklist", "tracks": ["loop.strudel"]}));

    write_external(tmp.path(), "loop.strudel", "s(\"bd hh\")");
    let received = events.collect(Duration::from_millis(800)).await;
    assert_eq!(
        changes_for(&received, "loop.strudel"),
        vec![&json!({
            "type": "change",
            "name": "loop.strudel",
            "content": "s(\"bd hh\")",
            "undoDepth": 1
        })]
    );
    assert_eq!(
        received.last(),
        Some(&json!({"type": "tracklist", "tracks": ["loop.strudel"]}))
    );

    server.stop().await;
}

#[tokio::test]
async fn own_write_is_reported_once() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.tracks.debounce_ms = 150;
    let server = TestServer::start(config).await;
    let client = reqwest::Client::new();

    client
        .post(server.http("/api/track/create"))
        .json(&json!({"name": "set"}))
        .send()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut events = EventReader::open(&server).await;
    events.next(Duration::from_secs(2)).await.unwrap();

    let response = client
        .put(server.http("/api/track?name=set.strudel"))
        .json(&json!({"content": "note(\"c e g\")"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = events.collect(Duration::from_millis(800)).await;
    let changes = changes_for(&received, "set.strudel");
    assert_eq!(changes.len(), 1, "unexpected events: {received:?}");
    assert_eq!(changes[0]["undoDepth"], 1);

    server.stop().await;
}

#[tokio::test]
async fn folders_created_after_startup_are_watched() {
    let tmp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(tmp.path())).await;
    let mut events = EventReader::open(&server).await;
    assert_eq!(
        events.next(Duration::from_secs(2)).await.unwrap(),
        json!({"type": "tracklist", "tracks": []})
    );

    std::fs::create_dir_all(tmp.path().join("tracks/fresh/deeper")).unwrap();
    // Give the watcher time to pick up the new folders.
    tokio::time::sleep(Duration::from_millis(200)).await;
    write_external(tmp.path(), "fresh/deeper/x.strudel", "s(\"hh*4\")");

    let received = events.collect(Duration::from_millis(800)).await;
    let changes = changes_for(&received, "fresh/deeper/x.strudel");
    assert_eq!(changes.len(), 1, "unexpected events: {received:?}");
    assert_eq!(changes[0]["content"], "s(\"hh*4\")");
    assert_eq!(
        received.last(),
        Some(&json!({"type": "tracklist", "tracks": ["fresh/deeper/x.strudel"]}))
    );

    server.stop().await;
}

#[tokio::test]
async fn removed_track_is_broadcast_as_delete() {
    let tmp = TempDir::new().unwrap();
    write_external(tmp.path(), "nested/gone.strudel", "s(\"cp\")");
    let server = TestServer::start(test_config(tmp.path())).await;
    let mut events = EventReader::open(&server).await;
    events.next(Duration::from_secs(2)).await.unwrap();

    std::fs::remove_file(tmp.path().join("tracks/nested/gone.strudel")).unwrap();
    let received = events.collect(Duration::from_millis(800)).await;
    assert!(received.contains(&json!({"type": "delete", "name": "nested/gone.strudel"})));
    assert_eq!(received.last(), Some(&json!({"type": "tracklist", "tracks": []})));

    server.stop().await;
}

#[tokio::test]
async fn burst_of_edits_settles_into_one_change() {
    let tmp = TempDir::new().unwrap();
    write_external(tmp.path(), "burst.strudel", "v0");
    let mut config = test_config(tmp.path());
    config.tracks.debounce_ms = 300;
    let server = TestServer::start(config).await;
    let mut events = EventReader::open(&server).await;
    events.next(Duration::from_secs(2)).await.unwrap();

    for version in 1..=5 {
        write_external(tmp.path(), "burst.strudel", &format!("v{version}"));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let received = events.collect(Duration::from_millis(1200)).await;
    let changes = changes_for(&received, "burst.strudel");
    assert_eq!(changes.len(), 1, "unexpected events: {received:?}");
    assert_eq!(changes[0]["content"], "v5");

    server.stop().await;
}

#[tokio::test]
async fn non_track_files_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(tmp.path())).await;
    let mut events = EventReader::open(&server).await;
    events.next(Duration::from_secs(2)).await.unwrap();

    write_external(tmp.path(), "notes.txt", "not a track");
    write_external(tmp.path(), "UPPER.STRUDEL", "wrong case");
    assert!(events.collect(Duration::from_millis(500)).await.is_empty());

    server.stop().await;
}
