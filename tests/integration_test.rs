use clipdeck::{
    clipboard::{
        detector::{CheckOutcome, ClipboardEvent},
        processor::HistoryPersister,
        ClipboardBackend, ClipboardEntry, EntryType, MemoryClipboard, SystemClipboard,
    },
    config::AppConfig,
    control::{
        auth::{AuthConfig, AuthManager},
        ControlConfig, ControlServer,
    },
    history::HistoryStore,
    service::ClipboardService,
    storage::{Storage, StorageConfig, CLIPBOARD_HISTORY},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn test_config(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage = StorageConfig {
        data_dir: dir.path().join("data"),
        max_backups: 3,
    };
    config.scheduler.poll_interval_ms = 20;
    config
}

async fn next_change(rx: &mut tokio::sync::broadcast::Receiver<ClipboardEvent>) -> ClipboardEntry {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for clipboard change")
            .expect("event channel closed");
        if let ClipboardEvent::Changed(entry) = event {
            return entry;
        }
    }
}

#[tokio::test]
async fn test_polling_picks_up_external_copies() {
    let dir = tempfile::tempdir().unwrap();
    let clipboard = Arc::new(MemoryClipboard::new());
    let service = ClipboardService::new(clipboard.clone(), &test_config(&dir));
    let mut rx = service.subscribe();

    service.start_monitoring();
    clipboard.write_text("user@example.com").unwrap();
    let entry = next_change(&mut rx).await;
    assert_eq!(entry.entry_type, EntryType::Email);

    clipboard.write_text("SELECT id FROM users WHERE id = 1").unwrap();
    let entry = next_change(&mut rx).await;
    assert_eq!(entry.entry_type, EntryType::Code);
    assert_eq!(entry.sub_type.as_deref(), Some("sql"));

    service.stop_monitoring();
    assert!(!service.is_monitoring());
    assert_eq!(service.get_history().await.len(), 2);
}

#[tokio::test]
async fn test_own_writes_never_reach_history() {
    let dir = tempfile::tempdir().unwrap();
    let clipboard = Arc::new(MemoryClipboard::new());
    let service = ClipboardService::new(clipboard.clone(), &test_config(&dir));

    tokio_test::assert_ok!(service.write_to_clipboard("written by us"));
    assert_eq!(service.check_now().await, CheckOutcome::Suppressed);
    assert_eq!(service.check_now().await, CheckOutcome::Unchanged);

    clipboard.write_text("copied elsewhere").unwrap();
    assert!(matches!(service.check_now().await, CheckOutcome::Changed(_)));

    let history = service.get_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "copied elsewhere");
    assert_eq!(service.read_from_clipboard(), "copied elsewhere");
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let storage = Arc::new(Storage::new(config.storage.clone()).await.unwrap());

    let pinned_id = {
        let clipboard = Arc::new(MemoryClipboard::new());
        let service = ClipboardService::new(clipboard.clone(), &config);
        let persister = HistoryPersister::new(storage.clone(), service.history());
        let task = tokio::spawn(persister.start_processing(service.subscribe()));

        clipboard.write_text("keep me").unwrap();
        service.check_now().await;
        clipboard.write_text("https://example.org").unwrap();
        service.check_now().await;

        let id = service.get_history().await[1].id.clone();
        assert!(service.toggle_pin(&id).await);
        assert!(service.add_tag(&id, "important").await);

        drop(service);
        timeout(Duration::from_secs(2), task)
            .await
            .expect("persister did not stop")
            .unwrap();
        id
    };

    let restored: Vec<ClipboardEntry> = storage.load(CLIPBOARD_HISTORY).await.unwrap();
    let store = HistoryStore::from_entries(restored, config.history.max_size);
    let service = ClipboardService::with_history(Arc::new(MemoryClipboard::new()), &config, store);

    let history = service.get_history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].entry_type, EntryType::Url);
    assert_eq!(history[1].id, pinned_id);
    assert!(history[1].is_pinned);
    assert!(history[1].tags.contains("important"));

    service.clear_history().await;
    assert_eq!(service.get_history().await.len(), 1);
}

#[tokio::test]
async fn test_control_server_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let clipboard = Arc::new(MemoryClipboard::new());
    let service = Arc::new(ClipboardService::new(clipboard.clone(), &test_config(&dir)));

    let auth_manager = AuthManager::new(AuthConfig {
        token_path: dir.path().join("auth.token"),
        require_auth: true,
    })
    .await
    .unwrap();
    let token = auth_manager.get_token().unwrap().to_string();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = ControlServer::new(service.clone(), auth_manager, &ControlConfig::default());
    tokio::spawn(server.serve(listener));

    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let denied = client
        .post(format!("{base}/rpc"))
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "history.get" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    let mut events = client
        .get(format!("{base}/events?token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(events.status(), reqwest::StatusCode::OK);

    clipboard.write_text("def main():\n    print('hi')").unwrap();
    assert!(matches!(service.check_now().await, CheckOutcome::Changed(_)));

    let mut received = String::new();
    timeout(Duration::from_secs(2), async {
        while !received.contains("\"subType\":\"python\"") {
            match events.chunk().await.unwrap() {
                Some(chunk) => received.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    })
    .await
    .expect("no clipboard-changed event");
    assert!(received.contains("event: clipboard-changed"));

    let history: Value = client
        .post(format!("{base}/rpc"))
        .bearer_auth(&token)
        .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "history.get" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = history["result"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["type"], "code");
}

#[tokio::test]
#[ignore = "needs a display server with a clipboard"]
async fn test_system_clipboard_roundtrip() {
    let clipboard = SystemClipboard::new().unwrap();
    clipboard.write_text("Hello, clipdeck!").unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(clipboard.read_text().unwrap(), "Hello, clipdeck!");
}
