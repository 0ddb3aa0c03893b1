use plantops_core::{
    default_config_json, ChatMessage, HttpRemote, StoreUpdate, SyncContext, CONFIG_FILE_NAME,
};
use plantops_test_utils::{spawn_one_shot_server, spawn_scripted_server, MockResponse};
use tempfile::tempdir;

fn write_config(data_dir: &str, remote: Option<&str>, chat_cache: bool) {
    let mut v: serde_json::Value = serde_json::from_str(&default_config_json()).unwrap();
    v["remote_base_url"] = remote.map_or(serde_json::Value::Null, |r| r.into());
    v["actor_id"] = "op-7".into();
    v["chat_cache"] = chat_cache.into();
    let path = std::path::Path::new(data_dir).join(CONFIG_FILE_NAME);
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

fn open(data_dir: &str) -> (SyncContext, flume::Receiver<StoreUpdate>, Option<HttpRemote>) {
    let (tx, rx) = flume::unbounded();
    let ctx = SyncContext::open(data_dir, tx);
    let remote = HttpRemote::from_config(ctx.config()).unwrap();
    (ctx, rx, remote)
}

#[tokio::test]
async fn chat_send_then_history_refresh_over_http() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    let now = plantops_core::now_millis();
    let history = serde_json::json!({
        "success": true,
        "data": [
            {"id": "m1", "sender": "bob", "message": "shift start", "timestamp": now - 60_000},
            {"id": "m2", "sender": "op-7", "message": "pump 3 tripped", "timestamp": now + 800},
        ],
    })
    .to_string();
    let (url, rx) = spawn_scripted_server(vec![
        // Send acknowledged without echoing the message back.
        MockResponse::ok(r#"{"success":true}"#),
        MockResponse::ok(&history),
    ]);
    write_config(data_dir, Some(&url), false);
    let (mut ctx, updates, remote) = open(data_dir);
    let remote = remote.unwrap();

    assert!(ctx.send_chat_via(&remote, "pump 3 tripped").await);
    let post = rx.recv().unwrap();
    assert_eq!(post.method, "POST");
    assert_eq!(post.path, "/chat_messages");
    assert_eq!(post.header("x-actor-id"), Some("op-7"));
    let body: serde_json::Value = serde_json::from_str(&post.body).unwrap();
    assert!(body.get("id").is_none());
    assert_eq!(body["sender"], "op-7");
    assert_eq!(ctx.chat().pending_count(), 1);

    assert!(ctx.refresh_chat(&remote).await);
    let ids: Vec<&str> = ctx.chat().messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert!(ctx.chat().last_fetched_at().is_some());

    let revs: Vec<u64> = updates.try_iter().map(|u| u.rev()).collect();
    assert_eq!(revs, vec![1, 2]);
}

#[tokio::test]
async fn notifications_refresh_respects_mark_all_window() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    let stale = r#"{"success":true,"data":[{"id":"n1","title":"High vibration","read":false}]}"#;
    let (url, _rx) = spawn_scripted_server(vec![MockResponse::ok(stale), MockResponse::ok(stale)]);
    write_config(data_dir, Some(&url), false);
    let (mut ctx, _updates, remote) = open(data_dir);
    let remote = remote.unwrap();

    assert!(ctx.refresh_notifications(&remote).await);
    assert_eq!(ctx.notifications().unread_count(), 1);

    ctx.mark_all_notifications_read();
    assert!(ctx.refresh_notifications(&remote).await);
    assert_eq!(ctx.notifications().unread_count(), 0);
    assert_eq!(ctx.notifications().notifications()[0].title, "High vibration");
}

#[tokio::test]
async fn mark_all_read_writes_unread_entries_to_server() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    let list = r#"{"success":true,"data":[{"id":"n1","read":false},{"id":"n2","read":true}]}"#;
    let (url, rx) = spawn_scripted_server(vec![
        MockResponse::ok(list),
        MockResponse::ok(r#"{"success":true,"data":{"id":"n1","read":true}}"#),
    ]);
    write_config(data_dir, Some(&url), false);
    let (mut ctx, _updates, remote) = open(data_dir);
    let remote = remote.unwrap();

    assert!(ctx.refresh_notifications(&remote).await);
    let _list = rx.recv().unwrap();
    assert!(ctx.mark_all_notifications_read_via(&remote).await);

    let put = rx.recv().unwrap();
    assert_eq!(put.method, "PUT");
    assert_eq!(put.path, "/notifications/n1");
    let body: serde_json::Value = serde_json::from_str(&put.body).unwrap();
    assert_eq!(body, serde_json::json!({ "read": true }));
    assert_eq!(ctx.notifications().unread_count(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_refresh_reports_error_and_keeps_state() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    let (url, _rx) = spawn_one_shot_server("503 Service Unavailable", r#"{"success":false}"#);
    write_config(data_dir, Some(&url), false);
    let (mut ctx, updates, remote) = open(data_dir);

    assert!(!ctx.refresh_chat(&remote.unwrap()).await);
    assert_eq!(ctx.state().last_error.as_deref(), Some("An unexpected error occurred"));
    assert!(matches!(updates.try_recv(), Ok(StoreUpdate::Error { rev: 1, .. })));
}

#[test]
fn chat_cache_survives_reopen() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir, None, true);

    {
        let (mut ctx, _updates, remote) = open(data_dir);
        assert!(remote.is_none());
        ctx.apply_chat_history(
            (0..120)
                .map(|i| ChatMessage {
                    id: format!("m{i}"),
                    sender: "bob".into(),
                    message: format!("reading {i}"),
                    timestamp: 1_000 + i,
                })
                .collect(),
        );
    }

    let (ctx, _updates, _) = open(data_dir);
    let messages = ctx.chat().messages();
    assert_eq!(messages.len(), 100);
    assert_eq!(messages[0].id, "m20");
    assert!(ctx.chat().last_fetched_at().is_some());
}

#[test]
fn disabled_cache_starts_empty() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir, None, false);
    {
        let (mut ctx, _updates, _) = open(data_dir);
        ctx.apply_chat_history(vec![ChatMessage {
            id: "m1".into(),
            sender: "bob".into(),
            message: "hello".into(),
            timestamp: 1,
        }]);
    }
    let (ctx, _updates, _) = open(data_dir);
    assert!(ctx.chat().messages().is_empty());
    assert!(!dir.path().join("chat_cache.sqlite3").exists());
}
