use plantops_core::{
    settle, Entity, HttpRemote, OptimisticCollection, RemoteCollection, RemoteError, SyncConfig,
};
use plantops_test_utils::{spawn_one_shot_server, spawn_scripted_server, MockResponse};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Asset {
    tag: String,
    #[serde(default)]
    area: Option<String>,
}

fn remote(url: &str) -> HttpRemote {
    let config = SyncConfig {
        remote_base_url: Some(url.to_string()),
        disable_network: Some(false),
        request_timeout_ms: Some(5_000),
        actor_id: Some("op-7".into()),
        chat_cache: None,
    };
    HttpRemote::from_config(&config).unwrap().unwrap()
}

#[tokio::test]
async fn list_decodes_envelope_and_sends_actor() {
    let (url, rx) = spawn_one_shot_server(
        "200 OK",
        r#"{"success":true,"data":[{"id":"a1","tag":"P-101","area":"boiler house"}]}"#,
    );

    let envelope = remote(&url).list::<Entity<Asset>>("assets").await.unwrap();
    let assets = envelope.into_result().unwrap().unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].id(), Some("a1"));
    assert_eq!(assets[0].record.area.as_deref(), Some("boiler house"));

    let req = rx.recv().unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/assets");
    assert_eq!(req.header("x-actor-id"), Some("op-7"));
}

#[tokio::test]
async fn error_status_with_envelope_surfaces_server_message() {
    let (url, _rx) = spawn_one_shot_server(
        "409 Conflict",
        r#"{"success":false,"error":"tag already in use"}"#,
    );
    let outcome = remote(&url)
        .create::<_, Entity<Asset>>(
            "assets",
            &Asset {
                tag: "P-101".into(),
                area: None,
            },
        )
        .await;
    assert_eq!(settle(outcome), Err("tag already in use".to_string()));
}

#[tokio::test]
async fn error_status_without_envelope_is_a_status_error() {
    let (url, _rx) = spawn_one_shot_server("502 Bad Gateway", "<html>upstream down</html>");
    let err = remote(&url).delete("assets", "a1").await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 502 }));
}

#[tokio::test]
async fn success_without_data_settles_to_none() {
    let (url, rx) = spawn_one_shot_server("200 OK", r#"{"success":true}"#);
    let settled = settle(remote(&url).delete("assets", "a1").await);
    assert_eq!(settled, Ok(None));
    let req = rx.recv().unwrap();
    assert_eq!(req.method, "DELETE");
    assert_eq!(req.path, "/assets/a1");
}

#[tokio::test]
async fn collection_add_posts_record_without_provisional_id() {
    let (url, rx) = spawn_scripted_server(vec![
        MockResponse::ok(r#"{"success":true,"data":[{"id":"a1","tag":"P-101"}]}"#),
        MockResponse::ok(r#"{"success":true,"data":{"id":"a2","tag":"P-102","area":"yard"}}"#),
    ]);
    let service = RemoteCollection::new(remote(&url), "assets");
    let assets = OptimisticCollection::<Asset>::new();

    assert!(assets.refresh(&service).await);
    let _list = rx.recv().unwrap();

    let added = assets
        .add(
            &service,
            Asset {
                tag: "P-102".into(),
                area: Some("yard".into()),
            },
        )
        .await;
    assert!(added);

    let create = rx.recv().unwrap();
    assert_eq!(create.method, "POST");
    assert_eq!(create.path, "/assets");
    let body: serde_json::Value = serde_json::from_str(&create.body).unwrap();
    assert!(body.get("id").is_none());
    assert_eq!(body["tag"], "P-102");

    let ids: Vec<Option<String>> = assets
        .items()
        .iter()
        .map(|t| t.id().map(str::to_string))
        .collect();
    assert_eq!(ids, vec![Some("a2".to_string()), Some("a1".to_string())]);
}

#[tokio::test]
async fn get_and_update_address_one_item() {
    let (url, rx) = spawn_scripted_server(vec![
        MockResponse::ok(r#"{"success":true,"data":{"id":"a1","tag":"P-101"}}"#),
        MockResponse::ok(r#"{"success":true,"data":{"id":"a1","tag":"P-101A"}}"#),
    ]);
    let remote = remote(&url);

    let fetched = settle(remote.get::<Entity<Asset>>("assets", "a1").await).unwrap();
    assert_eq!(fetched.map(|e| e.record.tag), Some("P-101".to_string()));
    assert_eq!(rx.recv().unwrap().path, "/assets/a1");

    let body = Asset {
        tag: "P-101A".into(),
        area: None,
    };
    let updated = settle(remote.update::<_, Entity<Asset>>("assets", "a1", &body).await).unwrap();
    assert_eq!(updated.and_then(|e| e.id), Some("a1".to_string()));
    let req = rx.recv().unwrap();
    assert_eq!(req.method, "PUT");
    assert_eq!(req.path, "/assets/a1");
}
