mod common;

use std::time::Duration;

use serde_json::json;

use common::{item_path, items_path, StubServer};
use listcache_core::{DataError, ListQueryOptions, ListService, Record};

async fn preloaded(server: &StubServer) -> ListService {
    common::route_preload_backend(server);
    let service = ListService::new(common::config(&server.base_url(), common::preload_lists()))
        .expect("service");
    service.preload().await.expect("preload");
    service
}

#[tokio::test]
async fn preload_fills_slots_and_relationships() {
    let server = StubServer::start().await;
    common::route_preload_backend(&server);
    let service = ListService::new(common::config(&server.base_url(), common::preload_lists()))
        .expect("service");

    let summary = service.preload().await.expect("preload");
    assert_eq!(summary.list_counts.get("parents"), Some(&2));
    assert_eq!(summary.list_counts.get("requirements"), Some(&3));
    assert_eq!(summary.site_user_count, 2);
    assert_eq!(summary.current_user.as_deref(), Some("Ada Lovelace"));
    assert_eq!(summary.linked_requirements, 2);
    assert_eq!(summary.unlinked_requirements, 1);

    let ids = |records: Vec<Record>| records.iter().filter_map(Record::id).collect::<Vec<_>>();
    assert_eq!(ids(service.requirements_for(1)), vec![10, 11]);
    assert!(service.requirements_for(2).is_empty());
    assert_eq!(service.parent_of(11).and_then(|p| p.id()), Some(1));
    assert!(service.parent_of(12).is_none());
    assert_eq!(
        service.user_by_id(9).and_then(|u| u.get_str("Title").map(String::from)),
        Some("Grace Hopper".to_string())
    );
    assert_eq!(ids(service.sample("requirements", 2)), vec![10, 11]);

    // The digest is fetched before any list.
    assert_eq!(server.requests()[0].path, "/contextinfo");
    // Per-alias query defaults are applied.
    let request = server.last("GET", &items_path("Parents")).expect("parents request");
    assert_eq!(request.query.get("$orderby").map(String::as_str), Some("Title"));
}

#[tokio::test]
async fn preload_fails_entirely_when_one_slot_fails() {
    let server = StubServer::start().await;
    common::route_preload_backend(&server);
    server.route("GET", "/Web/siteusers", 500, json!({"error": "down"}));
    let service = ListService::new(common::config(&server.base_url(), common::preload_lists()))
        .expect("service");

    let err = service.preload().await.unwrap_err();
    match err {
        DataError::Preload { slot, source } => {
            assert_eq!(slot, "siteUsers");
            assert!(matches!(*source, DataError::ServerError { .. }));
        }
        other => panic!("expected preload error, got {:?}", other),
    }
    assert!(service.sample("parents", 5).is_empty());
    assert!(service.stats().per_list_counts.is_empty());
}

#[tokio::test]
async fn preload_fails_without_credential() {
    let server = StubServer::start().await;
    common::route_preload_backend(&server);
    server.route("POST", "/contextinfo", 500, json!({}));
    let service = ListService::new(common::config(&server.base_url(), common::preload_lists()))
        .expect("service");

    let err = service.preload().await.unwrap_err();
    assert!(matches!(err, DataError::Preload { ref slot, .. } if slot == "digest"));
    assert_eq!(server.count("GET", &items_path("Parents")), 0);
}

#[tokio::test]
async fn concurrent_reads_issue_one_request() {
    let server = StubServer::start().await;
    server.route_delayed(
        "GET",
        &items_path("Widgets"),
        json!({"value": [{"Id": 1}]}),
        Duration::from_millis(100),
    );
    let service = ListService::new(common::config(&server.base_url(), json!({}))).expect("service");

    let options = ListQueryOptions::new().select(["Title", "Id"]);
    let reordered = ListQueryOptions::new().select(["Id", "Title"]);
    let (a, b, c) = tokio::join!(
        service.list_items("Widgets", &options),
        service.list_items("Widgets", &reordered),
        service.list_items("Widgets", &options),
    );
    assert_eq!(a.expect("a").len(), 1);
    assert_eq!(b.expect("b").len(), 1);
    assert_eq!(c.expect("c").len(), 1);
    assert_eq!(server.count("GET", &items_path("Widgets")), 1);

    service.list_items("Widgets", &options).await.expect("hit");
    assert_eq!(server.count("GET", &items_path("Widgets")), 1);

    let stats = service.stats();
    assert_eq!(stats.load_count, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.hit_rate, Some(0.5));
}

#[tokio::test]
async fn stats_before_any_request() {
    let server = StubServer::start().await;
    let service = ListService::new(common::config(&server.base_url(), json!({}))).expect("service");
    let stats = service.stats();
    assert_eq!(stats.hit_rate, None);
    assert_eq!(stats.cached_entry_count, 0);
}

#[tokio::test]
async fn update_invalidates_and_refreshes_slot() {
    let server = StubServer::start().await;
    let service = preloaded(&server).await;
    assert_eq!(server.count("GET", &items_path("Requirements")), 1);

    server.route_empty("MERGE", &item_path("Requirements", 12), 204);
    server.route(
        "GET",
        &items_path("Requirements"),
        200,
        json!({"value": [
            {"Id": 10, "Title": "R10", "ParentId": 1},
            {"Id": 11, "Title": "R11", "ParentId": 1},
            {"Id": 12, "Title": "R12", "ParentId": 2}
        ]}),
    );

    let fields = Record::from_value(json!({"ParentId": 2})).expect("fields");
    service
        .update_item("Requirements", 12, &fields)
        .await
        .expect("update");

    assert_eq!(server.count("GET", &items_path("Requirements")), 2);
    assert_eq!(service.parent_of(12).and_then(|p| p.id()), Some(2));
    assert_eq!(
        service
            .requirements_for(2)
            .iter()
            .filter_map(Record::id)
            .collect::<Vec<_>>(),
        vec![12]
    );
    // Parents were not touched by the write.
    assert_eq!(server.count("GET", &items_path("Parents")), 1);
}

/// Requirements before the second write: 11 still points at parent 1.
fn stale_requirements() -> serde_json::Value {
    json!({"value": [
        {"Id": 10, "ParentId": 1},
        {"Id": 11, "ParentId": 1},
        {"Id": 12, "ParentId": 2}
    ]})
}

fn fresh_requirements() -> serde_json::Value {
    json!({"value": [
        {"Id": 10, "ParentId": 1},
        {"Id": 11, "ParentId": 2},
        {"Id": 12, "ParentId": 2}
    ]})
}

fn requirement_ids(service: &ListService, parent_id: i64) -> Vec<i64> {
    service
        .requirements_for(parent_id)
        .iter()
        .filter_map(Record::id)
        .collect()
}

#[tokio::test]
async fn slow_refresh_does_not_overwrite_newer_one() {
    let server = StubServer::start().await;
    let service = preloaded(&server).await;
    server.route_empty("MERGE", &item_path("Requirements", 12), 204);
    server.route_empty("MERGE", &item_path("Requirements", 11), 204);
    // First refresh answers late with data from before the second write.
    server.route_delayed(
        "GET",
        &items_path("Requirements"),
        stale_requirements(),
        Duration::from_millis(300),
    );
    server.route_then("GET", &items_path("Requirements"), 200, fresh_requirements());

    let fields = Record::from_value(json!({"ParentId": 2})).expect("fields");
    let (first, second) = tokio::join!(service.update_item("Requirements", 12, &fields), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.update_item("Requirements", 11, &fields).await
    });
    first.expect("first update");
    second.expect("second update");

    assert_eq!(server.count("GET", &items_path("Requirements")), 3);
    assert_eq!(requirement_ids(&service, 2), vec![11, 12]);
    assert_eq!(service.parent_of(11).and_then(|p| p.id()), Some(2));
    let cached = service
        .list_items("Requirements", &ListQueryOptions::new())
        .await
        .expect("cached");
    assert_eq!(cached[1].get_i64("ParentId"), Some(2));
}

#[tokio::test]
async fn preload_keeps_slot_refreshed_while_it_ran() {
    let server = StubServer::start().await;
    let service = preloaded(&server).await;
    server.route_empty("MERGE", &item_path("Requirements", 11), 204);
    server.route_delayed(
        "GET",
        &items_path("Requirements"),
        stale_requirements(),
        Duration::from_millis(300),
    );
    server.route_then("GET", &items_path("Requirements"), 200, fresh_requirements());
    service.invalidate("Requirements");

    let fields = Record::from_value(json!({"ParentId": 2})).expect("fields");
    let (summary, update) = tokio::join!(service.preload(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.update_item("Requirements", 11, &fields).await
    });
    summary.expect("preload");
    update.expect("update");

    assert_eq!(server.count("GET", &items_path("Requirements")), 3);
    assert_eq!(requirement_ids(&service, 2), vec![11, 12]);
    assert_eq!(requirement_ids(&service, 1), vec![10]);
}

#[tokio::test]
async fn failed_write_leaves_cache_intact() {
    let server = StubServer::start().await;
    let service = preloaded(&server).await;
    server.route("DELETE", &item_path("Parents", 1), 500, json!({"error": "locked"}));

    let err = service.delete_item("Parents", 1).await.unwrap_err();
    assert!(matches!(err, DataError::ServerError { .. }));

    service
        .list_items("Parents", &ListQueryOptions::new().order_by("Title"))
        .await
        .expect("still cached");
    assert_eq!(server.count("GET", &items_path("Parents")), 1);
}

#[tokio::test]
async fn invalidate_item_keeps_list_entries() {
    let server = StubServer::start().await;
    server.route("GET", &items_path("Widgets"), 200, json!({"value": [{"Id": 42}]}));
    server.route("GET", &item_path("Widgets", 42), 200, json!({"Id": 42}));
    let service = ListService::new(common::config(&server.base_url(), json!({}))).expect("service");

    service.list_items("Widgets", &ListQueryOptions::new()).await.expect("list");
    service.list_item("Widgets", 42, &ListQueryOptions::new()).await.expect("item");
    assert_eq!(service.invalidate_item("Widgets", 42), 1);

    service.list_items("Widgets", &ListQueryOptions::new()).await.expect("list hit");
    service.list_item("Widgets", 42, &ListQueryOptions::new()).await.expect("item reload");
    assert_eq!(server.count("GET", &items_path("Widgets")), 1);
    assert_eq!(server.count("GET", &item_path("Widgets", 42)), 2);

    assert_eq!(service.invalidate("Widgets"), 1);
    service.list_items("Widgets", &ListQueryOptions::new()).await.expect("list reload");
    assert_eq!(server.count("GET", &items_path("Widgets")), 2);
}

#[tokio::test]
async fn clear_reloads_everything() {
    let server = StubServer::start().await;
    let service = preloaded(&server).await;

    let summary = service.clear().await.expect("clear");
    assert_eq!(summary.list_counts.len(), 2);
    assert_eq!(server.count("GET", &items_path("Parents")), 2);
    assert_eq!(server.count("GET", "/Web/siteusers"), 2);
    assert_eq!(service.requirements_for(1).len(), 2);
}

#[tokio::test]
async fn user_profile_defaults_to_current_user() {
    let server = StubServer::start().await;
    let service = preloaded(&server).await;
    let path = "/SP.UserProfiles.PeopleManager/GetPropertiesFor(accountName=@v)";
    server.route("GET", path, 200, json!({"DisplayName": "Ada"}));

    let profile = service.user_profile(None).await.expect("profile");
    assert_eq!(profile.get_str("DisplayName"), Some("Ada"));
    assert_eq!(
        server.last("GET", path).and_then(|r| r.query.get("@v").cloned()),
        Some("'i:0#.f|membership|ada@example.com'".to_string())
    );
    // The current user came from the cache, not a second request.
    assert_eq!(server.count("GET", "/Web/currentuser"), 1);
}

#[tokio::test]
async fn offline_mode_reads_snapshots_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let write = |name: &str, body: serde_json::Value| {
        std::fs::write(dir.path().join(name), body.to_string()).expect("write");
    };
    write("digest.json", json!({"digest": "OFFLINE"}));
    write("me.json", json!({"d": {"Id": 7, "Title": "Ada"}}));
    write("users.json", json!({"value": [{"Id": 7, "Title": "Ada"}]}));
    write("parents.json", json!({"value": [{"Id": 1}]}));
    write("requirements.json", json!({"value": [{"Id": 10, "ParentId": 1}]}));

    let mut config = listcache_core::AppConfig::from_json_str(
        &json!({
            "apiEndpoint": "",
            "useFallbackData": true,
            "digestFallbackFile": "digest.json",
            "lists": {
                "parents": {"name": "Parents", "fallbackFile": "parents.json"},
                "requirements": {"name": "Requirements", "fallbackFile": "requirements.json"}
            },
            "users": {
                "currentUser": {"endpoint": "Web/currentuser", "fallbackFile": "me.json"},
                "siteUsers": {"endpoint": "Web/siteusers", "fallbackFile": "users.json"}
            },
            "relationships": {"parentList": "parents", "requirementList": "requirements"}
        })
        .to_string(),
    )
    .expect("config");
    config.fallback_root = Some(dir.path().to_path_buf());

    let service = ListService::new(config).expect("service");
    let summary = service.preload().await.expect("offline preload");
    assert_eq!(summary.current_user.as_deref(), Some("Ada"));
    assert_eq!(service.requirements_for(1).len(), 1);
    assert_eq!(service.get_credential().await.expect("digest"), "OFFLINE");
}
