//! Detach, drop, and one-shot mode: every handle released, no writes after
//! the binder stops.

use std::sync::Arc;

use serde_json::json;

use livebind::{list, single, BindMode, Binder, BinderOptions, DocRef, FilterQuery, QueryMap};

use super::common::{props, CountingStore, LeakyStore};

fn seeded(store: &livebind::MemoryStore) {
    store.seed(
        "users",
        [
            ("a", json!({ "firstName": "Ann" })),
            ("b", json!({ "firstName": "Bo" })),
            ("c", json!({ "firstName": "Cy" })),
        ],
    );
}

#[tokio::test]
async fn detach_disposes_every_listener() {
    let store = Arc::new(CountingStore::new());
    seeded(&store.inner);
    let binder = Binder::new(store.clone(), |_, _, _| {
        QueryMap::from([
            ("profile".to_string(), single(DocRef::new("users", "a"))),
            (
                "friends".to_string(),
                list([
                    DocRef::new("users", "b").into(),
                    DocRef::new("users", "c").into(),
                ]),
            ),
            (
                "everyone".to_string(),
                single(FilterQuery::collection("users")),
            ),
        ])
    });

    binder.attach(livebind::Props::new()).await;
    assert_eq!(store.installs(), 4);
    assert_eq!(store.inner.listener_count(), 4);

    binder.detach();

    assert_eq!(store.disposals(), 4);
    assert_eq!(store.inner.listener_count(), 0);
}

#[tokio::test]
async fn detach_is_idempotent() {
    let store = Arc::new(CountingStore::new());
    seeded(&store.inner);
    let binder = Binder::new(store.clone(), |_, _, _| {
        QueryMap::from([("profile".to_string(), single(DocRef::new("users", "a")))])
    });

    binder.attach(livebind::Props::new()).await;
    binder.detach();
    binder.detach();

    assert_eq!(store.disposals(), 1);
}

#[tokio::test]
async fn drop_detaches() {
    let store = Arc::new(CountingStore::new());
    seeded(&store.inner);
    {
        let binder = Binder::new(store.clone(), |_, _, _| {
            QueryMap::from([("profile".to_string(), single(DocRef::new("users", "a")))])
        });
        binder.attach(livebind::Props::new()).await;
        assert_eq!(store.inner.listener_count(), 1);
    }

    assert_eq!(store.inner.listener_count(), 0);
    assert_eq!(store.disposals(), 1);
}

#[tokio::test]
async fn installs_and_disposals_balance_across_refreshes() {
    let store = Arc::new(CountingStore::new());
    seeded(&store.inner);
    let binder = Binder::new(store.clone(), |_, props, _| {
        let id = props["friendId"].as_str().unwrap_or_default().to_string();
        QueryMap::from([("friend".to_string(), single(DocRef::new("users", id)))])
    });

    binder.attach(props(json!({ "friendId": "a" }))).await;
    for id in ["b", "c", "a", "b"] {
        binder.notify_props_changed(props(json!({ "friendId": id }))).await;
    }
    binder.detach();

    assert_eq!(store.installs(), 5);
    assert_eq!(store.disposals(), 5);
    assert_eq!(store.inner.listener_count(), 0);
}

#[tokio::test]
async fn no_cache_writes_after_detach() {
    let store = Arc::new(LeakyStore::new());
    seeded(&store.inner);
    let binder = Binder::new(store.clone(), |_, _, _| {
        QueryMap::from([("profile".to_string(), single(DocRef::new("users", "a")))])
    });

    binder.attach(livebind::Props::new()).await;
    assert_eq!(
        binder.results()["profile"],
        json!({ "id": "a", "firstName": "Ann" })
    );

    binder.detach();

    // The leaked listener still fires, but the write must be dropped.
    store
        .inner
        .put("users", "a", json!({ "firstName": "Annabel" }));

    assert_eq!(
        binder.results()["profile"],
        json!({ "id": "a", "firstName": "Ann" })
    );
}

#[tokio::test]
async fn superseded_listener_cannot_write_stale_data() {
    let store = Arc::new(LeakyStore::new());
    seeded(&store.inner);
    let binder = Binder::new(store.clone(), |_, props, _| {
        let id = props["friendId"].as_str().unwrap_or_default().to_string();
        QueryMap::from([("friend".to_string(), single(DocRef::new("users", id)))])
    });

    binder.attach(props(json!({ "friendId": "a" }))).await;
    binder.notify_props_changed(props(json!({ "friendId": "b" }))).await;

    // The listener for "a" was never actually torn down. Its next firing
    // carries a stale slot generation and must not clobber "b".
    store
        .inner
        .put("users", "a", json!({ "firstName": "Annabel" }));

    assert_eq!(
        binder.results()["friend"],
        json!({ "id": "b", "firstName": "Bo" })
    );
}

#[tokio::test]
async fn once_mode_fetches_without_listeners() {
    let store = Arc::new(CountingStore::new());
    seeded(&store.inner);
    let binder = Binder::with_options(
        store.clone(),
        |_, _, _| {
            QueryMap::from([
                ("profile".to_string(), single(DocRef::new("users", "a"))),
                (
                    "friends".to_string(),
                    list([
                        DocRef::new("users", "b").into(),
                        DocRef::new("users", "c").into(),
                    ]),
                ),
            ])
        },
        BinderOptions {
            mode: BindMode::Once,
            ..Default::default()
        },
    );

    binder.attach(livebind::Props::new()).await;

    assert_eq!(store.installs(), 0);
    assert_eq!(store.inner.listener_count(), 0);
    assert_eq!(
        binder.results()["profile"],
        json!({ "id": "a", "firstName": "Ann" })
    );
    assert_eq!(
        binder.results()["friends"],
        json!([
            { "id": "b", "firstName": "Bo" },
            { "id": "c", "firstName": "Cy" },
        ])
    );
}

#[tokio::test]
async fn once_mode_results_are_static() {
    let store = Arc::new(livebind::MemoryStore::new());
    seeded(&store);
    let binder = Binder::with_options(
        store.clone(),
        |_, _, _| {
            QueryMap::from([("profile".to_string(), single(DocRef::new("users", "a")))])
        },
        BinderOptions {
            mode: BindMode::Once,
            ..Default::default()
        },
    );

    binder.attach(livebind::Props::new()).await;
    store.put("users", "a", json!({ "firstName": "Annabel" }));

    assert_eq!(
        binder.results()["profile"],
        json!({ "id": "a", "firstName": "Ann" })
    );
}
