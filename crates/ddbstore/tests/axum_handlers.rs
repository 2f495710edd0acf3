//! The store driven from axum handlers, the way an application wires it.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt as _;

use ddbstore::backend::MemoryBackend;
use ddbstore::{DdbStore, KeyPair, SessionStore, StoreConfig};

const SESSION: &str = "visits";

async fn count_visits(State(store): State<Arc<DdbStore>>, headers: HeaderMap) -> impl IntoResponse {
    let mut session = match store.new_session(&headers, SESSION).await {
        Ok(s) => s,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), String::new()),
    };
    let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
    session.insert("visits", visits);

    let mut out = HeaderMap::new();
    if store.save(&mut out, &mut session).await.is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), String::new());
    }
    (StatusCode::OK, out, visits.to_string())
}

async fn logout(State(store): State<Arc<DdbStore>>, headers: HeaderMap) -> impl IntoResponse {
    let mut out = HeaderMap::new();
    let result = async {
        let mut session = store.new_session(&headers, SESSION).await?;
        session.expire();
        store.save(&mut out, &mut session).await
    }
    .await;
    match result {
        Ok(()) => (StatusCode::NO_CONTENT, out),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new()),
    }
}

async fn app() -> (Arc<MemoryBackend>, Router) {
    let backend = Arc::new(MemoryBackend::new());
    let mut config = StoreConfig::default();
    config.provision.initial_backoff_ms = 1;
    config.key_pairs = vec![ddbstore::config::KeyPairConfig {
        authentication_key: "00112233445566778899aabbccddeeff".into(),
        encryption_key: Some("ffeeddccbbaa99887766554433221100".into()),
    }];
    let store = DdbStore::open(backend.clone(), &config).await.unwrap();

    let router = Router::new()
        .route("/", get(count_visits))
        .route("/logout", post(logout))
        .with_state(Arc::new(store));
    (backend, router)
}

fn cookie_from(res: &axum::response::Response) -> String {
    let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    let cookie = cookie::Cookie::parse(set_cookie).unwrap();
    format!("{}={}", cookie.name(), cookie.value())
}

async fn body_text(res: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_visit_counter_survives_requests() {
    let (backend, app) = app().await;

    let res = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = cookie_from(&res);
    assert_eq!(body_text(res).await, "1");

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_text(res).await, "2");
    assert_eq!(backend.item_count("session-table"), 1);
}

#[tokio::test]
async fn test_logout_drops_session() {
    let (backend, app) = app().await;

    let res = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = cookie_from(&res);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));
    assert_eq!(backend.item_count("session-table"), 0);

    // The old cookie now starts over.
    let res = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_text(res).await, "1");
}

#[tokio::test]
async fn test_generated_keys_work_end_to_end() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DdbStore::new(
        backend,
        "generated",
        &[KeyPair::generate()],
        &ddbstore::provision::ProvisionPolicy {
            initial_backoff_ms: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mut out = HeaderMap::new();
    let mut session = store.new_session(&HeaderMap::new(), SESSION).await.unwrap();
    session.insert("visits", 1);
    store.save(&mut out, &mut session).await.unwrap();
    assert!(out.get(header::SET_COOKIE).is_some());
}
