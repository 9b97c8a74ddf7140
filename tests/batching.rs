//! Batch windows and rate limiting through the registry.

mod common;

use api_query::transport::Response;
use api_query::{BatchPolicy, FnBatchPolicy, Method, OrchestratorConfig, QueryStatus, Registry};
use common::{shared, ScriptedTransport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// `{"id": n}` inputs are batched into `{"ids": [..]}`; the endpoint answers
/// 200 with one object per id and flags id 13 with an `error` field.
fn id_policy() -> Arc<dyn BatchPolicy> {
    Arc::new(FnBatchPolicy::new(
        |input: &Value| input.get("id").map(|_| "by-id".to_string()),
        |inputs: &[Value]| json!({ "ids": inputs.iter().map(|i| i["id"].clone()).collect::<Vec<_>>() }),
        |_inputs: &[Value], response: Response| {
            let items: Vec<Value> = response.json().unwrap_or_default();
            items
                .into_iter()
                .map(|item| {
                    let found = item.get("error").is_none();
                    Response::from_json(200, &item).unwrap().with_ok(found)
                })
                .collect()
        },
    ))
}

fn items_transport() -> ScriptedTransport {
    ScriptedTransport::new(|_, _, input| match input.get("ids") {
        Some(Value::Array(ids)) => {
            let items: Vec<Value> = ids
                .iter()
                .map(|id| match id.as_i64() {
                    Some(13) => json!({ "id": id, "error": "not found" }),
                    _ => json!({ "id": id, "name": format!("item-{id}") }),
                })
                .collect();
            Response::from_json(200, &items)
        }
        _ => Response::from_json(200, &json!({ "single": input })),
    })
}

fn registry(transport: Arc<ScriptedTransport>) -> Registry {
    Registry::builder()
        .transport(transport)
        .batch_policy("/items", Method::GET, id_policy())
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn inputs_in_one_window_share_a_call() {
    let transport = shared(items_transport());
    let registry = registry(transport.clone());
    let a = registry.query("/items", Method::GET, &json!({"id": 1})).unwrap();
    let b = registry.query("/items", Method::GET, &json!({"id": 2})).unwrap();

    let (ra, rb) = tokio::join!(a.request(), b.request());
    ra.unwrap();
    rb.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.inputs(), vec![json!({"ids": [1, 2]})]);
    assert_eq!(a.data(), Some(json!({"id": 1, "name": "item-1"})));
    assert_eq!(b.data(), Some(json!({"id": 2, "name": "item-2"})));
}

#[tokio::test(start_paused = true)]
async fn failed_item_only_affects_its_own_query() {
    let transport = shared(items_transport());
    let registry = registry(transport.clone());
    let good = registry.query("/items", Method::GET, &json!({"id": 5})).unwrap();
    let bad = registry.query("/items", Method::GET, &json!({"id": 13})).unwrap();

    let (rg, rb) = tokio::join!(good.request(), bad.request());
    assert!(rg.unwrap().ok);
    let rb = rb.unwrap();
    assert!(!rb.ok);
    assert_eq!(rb.status, 200);

    assert_eq!(good.status(), QueryStatus::Success);
    assert_eq!(bad.status(), QueryStatus::Error);
    assert_eq!(bad.error_data(), Some(json!({"id": 13, "error": "not found"})));
    // The failed item is cached like any other response.
    assert!(bad.is_cached());
}

#[tokio::test(start_paused = true)]
async fn unbatchable_input_is_sent_alone() {
    let transport = shared(items_transport());
    let registry = registry(transport.clone());
    let q = registry.query("/items", Method::GET, &json!({"tag": "x"})).unwrap();

    q.request().await.unwrap();
    assert_eq!(transport.inputs(), vec![json!({"tag": "x"})]);
    assert_eq!(q.data(), Some(json!({"single": {"tag": "x"}})));
}

#[tokio::test(start_paused = true)]
async fn flushed_window_is_not_reused() {
    let transport = shared(items_transport());
    let registry = registry(transport.clone());
    let a = registry.query("/items", Method::GET, &json!({"id": 1})).unwrap();
    let b = registry.query("/items", Method::GET, &json!({"id": 2})).unwrap();

    a.request().await.unwrap();
    b.request().await.unwrap();

    assert_eq!(transport.inputs(), vec![json!({"ids": [1]}), json!({"ids": [2]})]);
}

#[tokio::test(start_paused = true)]
async fn burst_never_exceeds_max_concurrent() {
    let transport = shared(ScriptedTransport::echo().with_delay(Duration::from_millis(50)));
    let registry = Registry::builder()
        .transport(transport.clone())
        .config(
            OrchestratorConfig::default()
                .with_max_concurrent(3)
                .with_min_time(Duration::ZERO),
        )
        .build()
        .unwrap();

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let q = registry.query("/users", Method::GET, &json!({"id": i})).unwrap();
            tokio::spawn(async move { q.request().await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(transport.call_count(), 12);
    assert_eq!(transport.max_in_flight(), 3);
    assert_eq!(registry.dispatcher_count(), 1);
    assert_eq!(registry.query_count(), 12);
}

#[tokio::test(start_paused = true)]
async fn dispatches_are_spaced_by_min_time() {
    let transport = shared(ScriptedTransport::echo());
    let registry = Registry::builder()
        .transport(transport.clone())
        .config(
            OrchestratorConfig::default()
                .with_max_concurrent(10)
                .with_min_time(Duration::from_millis(100)),
        )
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    let queries: Vec<_> = (0..4)
        .map(|i| registry.query("/users", Method::GET, &json!({"id": i})).unwrap())
        .collect();
    futures::future::join_all(queries.iter().map(|q| q.request())).await;

    assert_eq!(transport.call_count(), 4);
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn flush_all_releases_an_open_window() {
    use api_query::{Dispatcher, DispatcherConfig, Endpoint};
    use tokio_test::{assert_pending, assert_ready_ok, task};

    let transport = shared(items_transport());
    let dispatcher = Arc::new(Dispatcher::new(
        Endpoint::new("/items", Method::GET),
        transport.clone(),
        Some(id_policy()),
        DispatcherConfig::new().with_batch_delay(Duration::from_secs(60)),
    ));

    let mut first = task::spawn(dispatcher.request(json!({"id": 1})));
    let mut second = task::spawn(dispatcher.request(json!({"id": 2})));
    assert_pending!(first.poll());
    assert_pending!(second.poll());
    assert_eq!(dispatcher.pending_batched(), 2);
    assert_eq!(transport.call_count(), 0);

    dispatcher.flush_all().await;

    assert!(first.is_woken());
    let a = assert_ready_ok!(first.poll());
    let b = assert_ready_ok!(second.poll());
    assert_eq!(a.json::<Value>().unwrap()["id"], 1);
    assert_eq!(b.json::<Value>().unwrap()["id"], 2);
    assert_eq!(transport.inputs(), vec![json!({"ids": [1, 2]})]);
    assert_eq!(dispatcher.pending_batched(), 0);
}
