//! End-to-end behavior through the full dispatch pipeline: default
//! middleware stack, routing, argument binding, and the response envelope.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use arbor::{
    App, ApiResponse, Method, StatusCode,
    body::ArborBody,
    config::AppConfig,
    errors::ApiError,
    extractors::{
        json::Json,
        params::{Params, PathValue},
    },
    limiter::TokenBucket,
    plugins::rate_limit::RateLimitPlugin,
    queue::{TaskOptions, TaskStatus},
    response::success_response,
    router::Router,
    types::{Request, Response},
};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::{Value, json};

fn get(path: &str) -> Request {
    hyper::Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(ArborBody::empty())
        .unwrap()
}

fn post_json(path: &str, body: &str) -> Request {
    hyper::Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .body(ArborBody::from(body.to_string()))
        .unwrap()
}

async fn body_env(res: Response) -> ApiResponse<Value> {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    ApiResponse::from_json(&bytes).unwrap()
}

#[tokio::test]
async fn static_route_and_route_cache() {
    let app = App::default();
    app.router().route(Method::GET, "/health", || async {
        ApiResponse::<Value>::new(200, "ok", None)
    });

    let res = app.dispatch(get("/health")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[http::header::CONTENT_TYPE],
        "application/json; charset=utf-8"
    );
    let env = body_env(res).await;
    assert_eq!(env.code, 200);
    assert_eq!(env.message, "ok");
    assert_eq!(env.data, None);

    // The second identical request resolves from the route cache.
    app.dispatch(get("/health")).await;
    let stats = app.router().route_cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);

    app.shutdown().await;
}

#[derive(Deserialize)]
struct UserParams {
    id: PathValue,
}

#[tokio::test]
async fn parameter_capture_with_scalar_coercion() {
    let app = App::default();
    app.router().route(
        Method::GET,
        "/users/{id}",
        |Params(params): Params<UserParams>| async move {
            success_response(json!({ "id": params.id }))
        },
    );

    // A numeric segment reaches the handler as the coerced integer.
    let res = app.dispatch(get("/users/42")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let env = body_env(res).await;
    assert_eq!(env.data.unwrap()["id"], json!(42));

    // A segment that does not coerce still reaches the handler, as the
    // raw string, and the request succeeds.
    let res = app.dispatch(get("/users/abc")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let env = body_env(res).await;
    assert_eq!(env.data.unwrap()["id"], json!("abc"));

    app.shutdown().await;
}

#[tokio::test]
async fn literal_route_beats_parameterized() {
    let app = App::default();
    app.router().route(
        Method::GET,
        "/users/{id}",
        |Params(params): Params<HashMap<String, Value>>| async move {
            success_response(json!({ "matched": "param", "id": params["id"] }))
        },
    );
    app.router().route(Method::GET, "/users/me", || async {
        success_response(json!({ "matched": "literal" }))
    });

    let env = body_env(app.dispatch(get("/users/me")).await).await;
    assert_eq!(env.data.unwrap()["matched"], "literal");

    let env = body_env(app.dispatch(get("/users/7")).await).await;
    let data = env.data.unwrap();
    assert_eq!(data["matched"], "param");
    assert_eq!(data["id"], json!(7));

    app.shutdown().await;
}

#[tokio::test]
async fn rate_limited_requests_receive_429_until_refill() {
    // capacity 2, refill 1 token/s
    let router = Router::new();
    router.plugin(RateLimitPlugin::new(Arc::new(TokenBucket::new(2, 1.0))));
    router.setup_plugins_once();
    router.route(Method::GET, "/ping", || async { success_response(json!("pong")) });

    assert_eq!(router.dispatch(get("/ping")).await.status(), StatusCode::OK);
    assert_eq!(router.dispatch(get("/ping")).await.status(), StatusCode::OK);

    let res = router.dispatch(get("/ping")).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let env = body_env(res).await;
    assert_eq!(env.code, 429);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(router.dispatch(get("/ping")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn circuit_breaker_opens_then_recovers_through_probe() {
    let mut config = AppConfig::default();
    config.breaker.failure_threshold = 3;
    config.breaker.reset_timeout_seconds = 2;
    let app = App::new(config);

    let calls = Arc::new(AtomicU32::new(0));
    let handler_calls = calls.clone();
    app.router().route(Method::GET, "/flaky", move || {
        let calls = handler_calls.clone();
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(ApiError::handler(500, "upstream exploded"))
            } else {
                Ok(success_response(json!("recovered")))
            }
        }
    });

    for _ in 0..3 {
        let res = app.dispatch(get("/flaky")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // Open circuit rejects without reaching the handler.
    let res = app.dispatch(get("/flaky")).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_env(res).await.code, 503);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // After the reset timeout one probe is admitted; it succeeds and the
    // circuit closes.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let res = app.dispatch(get("/flaky")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.dispatch(get("/flaky")).await;
    assert_eq!(res.status(), StatusCode::OK);

    app.shutdown().await;
}

#[tokio::test]
async fn background_task_retries_then_completes() {
    let app = App::default();
    app.startup().await.unwrap();
    let ctx = app.context();

    let attempts = Arc::new(AtomicU32::new(0));
    let callback_results = Arc::new(parking_lot::Mutex::new(Vec::<Value>::new()));

    let task_attempts = attempts.clone();
    let results = callback_results.clone();
    let id = ctx.queue.add_task(
        move |_token| {
            let attempts = task_attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("not yet");
                }
                Ok(json!("finished"))
            }
        },
        TaskOptions::new()
            .max_retries(3)
            .retry_delay(Duration::ZERO)
            .callback(move |result| {
                let results = results.clone();
                async move {
                    results.lock().push(result);
                }
            }),
    );

    let snapshot = ctx.queue.wait_for(&id, Duration::from_secs(2)).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(snapshot.retry_count, 2);
    assert_eq!(snapshot.result, Some(json!("finished")));

    let results = callback_results.lock().clone();
    assert_eq!(results, vec![json!("finished")]);

    app.shutdown().await;
}

#[derive(Debug, Deserialize)]
struct CreateUser {
    name: String,
    age: u32,
}

#[tokio::test]
async fn json_body_binds_model_and_rejects_invalid() {
    let app = App::default();
    app.router().route_with_methods(
        &[Method::POST],
        "/users",
        |Json(user): Json<CreateUser>| async move {
            success_response(json!({ "name": user.name, "age": user.age }))
        },
    );

    let res = app
        .dispatch(post_json("/users", r#"{"name":"ada","age":36}"#))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let env = body_env(res).await;
    assert_eq!(env.data.unwrap()["name"], "ada");

    let res = app.dispatch(post_json("/users", r#"{"name":"ada"}"#)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let env = body_env(res).await;
    assert_eq!(env.code, 400);

    app.shutdown().await;
}

#[tokio::test]
async fn wildcard_route_captures_remainder() {
    let app = App::default();
    app.router().route(
        Method::GET,
        "/static/*path",
        |Params(params): Params<HashMap<String, Value>>| async move {
            success_response(json!({ "path": params["path"] }))
        },
    );

    let env = body_env(app.dispatch(get("/static/css/site.css")).await).await;
    assert_eq!(env.data.unwrap()["path"], "css/site.css");

    app.shutdown().await;
}
