//! End-to-end behaviour of the request pipeline, driven through `App::handle`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Method, StatusCode};
use rota::middleware::method_override;
use rota::store::{FieldKind, MemoryStore, Schema};
use rota::{App, Chain, FailedRequest, Failure, Next, Outcome, Request, Response, Router, resource};
use serde_json::{Value, json};

fn items_app() -> App {
    let items = Arc::new(MemoryStore::new("items", Schema::new().required("name", FieldKind::String)));
    App::new(resource::mount(Router::new(), "/items", items)).layer(method_override)
}

fn get(path: &str) -> Request {
    Request::builder(Method::GET, path).build()
}

#[tokio::test]
async fn create_show_and_miss() {
    let app = items_app();

    let created = app.handle(Request::builder(Method::POST, "/items").json(&json!({"name": "x"})).build()).await;
    assert_eq!(created.status_code(), StatusCode::FOUND);
    let record: Value = serde_json::from_slice(created.body()).unwrap();
    let id = record["id"].as_str().unwrap();

    let shown = app.handle(get(&format!("/items/{id}"))).await;
    assert_eq!(shown.status_code(), StatusCode::OK);
    let shown: Value = serde_json::from_slice(shown.body()).unwrap();
    assert_eq!(shown["name"], "x");

    let missing = app.handle(get("/items/does-not-exist")).await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn html_forms_delete_through_method_override() {
    let app = items_app();
    let created = app.handle(Request::builder(Method::POST, "/items")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("name=Bike")
        .build()).await;
    let location = created.header("location").unwrap().to_owned();

    let deleted = app.handle(Request::builder(Method::POST, &format!("{location}?_method=DELETE")).build()).await;
    assert_eq!(deleted.status_code(), StatusCode::FOUND);
    assert_eq!(deleted.header("location"), Some("/items"));
    assert_eq!(app.handle(get(&location)).await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unmatched_path_reaches_the_reporter_once() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let app = items_app().reporter(move |failure: &Failure, req: &FailedRequest| {
        seen.lock().unwrap().push((failure.status(), req.path.clone()));
        Response::text("I don't know that path!")
    });

    let res = app.handle(get("/nowhere")).await;
    assert_eq!(res.text_body(), "I don't know that path!");
    assert_eq!(*reports.lock().unwrap(), [(StatusCode::NOT_FOUND, "/nowhere".to_owned())]);
}

#[tokio::test]
async fn short_circuit_skips_later_layers() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));

    let app = App::new(Router::new().get("/", |_req: Request| async { "handler" }))
        .layer(move |req: Request, next: Next| {
            let a = Arc::clone(&a);
            async move {
                a.lock().unwrap().push("A");
                next.run(req).await
            }
        })
        .layer(move |_req: Request, _next: Next| {
            let b = Arc::clone(&b);
            async move {
                b.lock().unwrap().push("B");
                Ok::<_, Failure>(Response::text("from B"))
            }
        })
        .layer(move |req: Request, next: Next| {
            let c = Arc::clone(&c);
            async move {
                c.lock().unwrap().push("C");
                next.run(req).await
            }
        });

    let res = app.handle(get("/")).await;
    assert_eq!(res.text_body(), "from B");
    assert_eq!(*order.lock().unwrap(), ["A", "B"]);
}

#[tokio::test]
async fn failure_after_suspension_is_reported_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let app = App::new(Router::new()
        .get("/slow-error", |_req: Request| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err::<Response, _>(Failure::validation("bad things"))
        })
        .get("/slow-panic", |_req: Request| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if true {
                panic!("boom");
            }
            "unreachable"
        }))
        .reporter(move |failure: &Failure, _req: &FailedRequest| {
            seen.lock().unwrap().push(failure.clone());
            Response::builder().status(failure.status()).text(failure.message())
        });

    let res = app.handle(get("/slow-error")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text_body(), "bad things");

    let res = app.handle(get("/slow-panic")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text_body(), "Something went wrong");

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], Failure::validation("bad things"));
    assert_eq!(calls[1], Failure::default());
}

#[tokio::test]
async fn first_registered_route_wins() {
    let app = App::new(Router::new()
        .get("/comments/new", |_req: Request| async { "new form" })
        .get("/comments/:id", |req: Request| async move {
            format!("comment {}", req.param("id").unwrap_or_default())
        }));

    assert_eq!(app.handle(get("/comments/new")).await.text_body(), "new form");
    assert_eq!(app.handle(get("/comments/7")).await.text_body(), "comment 7");
}

#[tokio::test]
async fn guards_and_scoped_layers() {
    async fn verify(req: Request, next: Next) -> Outcome {
        match req.query("password") {
            Some("chickennugget") => next.run(req).await,
            _ => Err(Failure::unauthorized("Password required!")),
        }
    }

    let app = App::new(Router::new()
        .get("/dogs", |_req: Request| async { "WOOF" })
        .guarded(Method::GET, "/secret", Chain::new().with(verify), |_req: Request| async { "my secret" })
        .get("/admin/panel", |_req: Request| async { "panel" }))
        .layer_at("/admin", |_req: Request, _next: Next| async {
            Err::<Response, _>(Failure::forbidden("admins only"))
        });

    assert_eq!(app.handle(get("/dogs")).await.text_body(), "WOOF");
    assert_eq!(app.handle(get("/secret")).await.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.handle(get("/secret?password=chickennugget")).await.text_body(), "my secret");
    assert_eq!(app.handle(get("/admin/panel")).await.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(app.handle(get("/administrator")).await.status_code(), StatusCode::NOT_FOUND);
}
