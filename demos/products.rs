//! Farm stand inventory: products and farms CRUD plus a login-guarded page.
//!
//! ```text
//! cargo run --example products
//! curl -i -d 'name=Ruby Grapefruit&price=1.99&category=fruit' localhost:3000/products
//! curl -s 'localhost:3000/products?category=fruit'
//! curl -i -d 'name=Full Belly Farms' localhost:3000/farms
//! curl -i -d 'name=Sugar Baby Watermelon' localhost:3000/farms/<farm id>/products
//! curl -s localhost:3000/farms/<farm id>
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use http::Method;
use rota::auth::{self, Bcrypt, PasswordHasher};
use rota::middleware::{cookies, method_override, trace};
use rota::session::{self, SessionStore};
use rota::store::{Database, FieldKind, MemoryStore, Schema, Store};
use rota::{App, Chain, Config, Failure, JsonReporter, Request, Response, Router, Server, health, resource};
use serde_json::Value;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    rota::telemetry::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("database connection failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let products = db.collection(
        "products",
        Schema::new()
            .required("name", FieldKind::String)
            .optional("price", FieldKind::Number)
            .optional("category", FieldKind::String)
            .optional("farm", FieldKind::Ref("farms")),
    );
    let farms = db.collection(
        "farms",
        Schema::new()
            .required("name", FieldKind::String)
            .optional("city", FieldKind::String)
            .optional("products", FieldKind::RefList("products")),
    );
    let users = db.collection(
        "users",
        Schema::new()
            .required("username", FieldKind::String)
            .required("password", FieldKind::String),
    );
    let hasher = Arc::new(Bcrypt::default());
    // Unknown usernames are checked against this so a miss costs as much as a wrong password.
    let decoy = match hasher.hash("decoy password").await {
        Ok(digest) => Arc::new(digest),
        Err(e) => {
            error!("password hasher unavailable: {e}");
            return ExitCode::FAILURE;
        }
    };

    let router = Router::new().get("/farms/:id", show_farm(Arc::clone(&db), farms.clone()));
    let router = resource::mount_children(router, "/farms", farms.clone(), "products", products.clone(), "farm");
    let router = resource::mount(router, "/farms", farms);
    let router = resource::mount(router, "/products", products)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness(Arc::clone(&db)))
        .post("/register", register(users.clone(), Arc::clone(&hasher)))
        .post("/login", login(users, hasher, decoy))
        .guarded(Method::GET, "/secret", Chain::new().with(auth::require_login), secret);

    let app = App::new(router)
        .layer(trace)
        .layer(method_override)
        .layer(cookies)
        .layer(session::sessions(Arc::new(SessionStore::new())))
        .reporter(JsonReporter);

    let served = match config.addr() {
        Ok(addr) => Server::bind(addr).body_limit(config.body_limit).serve(app).await,
        Err(e) => Err(e.into()),
    };
    db.close();

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn credentials(req: &Request) -> Result<(String, String), Failure> {
    let fields = req.fields()?;
    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_owned);
    match (text("username"), text("password")) {
        (Some(username), Some(password)) => Ok((username, password)),
        _ => Err(Failure::validation("username and password are required")),
    }
}

fn register(users: Arc<dyn Store>, hasher: Arc<Bcrypt>) -> impl rota::Handler {
    move |req: Request| {
        let (users, hasher) = (Arc::clone(&users), Arc::clone(&hasher));
        async move {
            let (username, password) = credentials(&req)?;
            let mut filter = serde_json::Map::new();
            filter.insert("username".into(), username.clone().into());
            if !users.find(&filter).await?.is_empty() {
                return Err(Failure::validation("username is taken"));
            }

            let mut fields = serde_json::Map::new();
            fields.insert("username".into(), username.into());
            fields.insert("password".into(), hasher.hash(&password).await?.into());
            let user = users.create(fields).await?;
            auth::login(session::current(&req)?, &user.id);
            Ok::<_, Failure>(Response::redirect("/secret"))
        }
    }
}

fn login(users: Arc<dyn Store>, hasher: Arc<Bcrypt>, decoy: Arc<String>) -> impl rota::Handler {
    move |req: Request| {
        let (users, hasher, decoy) = (Arc::clone(&users), Arc::clone(&hasher), Arc::clone(&decoy));
        async move {
            let (username, password) = credentials(&req)?;
            let mut filter = serde_json::Map::new();
            filter.insert("username".into(), username.into());
            let user = users.find(&filter).await?.into_iter().next();

            let digest = user.as_ref().and_then(|u| u.get("password")).and_then(Value::as_str);
            let verified = hasher.verify(&password, digest.unwrap_or(decoy.as_str())).await? && digest.is_some();
            let Some(user) = user.filter(|_| verified) else {
                return Err(Failure::unauthorized("Incorrect username or password"));
            };
            auth::login(session::current(&req)?, &user.id);
            Ok::<_, Failure>(Response::redirect("/secret"))
        }
    }
}

/// A farm with its product ids replaced by the products themselves.
fn show_farm(db: Arc<Database>, farms: Arc<MemoryStore>) -> impl rota::Handler {
    move |req: Request| {
        let (db, farms) = (Arc::clone(&db), Arc::clone(&farms));
        async move {
            let farm = farms.get(req.param("id").unwrap_or_default()).await?;
            let farm = db.populate(&farms, farm, "products").await?;
            Ok::<_, Failure>(rota::Json(farm))
        }
    }
}

async fn secret(req: Request) -> String {
    format!("THIS IS SECRET! user {}", auth::current_user(&req).unwrap_or_default())
}
