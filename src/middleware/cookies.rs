//! `Cookie` header parsing.

use std::collections::HashMap;

use http::header::COOKIE;

use super::Next;
use crate::handler::Outcome;
use crate::request::Request;

/// Cookies sent with the request, keyed by name.
///
/// Inserted into the request extensions by the [`cookies`] middleware:
///
/// ```rust
/// use rota::Request;
/// use rota::middleware::Cookies;
///
/// async fn greet(req: Request) -> String {
///     let name = req.extension::<Cookies>()
///         .and_then(|c| c.get("name"))
///         .unwrap_or("anon");
///     format!("Hey there, {name}")
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Cookies(HashMap<String, String>);

impl Cookies {
    /// Parses every `Cookie` header on the request. Later duplicates win.
    pub fn from_request(req: &Request) -> Self {
        let mut jar = HashMap::new();
        for value in req.headers().get_all(COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            for pair in raw.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    jar.insert(name.trim().to_owned(), value.trim().trim_matches('"').to_owned());
                }
            }
        }
        Self(jar)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses the request's cookies into a [`Cookies`] extension and forwards.
pub async fn cookies(mut req: Request, next: Next) -> Outcome {
    if req.extension::<Cookies>().is_none() {
        let jar = Cookies::from_request(&req);
        req.extensions_mut().insert(jar);
    }
    next.run(req).await
}
