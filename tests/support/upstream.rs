//! Scripted mock of the upstream GraphQL endpoint.
//!
//! Reads the page number from the batched request body and answers with a
//! page payload that carries the configured page count. Per-page scripts make
//! the first N requests for a page fail with a given status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const GRAPH_PATH: &str = "/graph";
pub const CSRF: &str = "csrf-test-token";
pub const COOKIE: &str = "gdId=abc; session=xyz";

#[derive(Debug, Default)]
struct Script {
    status: u16,
    body: Option<&'static str>,
    remaining: u32,
}

/// Upstream state shared between the mock and the test.
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    total_pages: u32,
    scripts: Mutex<HashMap<u32, Script>>,
    hits: Mutex<HashMap<u32, u32>>,
    probes: Mutex<u32>,
}

impl ScriptedUpstream {
    pub fn new(total_pages: u32) -> Arc<Self> {
        Arc::new(Self {
            total_pages,
            ..Self::default()
        })
    }

    /// The first `times` requests for `page` answer with `status`.
    pub fn fail_page(self: &Arc<Self>, page: u32, status: u16, times: u32) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(
            page,
            Script {
                status,
                body: None,
                remaining: times,
            },
        );
        Arc::clone(self)
    }

    /// The first `times` requests for `page` answer 200 with an HTML body.
    pub fn html_page(self: &Arc<Self>, page: u32, times: u32) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(
            page,
            Script {
                status: 200,
                body: Some("<html><body>Help us protect Glassdoor</body></html>"),
                remaining: times,
            },
        );
        Arc::clone(self)
    }

    /// Requests seen for `page`, including discovery for page 1.
    pub fn hits(&self, page: u32) -> u32 {
        self.hits.lock().unwrap().get(&page).copied().unwrap_or(0)
    }

    /// Probe (view-signal only) requests seen.
    pub fn probes(&self) -> u32 {
        *self.probes.lock().unwrap()
    }

    /// Mounts the scripted responder on `server`, requiring the test credentials.
    pub async fn mount(self: &Arc<Self>, server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .and(header("gd-csrf-token", CSRF))
            .and(header("cookie", COOKIE))
            .respond_with(Responder(Arc::clone(self)))
            .mount(server)
            .await;
    }

    fn page_body(&self, page: u32) -> Value {
        json!([
            { "data": { "recordPageView": { "pageViewId": "v" } } },
            {
                "data": {
                    "employerReviews": {
                        "numberOfPages": self.total_pages,
                        "currentPage": page,
                        "reviews": [{ "reviewId": page }],
                    }
                }
            }
        ])
    }
}

struct Responder(Arc<ScriptedUpstream>);

impl Respond for Responder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(batch) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        let upstream = &self.0;

        let Some(page) = batch
            .pointer("/1/variables/page")
            .and_then(Value::as_u64)
            .and_then(|page| u32::try_from(page).ok())
        else {
            *upstream.probes.lock().unwrap() += 1;
            return ResponseTemplate::new(200).set_body_json(json!([{ "data": {} }]));
        };

        *upstream.hits.lock().unwrap().entry(page).or_insert(0) += 1;

        let mut scripts = upstream.scripts.lock().unwrap();
        if let Some(script) = scripts.get_mut(&page) {
            if script.remaining > 0 {
                script.remaining -= 1;
                let template = ResponseTemplate::new(script.status);
                return match script.body {
                    Some(body) => template.set_body_string(body),
                    None => template,
                };
            }
        }
        drop(scripts);

        ResponseTemplate::new(200).set_body_json(upstream.page_body(page))
    }
}

/// Endpoint URL on `server`.
pub fn endpoint(server: &MockServer) -> String {
    format!("{}{GRAPH_PATH}", server.uri())
}
