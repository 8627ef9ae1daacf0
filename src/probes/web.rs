//! HTTP probe

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, redirect};
use tracing::{instrument, trace};

use crate::config::{CheckDefinition, CheckKind, HttpMethod};

use super::{ProbeExecutor, ProbeResult};

/// Sends one HTTP request per probe
///
/// Clients are reused across probes. Redirect limit and certificate checking are
/// client settings, so one client is kept per combination in use.
pub struct WebProbe {
    timeout: Duration,
    clients: Mutex<HashMap<(usize, bool), Client>>,
}

impl WebProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, redirects: usize, insecure: bool) -> reqwest::Result<Client> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&(redirects, insecure)) {
            return Ok(client.clone());
        }

        let policy = if redirects == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(redirects)
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .redirect(policy)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        clients.insert((redirects, insecure), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl ProbeExecutor for WebProbe {
    #[instrument(skip_all, fields(check_id = %check.id))]
    async fn execute(&self, check: &CheckDefinition) -> ProbeResult {
        let start = Instant::now();

        let CheckKind::Web(target) = &check.kind else {
            return ProbeResult::failed(
                format!("web probe cannot run a {} check", check.kind.probe_kind()),
                start.elapsed(),
            );
        };

        let client = match self.client(target.redirects, target.insecure) {
            Ok(client) => client,
            Err(e) => return ProbeResult::failed(format!("failed to build HTTP client: {e}"), start.elapsed()),
        };

        let mut request = client.request(method(target.method), &target.url);
        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(params) = &target.params {
            match encode_body(params) {
                Ok((content_type, body)) => {
                    request = request.header(CONTENT_TYPE, content_type).body(body);
                }
                Err(e) => return ProbeResult::failed(e, start.elapsed()),
            }
        }

        trace!("sending {} {}", target.method.as_str(), target.url);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return ProbeResult::failed(e.to_string(), start.elapsed()),
        };

        let status_code = response.status().as_u16();
        let body = response.text().await;
        let elapsed = start.elapsed();

        match body {
            Ok(body) if body.is_empty() && target.method != HttpMethod::Head => ProbeResult {
                status_code,
                body,
                elapsed,
                error: Some("empty response body".to_string()),
            },
            Ok(body) => ProbeResult::ok(status_code, body, elapsed),
            Err(e) => ProbeResult {
                status_code,
                body: String::new(),
                elapsed,
                error: Some(format!("failed to read response body: {e}")),
            },
        }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

/// Pick the content type for a request body
///
/// JSON is sent as is, `a=b&c=d` as a url encoded form.
fn encode_body(params: &str) -> Result<(&'static str, String), String> {
    if serde_json::from_str::<serde_json::Value>(params).is_ok() {
        Ok(("application/json", params.to_string()))
    } else if params.contains('=') {
        Ok(("application/x-www-form-urlencoded", params.to_string()))
    } else {
        Err(format!("params are neither JSON nor a url encoded form: {params:?}"))
    }
}
