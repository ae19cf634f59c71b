//! Parallel multi-request HTTP client (§4.2).
//!
//! The original built N libcurl easy handles onto one multi handle and
//! polled until all completed. `reqwest::Client` already multiplexes
//! connections internally, so the same "build N, submit in parallel,
//! inspect afterward" contract is expressed here as N concurrent futures
//! driven by `futures_util::future::join_all`. See DESIGN.md for why this
//! substitution is faithful to the spec's contract rather than its
//! mechanism.

use std::time::Duration;

use reqwest::{Method, Url};

/// One request's outcome after a batch has been submitted: either the
/// response body, or a textual diagnostic. The original falls back to
/// `curl_easy_strerror` when the transport left no message in its error
/// buffer; `reqwest::Error`'s `Display` always carries a message, so that
/// fallback has no empty case to handle here.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    Success { status: u16, body: String },
    Failure { message: String },
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }
}

pub type RequestMethod = Method;

/// A single request descriptor: URL, method, query params, headers, body.
/// Mutated fluently via `add_url_param`/`add_header`/`set_body`, then
/// submitted as part of a `RequestBatch`.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    url: String,
    method: Method,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl RequestSpec {
    fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_url_param(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    /// The query string a signature is computed over, e.g.
    /// `symbol=BTCUSDT&timestamp=123`. RFC3986-unreserved percent-encoding
    /// is delegated to `Url::query_pairs_mut`, which matches the original's
    /// `url_escape_curl` byte-for-byte on the unreserved set.
    pub fn query_string(&self) -> String {
        let mut url = Url::parse("http://placeholder.invalid").expect("static base url");
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        url.query().unwrap_or("").to_string()
    }

    fn to_request(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut url = Url::parse(&self.url).expect("request url must be valid");
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }

        let mut builder = client.request(self.method.clone(), url);
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

/// Builds N request descriptors, submits them in parallel, and exposes
/// per-request results after `fetch_all` returns. Timeout per request:
/// 5s connect, 5s total. Follows redirects.
pub struct RequestBatch {
    client: reqwest::Client,
    specs: Vec<RequestSpec>,
    results: Vec<Option<RequestOutcome>>,
}

impl Default for RequestBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBatch {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("static client configuration is always valid");

        Self {
            client,
            specs: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Registers a request, returning a mutable reference for fluent
    /// configuration (`add_url_param`, `add_header`, `set_body`).
    pub fn add_request(&mut self, url: impl Into<String>, method: Method) -> &mut RequestSpec {
        self.specs.push(RequestSpec::new(url, method));
        self.results.push(None);
        self.specs.last_mut().expect("just pushed")
    }

    pub fn get_request(&self, index: usize) -> &RequestSpec {
        &self.specs[index]
    }

    pub fn get_request_mut(&mut self, index: usize) -> &mut RequestSpec {
        &mut self.specs[index]
    }

    /// Submits all registered requests in parallel and blocks (via await)
    /// until every one completes. Returns the number that did not
    /// complete successfully.
    pub async fn fetch_all(&mut self) -> usize {
        let futures = self.specs.iter().map(|spec| {
            let request = spec.to_request(&self.client);
            async move {
                match request.send().await {
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        match resp.text().await {
                            Ok(body) => RequestOutcome::Success { status, body },
                            Err(e) => RequestOutcome::Failure { message: e.to_string() },
                        }
                    }
                    Err(e) => RequestOutcome::Failure { message: e.to_string() },
                }
            }
        });

        let outcomes = futures_util::future::join_all(futures).await;
        let failures = outcomes.iter().filter(|o| !o.is_success()).count();
        self.results = outcomes.into_iter().map(Some).collect();

        failures
    }

    pub fn get_response(&self, index: usize) -> &str {
        match &self.results[index] {
            Some(RequestOutcome::Success { body, .. }) => body.as_str(),
            _ => "",
        }
    }

    pub fn get_status_code(&self, index: usize) -> Option<u16> {
        match &self.results[index] {
            Some(RequestOutcome::Success { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn get_error_msg(&self, index: usize) -> &str {
        match &self.results[index] {
            Some(RequestOutcome::Failure { message }) => message.as_str(),
            _ => "",
        }
    }

    pub fn is_success(&self, index: usize) -> bool {
        matches!(&self.results[index], Some(o) if o.is_success())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
