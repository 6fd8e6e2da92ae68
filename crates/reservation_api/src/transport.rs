use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Query string parameters for a request, in insertion order.
pub type QueryParams = [(&'static str, String)];

/// Minimal request surface the discovery engine needs from the remote service.
///
/// Implementations must never fail loudly: a network error, a non-success
/// status or a body that is not JSON all come back as `None`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request and decode the JSON body.
    async fn get(&self, url: &str, params: &QueryParams) -> Option<Value>;

    /// Issue a POST request with a JSON body and decode the JSON response.
    async fn post(&self, url: &str, params: &QueryParams, body: &Value) -> Option<Value>;
}

/// Configuration for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the booking platform, used for `Origin`/`Referer` and warm-up
    pub base_url: String,

    /// Upper bound for a single request, connect plus body
    pub timeout: Duration,

    /// Browser user agent sent with every request
    pub user_agent: String,

    /// Value of the `app-language` header
    pub app_language: String,

    /// Value of the `app-version` header
    pub app_version: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://reservation.pc.gc.ca".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
            app_language: "en-CA".to_string(),
            app_version: "5.98.197".to_string(),
        }
    }
}

impl TransportConfig {
    /// Read overrides from the environment on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("RESERVATION_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = std::env::var("PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(language) = std::env::var("APP_LOCALE") {
            config.app_language = language;
        }

        config
    }
}

/// reqwest-backed transport holding a cookie session with the booking platform
pub struct HttpTransport {
    client: Client,
    jar: Arc<Jar>,
    config: TransportConfig,
    calls: AtomicU64,
}

impl HttpTransport {
    /// Create a transport with a fresh cookie jar
    pub fn new(config: TransportConfig) -> Result<Self, reqwest::Error> {
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(config.user_agent.clone())
            .default_headers(Self::default_headers(&config))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            jar,
            config,
            calls: AtomicU64::new(0),
        })
    }

    /// Visit the landing page once so the platform hands out its session cookies
    pub async fn warm_up(&self) -> bool {
        info!("Opening booking platform session at {}", self.config.base_url);

        match self.client.get(&self.config.base_url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Session warm-up returned HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Session warm-up failed: {}", e);
                false
            }
        }
    }

    /// Number of requests that reached the remote service
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn default_headers(config: &TransportConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let fixed = [
            ("accept", "application/json"),
            ("cache-control", "no-cache"),
            ("pragma", "no-cache"),
            ("expires", "0"),
            ("sec-fetch-dest", "empty"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-site", "same-origin"),
        ];
        for (name, value) in fixed {
            headers.insert(name, HeaderValue::from_static(value));
        }

        let configured = [
            ("origin", config.base_url.as_str()),
            ("referer", config.base_url.as_str()),
            ("app-language", config.app_language.as_str()),
            ("app-version", config.app_version.as_str()),
        ];
        for (name, value) in configured {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => warn!("Skipping invalid header value for {}", name),
            }
        }

        headers
    }

    /// Per-request tracing headers plus the XSRF token echoed from the cookie jar
    fn decorate(&self, request: RequestBuilder, url: &Url) -> RequestBuilder {
        let request_id = format!(
            "|{}.{}",
            uuid::Uuid::new_v4(),
            &uuid::Uuid::new_v4().simple().to_string()[..12]
        );
        let traceparent = format!(
            "00-{}-{}-01",
            uuid::Uuid::new_v4().simple(),
            &uuid::Uuid::new_v4().simple().to_string()[..16]
        );

        let mut request = request
            .header("request-id", request_id)
            .header("traceparent", traceparent);

        if let Some(token) = self.xsrf_token(url) {
            request = request.header("x-xsrf-token", token);
        }

        request
    }

    fn xsrf_token(&self, url: &Url) -> Option<String> {
        let cookies = self.jar.cookies(url)?;
        let cookies = cookies.to_str().ok()?;

        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == "XSRF-TOKEN")
            .map(|(_, value)| value.to_string())
    }

    async fn execute(&self, method: &str, url: &str, request: RequestBuilder) -> Option<Value> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} {} failed: {}", method, url, e);
                return None;
            }
        };

        let count = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "API call #{} {} {} responded with {}",
            count,
            method,
            url,
            response.status()
        );

        if !response.status().is_success() {
            warn!("{} {} returned HTTP {}", method, url, response.status());
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{} {} returned an unreadable body: {}", method, url, e);
                None
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, params: &QueryParams) -> Option<Value> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Refusing malformed URL {}: {}", url, e);
                return None;
            }
        };

        let request = self.decorate(self.client.get(parsed.clone()).query(params), &parsed);
        self.execute("GET", url, request).await
    }

    async fn post(&self, url: &str, params: &QueryParams, body: &Value) -> Option<Value> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Refusing malformed URL {}: {}", url, e);
                return None;
            }
        };

        let request = self.decorate(
            self.client.post(parsed.clone()).query(params).json(body),
            &parsed,
        );
        self.execute("POST", url, request).await
    }
}
