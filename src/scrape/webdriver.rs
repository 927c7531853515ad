//! A [`PageDriver`] speaking the W3C WebDriver HTTP protocol.
//!
//! Works against chromedriver, geckodriver or a Selenium server. Clicks,
//! scrolling and element removal go through `execute/sync` so that overlays
//! intercepting pointer events do not make a click fail.

use crate::scrape::driver::{DriverError, PageDriver};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Settings for starting a WebDriver session.
#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    /// Base URL of the WebDriver server.
    pub url: String,
    /// `chrome` or `firefox`.
    pub browser: String,
    pub headless: bool,
    /// Delay between element polls in `wait_for`.
    pub poll_interval: Duration,
    /// Timeout of a single protocol request.
    pub request_timeout: Duration,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            browser: "chrome".to_string(),
            headless: false,
            poll_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

const CLICK_SCRIPT: &str =
    "var el = document.querySelector(arguments[0]); if (!el) { return false; } el.click(); return true;";
const SCROLL_SCRIPT: &str = "var el = document.querySelector(arguments[0]); \
     if (!el) { return false; } el.scrollIntoView({block: 'center'}); return true;";
const REMOVE_SCRIPT: &str = "var els = document.querySelectorAll(arguments[0]); \
     els.forEach(function (el) { el.remove(); }); return els.length;";

/// An open WebDriver session.
pub struct WebDriverSession {
    http_client: reqwest::Client,
    base_url: String,
    session_id: String,
    poll_interval: Duration,
}

impl WebDriverSession {
    /// Create a new browser session.
    pub async fn start(settings: &WebDriverSettings) -> Result<Self, DriverError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| DriverError::Session(e.to_string()))?;

        let base_url = settings.url.trim_end_matches('/').to_string();
        let body = json!({ "capabilities": { "alwaysMatch": capabilities(settings) } });

        let value = send(&http_client, &base_url, Method::POST, "/session", Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("new session response has no sessionId".into()))?
            .to_string();

        info!("Started {} WebDriver session {}", settings.browser, session_id);

        Ok(Self {
            http_client,
            base_url,
            session_id,
            poll_interval: settings.poll_interval,
        })
    }

    /// End the session and close the browser.
    pub async fn quit(self) -> Result<(), DriverError> {
        let path = format!("/session/{}", self.session_id);
        self.command(Method::DELETE, &path, None).await?;
        debug!("Closed WebDriver session {}", self.session_id);
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        send(&self.http_client, &self.base_url, method, path, body).await
    }

    fn session_path(&self, suffix: &str) -> String {
        format!("/session/{}/{}", self.session_id, suffix)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        let path = self.session_path("execute/sync");
        self.command(Method::POST, &path, Some(json!({ "script": script, "args": args })))
            .await
    }

    async fn element_present(&self, selector: &str) -> Result<bool, DriverError> {
        let path = self.session_path("element");
        let body = json!({ "using": "css selector", "value": selector });
        match self.command(Method::POST, &path, Some(body)).await {
            Ok(_) => Ok(true),
            Err(DriverError::NoSuchElement(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn capabilities(settings: &WebDriverSettings) -> Value {
    let mut caps = json!({ "browserName": settings.browser });
    if settings.headless {
        match settings.browser.as_str() {
            "firefox" => caps["moz:firefoxOptions"] = json!({ "args": ["-headless"] }),
            _ => caps["goog:chromeOptions"] = json!({ "args": ["--headless=new"] }),
        }
    }
    caps
}

async fn send(
    client: &reqwest::Client,
    base_url: &str,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let url = format!("{}{}", base_url, path);
    let mut request = client.request(method, &url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_connect() {
            DriverError::Connect(base_url.to_string())
        } else {
            DriverError::Protocol(format!("request to {} failed: {}", path, e))
        }
    })?;

    let status = response.status();
    let wire: WireResponse = response
        .json()
        .await
        .map_err(|e| DriverError::Protocol(format!("invalid response from {}: {}", path, e)))?;

    if status.is_success() {
        return Ok(wire.value);
    }

    match serde_json::from_value::<WireError>(wire.value) {
        Ok(err) if err.error == "no such element" => Err(DriverError::NoSuchElement(err.message)),
        Ok(err) if err.error == "invalid session id" || err.error == "session not created" => {
            Err(DriverError::Session(format!("{}: {}", err.error, err.message)))
        }
        Ok(err) => Err(DriverError::Protocol(format!("{}: {}", err.error, err.message))),
        Err(_) => Err(DriverError::Protocol(format!("HTTP {} from {}", status, path))),
    }
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn open(&mut self, url: &str) -> Result<(), DriverError> {
        debug!("Navigating to {}", url);
        let path = self.session_path("url");
        self.command(Method::POST, &path, Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let started = Instant::now();
        loop {
            if self.element_present(selector).await? {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        let path = self.session_path("source");
        let value = self.command(Method::GET, &path, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("page source is not a string".into()))
    }

    async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        match self.execute(CLICK_SCRIPT, vec![json!(selector)]).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(DriverError::NoSuchElement(selector.to_string())),
        }
    }

    async fn scroll_into_view(&mut self, selector: &str) -> Result<(), DriverError> {
        match self.execute(SCROLL_SCRIPT, vec![json!(selector)]).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(DriverError::NoSuchElement(selector.to_string())),
        }
    }

    async fn remove_matching(&mut self, selector: &str) -> Result<usize, DriverError> {
        let value = self.execute(REMOVE_SCRIPT, vec![json!(selector)]).await?;
        let removed = value.as_u64().unwrap_or_else(|| {
            warn!("Unexpected removal result for {}: {}", selector, value);
            0
        });
        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> WebDriverSession {
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": {"alwaysMatch": {"browserName": "chrome"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {"sessionId": "abc", "capabilities": {}}
            })))
            .mount(server)
            .await;

        let settings = WebDriverSettings {
            url: server.uri(),
            poll_interval: Duration::from_millis(10),
            ..WebDriverSettings::default()
        };
        WebDriverSession::start(&settings).await.unwrap()
    }

    fn no_such_element() -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(json!({
            "value": {"error": "no such element", "message": "not found", "stacktrace": ""}
        }))
    }

    #[tokio::test]
    async fn test_open_and_page_source() {
        let server = MockServer::start().await;
        let mut driver = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .and(body_partial_json(json!({"url": "https://item.example.com/1.html"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc/source"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": "<html></html>"})),
            )
            .mount(&server)
            .await;

        driver.open("https://item.example.com/1.html").await.unwrap();
        assert_eq!(driver.page_source().await.unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn test_wait_for_times_out_when_element_missing() {
        let server = MockServer::start().await;
        let mut driver = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/element"))
            .respond_with(no_such_element())
            .mount(&server)
            .await;

        let err = driver
            .wait_for(".comment-item", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_wait_for_finds_element() {
        let server = MockServer::start().await;
        let mut driver = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/element"))
            .and(body_partial_json(json!({"using": "css selector", "value": ".comment-item"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {"element-6066-11e4-a52e-4f735466cecf": "e1"}
            })))
            .mount(&server)
            .await;

        driver
            .wait_for(".comment-item", Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_click_missing_element() {
        let server = MockServer::start().await;
        let mut driver = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/execute/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": false})))
            .mount(&server)
            .await;

        let err = driver.click("a.next").await.unwrap_err();
        assert!(matches!(err, DriverError::NoSuchElement(_)));
    }

    #[tokio::test]
    async fn test_remove_matching_counts() {
        let server = MockServer::start().await;
        let mut driver = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/execute/sync"))
            .and(body_partial_json(json!({"args": [".J-global-toolbar"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 2})))
            .mount(&server)
            .await;

        assert_eq!(driver.remove_matching(".J-global-toolbar").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_session_and_quit() {
        let server = MockServer::start().await;
        let mut driver = session(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/abc/source"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": {"error": "invalid session id", "message": "closed"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(&server)
            .await;

        let err = driver.page_source().await.unwrap_err();
        assert!(matches!(err, DriverError::Session(_)));
        driver.quit().await.unwrap();
    }

    #[test]
    fn test_headless_capabilities() {
        let settings = WebDriverSettings {
            headless: true,
            ..WebDriverSettings::default()
        };
        let caps = capabilities(&settings);
        assert_eq!(caps["goog:chromeOptions"]["args"][0], "--headless=new");

        let settings = WebDriverSettings {
            browser: "firefox".to_string(),
            headless: true,
            ..WebDriverSettings::default()
        };
        assert_eq!(capabilities(&settings)["moz:firefoxOptions"]["args"][0], "-headless");
    }
}
