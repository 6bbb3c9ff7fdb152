// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Minimal W3C WebDriver client.
//!
//! Only the commands the reload flow needs: session lifecycle, timeouts,
//! navigation, element lookup, click, typing and visibility.
//!
//! Every response carries a `value` member. Failed commands answer with a
//! non-2xx status and `{"value": {"error": "...", "message": "..."}}`; the
//! `error` code is kept so callers can tell a missing element from a broken
//! session.

use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

/// Key under which the protocol returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Error code for a lookup that matched nothing.
pub const NO_SUCH_ELEMENT: &str = "no such element";

/// Timeout for a single HTTP round trip to the hub. Element lookups may block
/// for the implicit wait, so this must comfortably exceed it.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum WebDriverError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{error} (HTTP {status}): {message}")]
    Command {
        status: u16,
        error: String,
        message: String,
    },

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("invalid hub URL: {0}")]
    InvalidHubUrl(String),

    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },
}

impl WebDriverError {
    /// Whether the command failed only because no element matched.
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, WebDriverError::Command { error, .. } if error == NO_SUCH_ELEMENT)
    }
}

/// Element location strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.strategy(), self.selector())
    }
}

/// Opaque reference to an element in the remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(String);

/// Capabilities for a Chrome session.
pub fn chrome_capabilities(headless: bool) -> Value {
    let args: Vec<&str> = if headless { vec!["--headless"] } else { vec![] };
    json!({
        "browserName": "chrome",
        "goog:chromeOptions": { "args": args },
    })
}

/// One live browser session on a WebDriver hub.
pub struct WebDriverClient {
    client: reqwest::Client,
    hub_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Create a new browser session.
    pub async fn connect(hub_url: &str, capabilities: Value) -> Result<Self, WebDriverError> {
        let parsed: url::Url = hub_url.parse().map_err(|e: url::ParseError| {
            WebDriverError::InvalidHubUrl(e.to_string())
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebDriverError::InvalidHubUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()?;
        let hub_url = hub_url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{hub_url}/session"))
            .json(&json!({ "capabilities": { "alwaysMatch": capabilities } }))
            .send()
            .await?;
        let value = Self::unwrap_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Protocol("new session without sessionId".into()))?
            .to_string();

        debug!(session_id = %session_id, "WebDriver session created");
        Ok(Self {
            client,
            hub_url,
            session_id,
        })
    }

    async fn unwrap_value(response: reqwest::Response) -> Result<Value, WebDriverError> {
        let status = response.status();
        let body: Value = response.json().await?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Err(WebDriverError::Command {
            status: status.as_u16(),
            error: field("error"),
            message: field("message"),
        })
    }

    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/session/{}{path}", self.hub_url, self.session_id);
        debug!(%method, command = path, "WebDriver command");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        Self::unwrap_value(request.send().await?).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, WebDriverError> {
        self.command(reqwest::Method::POST, path, Some(body)).await
    }

    fn element_ref(value: &Value) -> Result<ElementRef, WebDriverError> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementRef(id.to_string()))
            .ok_or_else(|| WebDriverError::Protocol(format!("not an element reference: {value}")))
    }

    /// How long lookups keep retrying before reporting no match.
    pub async fn set_implicit_wait(&self, wait: Duration) -> Result<(), WebDriverError> {
        let millis = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.post("/timeouts", json!({ "implicit": millis })).await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    /// First element matching `locator`.
    pub async fn find(&self, locator: &Locator) -> Result<ElementRef, WebDriverError> {
        let value = self
            .post(
                "/element",
                json!({ "using": locator.strategy(), "value": locator.selector() }),
            )
            .await?;
        Self::element_ref(&value)
    }

    /// Every element matching `locator`; empty when none match.
    pub async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, WebDriverError> {
        let value = self
            .post(
                "/elements",
                json!({ "using": locator.strategy(), "value": locator.selector() }),
            )
            .await?;
        value
            .as_array()
            .ok_or_else(|| WebDriverError::Protocol("elements result is not an array".into()))?
            .iter()
            .map(Self::element_ref)
            .collect()
    }

    pub async fn click(&self, element: &ElementRef) -> Result<(), WebDriverError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), WebDriverError> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await?;
        Ok(())
    }

    pub async fn is_displayed(&self, element: &ElementRef) -> Result<bool, WebDriverError> {
        let value = self
            .command(
                reqwest::Method::GET,
                &format!("/element/{}/displayed", element.0),
                None,
            )
            .await?;
        value
            .as_bool()
            .ok_or_else(|| WebDriverError::Protocol("displayed result is not a boolean".into()))
    }

    /// End the browser session.
    pub async fn quit(&self) -> Result<(), WebDriverError> {
        let url = format!("{}/session/{}", self.hub_url, self.session_id);
        let response = self.client.delete(url).send().await?;
        Self::unwrap_value(response).await?;
        debug!(session_id = %self.session_id, "WebDriver session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::FakeWebDriver;

    #[test]
    fn locators_map_to_protocol_strategies() {
        let css = Locator::Css("#amount".into());
        let xpath = Locator::XPath("//button".into());
        assert_eq!(css.strategy(), "css selector");
        assert_eq!(xpath.strategy(), "xpath");
        assert_eq!(xpath.to_string(), "xpath //button");
    }

    #[test]
    fn headless_flag_controls_chrome_args() {
        assert_eq!(
            chrome_capabilities(true)["goog:chromeOptions"]["args"],
            json!(["--headless"])
        );
        assert_eq!(
            chrome_capabilities(false)["goog:chromeOptions"]["args"],
            json!([])
        );
    }

    #[tokio::test]
    async fn commands_reach_the_hub() {
        let fake = FakeWebDriver::spawn(["#present"]).await;
        let client = WebDriverClient::connect(&fake.hub_url, chrome_capabilities(true))
            .await
            .unwrap();

        client.set_implicit_wait(Duration::from_secs(5)).await.unwrap();
        client.navigate("https://example.com/").await.unwrap();
        let element = client.find(&Locator::Css("#present".into())).await.unwrap();
        client.send_keys(&element, "abc").await.unwrap();
        client.click(&element).await.unwrap();
        assert!(client.is_displayed(&element).await.unwrap());
        client.quit().await.unwrap();

        assert_eq!(
            fake.commands(),
            vec![
                "new session",
                "timeouts 5000",
                "url https://example.com/",
                "value #present = abc",
                "click #present",
                "delete session",
            ]
        );
    }

    #[tokio::test]
    async fn missing_elements_are_reported_by_code() {
        let fake = FakeWebDriver::spawn(Vec::<String>::new()).await;
        let client = WebDriverClient::connect(&fake.hub_url, chrome_capabilities(true))
            .await
            .unwrap();

        let err = client
            .find(&Locator::XPath("//missing".into()))
            .await
            .unwrap_err();
        assert!(err.is_no_such_element());

        let all = client
            .find_all(&Locator::XPath("//missing".into()))
            .await
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn rejects_unusable_hub_urls() {
        for hub in ["not a url", "ftp://127.0.0.1:4444/wd/hub"] {
            let err = WebDriverClient::connect(hub, chrome_capabilities(true))
                .await
                .err()
                .unwrap();
            assert!(matches!(err, WebDriverError::InvalidHubUrl(_)), "{hub}");
        }
    }
}
