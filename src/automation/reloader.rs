// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The reload flow on the gift card balance page.
//!
//! ## States
//!
//! ```text
//! Unauthenticated --authenticate--> Authenticating
//!   Authenticating --marker visible--> Authenticated
//!   Authenticating --timeout/error--> Unauthenticated
//!   Authenticated | Verified | Failed --reload--> ReloadInFlight
//!   ReloadInFlight --success marker--> Verified
//!   ReloadInFlight --anything else--> Failed
//! ```
//!
//! There is no disconnected state: [`WebDriverConnector`](super::WebDriverConnector)
//! only hands out a driver once the browser session exists.
//!
//! A failed reload leaves the sign-in intact; every reload starts by
//! navigating back to the reload page. A failed sign-in never counts as
//! signed in: reloads are refused until `authenticate` succeeds.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::webdriver::{ElementRef, Locator, WebDriverClient, WebDriverError};
use super::{AutomationError, ReloadDriver};
use crate::models::{Amount, CardNumber};
use crate::secrets::Credentials;

/// Starting page of every reload.
pub const RELOAD_PAGE_URL: &str = "https://www.amazon.com/asv/reload/order";

const SIGN_IN_BUTTON: &str = "//button[contains(text(), 'Sign In')]";
const EMAIL_INPUT: &str = "//input[@type='email']";
const PASSWORD_INPUT: &str = "//input[@type='password']";
const SUBMIT: &str = "//*[@type='submit']";
const AMOUNT_INPUT: &str = "#asv-manual-reload-amount";
const FORM_SUBMIT: &str = "//*[@id='form-submit-button']";
const SUCCESS_MARKER: &str = "//*[contains(text(), 'your reload order is placed')]";
const WIDGET_SPINNER: &str = "//*[contains(@class, 'pmts-loading-async-widget-spinner-overlay')]";
const VERIFY_BUTTON: &str = "//*[contains(@class, 'pmts-selected')]//*[text()='Verify card']";

/// Selectors present on a page where sign-in and reloads for `last4s` succeed.
#[cfg(test)]
pub(crate) fn happy_path_selectors(last4s: &[&str]) -> Vec<String> {
    let mut selectors: Vec<String> = [
        SIGN_IN_BUTTON,
        EMAIL_INPUT,
        PASSWORD_INPUT,
        SUBMIT,
        AMOUNT_INPUT,
        FORM_SUBMIT,
        SUCCESS_MARKER,
    ]
    .into_iter()
    .map(String::from)
    .collect();
    selectors.extend(last4s.iter().map(|l| card_option(l).selector().to_string()));
    selectors
}

fn card_option(last4: &str) -> Locator {
    Locator::XPath(format!("//*[text()='ending in {last4}']"))
}

fn widget_card_input(last4: &str) -> Locator {
    Locator::XPath(format!(
        "//*[contains(@class, 'pmts-selected')]//input[contains(@placeholder, '{last4}')]"
    ))
}

/// Waits used by the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    /// Implicit wait applied to every element lookup.
    pub implicit: Duration,
    /// How long to wait for the signed-in page. Long enough for a person to
    /// clear a one-time code prompt.
    pub auth_marker: Duration,
    /// How long the card verification spinner may stay up.
    pub spinner: Duration,
    /// Delay between visibility polls.
    pub poll: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            implicit: Duration::from_secs(5),
            auth_marker: Duration::from_secs(180),
            spinner: Duration::from_secs(30),
            poll: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    ReloadInFlight,
    Verified,
    Failed,
}

/// Treat "no such element" as absence rather than failure.
fn optional<T>(result: Result<T, WebDriverError>) -> Result<Option<T>, WebDriverError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_no_such_element() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Drives one browser session through sign-in and repeated reloads.
pub struct BalanceReloader {
    client: WebDriverClient,
    timeouts: DriverTimeouts,
    state: DriverState,
}

impl BalanceReloader {
    /// Wrap a connected client. Applies the implicit wait.
    pub async fn new(
        client: WebDriverClient,
        timeouts: DriverTimeouts,
    ) -> Result<Self, WebDriverError> {
        client.set_implicit_wait(timeouts.implicit).await?;
        Ok(Self {
            client,
            timeouts,
            state: DriverState::Unauthenticated,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    async fn click(&self, locator: &Locator) -> Result<(), WebDriverError> {
        let element = self.client.find(locator).await?;
        self.client.click(&element).await
    }

    async fn type_into(&self, locator: &Locator, text: &str) -> Result<(), WebDriverError> {
        let element = self.client.find(locator).await?;
        self.client.send_keys(&element, text).await
    }

    async fn any_displayed(&self, elements: &[ElementRef]) -> Result<bool, WebDriverError> {
        for element in elements {
            if self.client.is_displayed(element).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Poll until an element matching `locator` is visible.
    async fn wait_visible(&self, locator: &Locator, limit: Duration) -> Result<(), WebDriverError> {
        let started = Instant::now();
        loop {
            let elements = self.client.find_all(locator).await?;
            if self.any_displayed(&elements).await? {
                return Ok(());
            }
            if started.elapsed() >= limit {
                return Err(WebDriverError::Timeout {
                    what: locator.to_string(),
                    waited: started.elapsed(),
                });
            }
            sleep(self.timeouts.poll).await;
        }
    }

    /// Poll until nothing matching `locator` is visible.
    async fn wait_hidden(&self, locator: &Locator, limit: Duration) -> Result<(), WebDriverError> {
        let started = Instant::now();
        loop {
            let elements = self.client.find_all(locator).await?;
            if !self.any_displayed(&elements).await? {
                return Ok(());
            }
            if started.elapsed() >= limit {
                return Err(WebDriverError::Timeout {
                    what: locator.to_string(),
                    waited: started.elapsed(),
                });
            }
            sleep(self.timeouts.poll).await;
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<(), WebDriverError> {
        let submit = Locator::XPath(SUBMIT.into());

        self.client.navigate(RELOAD_PAGE_URL).await?;
        self.click(&Locator::XPath(SIGN_IN_BUTTON.into())).await?;
        self.type_into(&Locator::XPath(EMAIL_INPUT.into()), &credentials.username)
            .await?;
        self.click(&submit).await?;
        self.type_into(&Locator::XPath(PASSWORD_INPUT.into()), &credentials.password)
            .await?;
        self.click(&submit).await?;

        debug!("Credentials submitted, waiting for reload page");
        self.wait_visible(&Locator::Css(AMOUNT_INPUT.into()), self.timeouts.auth_marker)
            .await
    }

    /// Fill the inline card re-entry widget if the page shows one.
    async fn verify_card_if_prompted(&self, card: &CardNumber) -> Result<(), WebDriverError> {
        let Some(input) = optional(self.client.find(&widget_card_input(card.last4())).await)?
        else {
            return Ok(());
        };

        debug!(card = %card.masked(), "Card verification requested");
        self.client.send_keys(&input, card.as_str()).await?;
        optional(self.click(&Locator::XPath(VERIFY_BUTTON.into())).await)?;
        self.wait_hidden(&Locator::XPath(WIDGET_SPINNER.into()), self.timeouts.spinner)
            .await?;
        optional(self.click(&Locator::XPath(FORM_SUBMIT.into())).await)?;
        Ok(())
    }

    async fn place_reload(&self, card: &CardNumber, amount: Amount) -> Result<(), WebDriverError> {
        self.client.navigate(RELOAD_PAGE_URL).await?;
        self.type_into(&Locator::Css(AMOUNT_INPUT.into()), &amount.to_string())
            .await?;
        self.click(&card_option(card.last4())).await?;
        self.click(&Locator::XPath(FORM_SUBMIT.into())).await?;
        self.verify_card_if_prompted(card).await?;
        self.client
            .find(&Locator::XPath(SUCCESS_MARKER.into()))
            .await?;
        Ok(())
    }
}

impl ReloadDriver for BalanceReloader {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), AutomationError> {
        self.state = DriverState::Authenticating;
        match self.sign_in(credentials).await {
            Ok(()) => {
                self.state = DriverState::Authenticated;
                info!("Signed in");
                Ok(())
            }
            Err(err) => {
                self.state = DriverState::Unauthenticated;
                Err(AutomationError::AuthenticationFailed(Some(err)))
            }
        }
    }

    async fn reload(&mut self, card: &CardNumber, amount: Amount) -> Result<(), AutomationError> {
        match self.state {
            DriverState::Authenticated | DriverState::Verified | DriverState::Failed => {}
            _ => return Err(AutomationError::AuthenticationFailed(None)),
        }

        self.state = DriverState::ReloadInFlight;
        match self.place_reload(card, amount).await {
            Ok(()) => {
                self.state = DriverState::Verified;
                info!(card = %card.masked(), %amount, "Reload placed");
                Ok(())
            }
            Err(err) => {
                self.state = DriverState::Failed;
                warn!(card = %card.masked(), error = %err, "Reload failed");
                Err(AutomationError::reload_failed(card, err))
            }
        }
    }

    async fn quit(self) -> Result<(), AutomationError> {
        self.client.quit().await.map_err(AutomationError::QuitFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::FakeWebDriver;
    use crate::automation::webdriver::chrome_capabilities;

    const CARD: &str = "4111111111111234";

    fn quick() -> DriverTimeouts {
        DriverTimeouts {
            implicit: Duration::from_millis(0),
            auth_marker: Duration::from_millis(50),
            spinner: Duration::from_millis(50),
            poll: Duration::from_millis(10),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "someone@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    fn signed_in_page() -> Vec<String> {
        happy_path_selectors(&["1234"])
    }

    async fn reloader(fake: &FakeWebDriver) -> BalanceReloader {
        let client = WebDriverClient::connect(&fake.hub_url, chrome_capabilities(true))
            .await
            .unwrap();
        BalanceReloader::new(client, quick()).await.unwrap()
    }

    #[tokio::test]
    async fn sign_in_follows_the_form() {
        let fake = FakeWebDriver::spawn(signed_in_page()).await;
        let mut driver = reloader(&fake).await;
        assert_eq!(driver.state(), DriverState::Unauthenticated);

        driver.authenticate(&credentials()).await.unwrap();
        assert_eq!(driver.state(), DriverState::Authenticated);

        assert_eq!(
            fake.commands(),
            vec![
                "new session".to_string(),
                "timeouts 0".to_string(),
                format!("url {RELOAD_PAGE_URL}"),
                format!("click {SIGN_IN_BUTTON}"),
                format!("value {EMAIL_INPUT} = someone@example.com"),
                format!("click {SUBMIT}"),
                format!("value {PASSWORD_INPUT} = hunter2"),
                format!("click {SUBMIT}"),
            ]
        );
    }

    #[tokio::test]
    async fn hidden_marker_times_out_and_blocks_reloads() {
        let fake = FakeWebDriver::spawn(signed_in_page()).await;
        fake.hide(AMOUNT_INPUT);
        let mut driver = reloader(&fake).await;

        let err = driver.authenticate(&credentials()).await.unwrap_err();
        assert!(matches!(
            err,
            AutomationError::AuthenticationFailed(Some(WebDriverError::Timeout { .. }))
        ));
        assert_eq!(driver.state(), DriverState::Unauthenticated);

        let before = fake.commands().len();
        let card = CardNumber::parse(CARD).unwrap();
        let err = driver
            .reload(&card, Amount::parse("5").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::AuthenticationFailed(None)));
        assert_eq!(fake.commands().len(), before, "No commands after failed sign-in");
    }

    #[tokio::test]
    async fn reload_without_widget() {
        let fake = FakeWebDriver::spawn(signed_in_page()).await;
        let mut driver = reloader(&fake).await;
        driver.authenticate(&credentials()).await.unwrap();
        let before = fake.commands().len();

        let card = CardNumber::parse(CARD).unwrap();
        driver
            .reload(&card, Amount::parse("0.5").unwrap())
            .await
            .unwrap();
        assert_eq!(driver.state(), DriverState::Verified);

        assert_eq!(
            fake.commands()[before..].to_vec(),
            vec![
                format!("url {RELOAD_PAGE_URL}"),
                format!("value {AMOUNT_INPUT} = 0.50"),
                "click //*[text()='ending in 1234']".to_string(),
                format!("click {FORM_SUBMIT}"),
            ]
        );
    }

    #[tokio::test]
    async fn reload_completes_verification_widget() {
        let mut page = signed_in_page();
        page.push(widget_card_input("1234").selector().to_string());
        page.push(VERIFY_BUTTON.to_string());
        let fake = FakeWebDriver::spawn(page).await;
        let mut driver = reloader(&fake).await;
        driver.authenticate(&credentials()).await.unwrap();
        let before = fake.commands().len();

        let card = CardNumber::parse(CARD).unwrap();
        driver.reload(&card, Amount::parse("5").unwrap()).await.unwrap();

        let commands = fake.commands()[before..].to_vec();
        assert!(commands.contains(&format!(
            "value {} = {CARD}",
            widget_card_input("1234").selector()
        )));
        assert!(commands.contains(&format!("click {VERIFY_BUTTON}")));
        assert_eq!(
            commands
                .iter()
                .filter(|c| **c == format!("click {FORM_SUBMIT}"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn failed_reload_does_not_break_the_next_one() {
        let fake = FakeWebDriver::spawn(signed_in_page()).await;
        let mut driver = reloader(&fake).await;
        driver.authenticate(&credentials()).await.unwrap();
        let amount = Amount::parse("5").unwrap();

        let unknown = CardNumber::parse("6011000000009999").unwrap();
        let err = driver.reload(&unknown, amount).await.unwrap_err();
        match err {
            AutomationError::ReloadFailed { card, source } => {
                assert_eq!(card, "**** **** **** 9999");
                assert!(source.is_no_such_element());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.state(), DriverState::Failed);

        let card = CardNumber::parse(CARD).unwrap();
        driver.reload(&card, amount).await.unwrap();
        assert_eq!(driver.state(), DriverState::Verified);

        driver.quit().await.unwrap();
        assert_eq!(fake.commands().last().unwrap(), "delete session");
    }

    #[tokio::test]
    async fn missing_success_marker_is_a_reload_failure() {
        let page: Vec<String> = signed_in_page()
            .into_iter()
            .filter(|s| s != SUCCESS_MARKER)
            .collect();
        let fake = FakeWebDriver::spawn(page).await;
        let mut driver = reloader(&fake).await;
        driver.authenticate(&credentials()).await.unwrap();

        let card = CardNumber::parse(CARD).unwrap();
        let err = driver
            .reload(&card, Amount::parse("5").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::ReloadFailed { .. }));
    }
}
