//! Page object for the Time Keeper clock table.
//!
//! Row layout: label, IANA identifier, formatted local time, delete control.
//! The add form holds `input#label`, `select#timezone`, and a submit button;
//! it is revealed by the `div button.block` trigger.

use super::chrome::ChromeDriver;
use crate::error::{BrowserError, Result};
use crate::server::retry::retry;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const ADD_TRIGGER: &str = "div button.block";
pub const ADD_FORM: &str = "div form";
pub const LABEL_INPUT: &str = "input#label";
pub const TIMEZONE_SELECT: &str = "select#timezone";
pub const SUBMIT_BUTTON: &str = "button[type=\"submit\"]";
pub const OWN_NAME: &str = "tbody tr:first-child td span[class*=\"text-indigo\"]";
pub const ROWS: &str = "tbody tr";
pub const ZONE_CELLS: &str = "tbody tr td:nth-child(2)";
pub const TIME_CELLS: &str = "tbody tr td:nth-child(3)";

/// How long an action waits for its target to show up.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after an action that is expected to change nothing.
pub const SETTLE_DELAY: Duration = Duration::from_millis(300);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct TimeKeeperPage {
    page: Page,
    base_url: String,
}

impl TimeKeeperPage {
    pub fn new(page: Page, base_url: impl Into<String>) -> Self {
        Self {
            page,
            base_url: base_url.into(),
        }
    }

    /// Load the application root
    pub async fn goto(&self) -> Result<()> {
        log::info!("Navigate to homepage");
        ChromeDriver::navigate(&self.page, &self.base_url).await
    }

    pub async fn title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    /// Text of the "(You)" marker on the default row
    pub async fn own_name(&self) -> Result<String> {
        self.wait_for(OWN_NAME).await?;
        let texts = self.texts(OWN_NAME).await?;
        texts
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::ElementNotFound(OWN_NAME.to_string()))
    }

    /// Identifier column, top to bottom
    pub async fn timezone_ids(&self) -> Result<Vec<String>> {
        log::info!("Get timezone values");
        self.texts(ZONE_CELLS).await
    }

    /// Rendered local time column, top to bottom
    pub async fn local_times(&self) -> Result<Vec<String>> {
        log::info!("Get local time values");
        self.texts(TIME_CELLS).await
    }

    pub async fn row_count(&self) -> Result<usize> {
        self.eval(&format!(
            "document.querySelectorAll({}).length",
            js_string(ZONE_CELLS)
        ))
        .await
    }

    /// Wait until the table shows `expected` rows. Returns whether it did.
    pub async fn wait_for_row_count(&self, expected: usize) -> bool {
        retry(
            || async move {
                match self.row_count().await {
                    Ok(n) if n == expected => Ok(()),
                    Ok(n) => Err(format!("{} row(s), waiting for {}", n, expected)),
                    Err(e) => Err(e.to_string()),
                }
            },
            POLL_INTERVAL,
            ACTION_TIMEOUT,
        )
        .await
        .is_ok()
    }

    pub async fn open_add_form(&self) -> Result<()> {
        self.click(ADD_TRIGGER).await
    }

    pub async fn fill_label(&self, label: &str) -> Result<()> {
        self.wait_for(LABEL_INPUT).await?;
        self.set_value(LABEL_INPUT, label).await
    }

    /// Non-empty option values of the timezone select
    pub async fn timezone_options(&self) -> Result<Vec<String>> {
        log::info!("Get timezone options");
        self.wait_for(TIMEZONE_SELECT).await?;
        self.eval(&format!(
            "Array.from(document.querySelectorAll({} + ' option')).map(o => o.value).filter(v => v)",
            js_string(TIMEZONE_SELECT)
        ))
        .await
    }

    pub async fn select_timezone(&self, zone: &str) -> Result<()> {
        log::info!("Select timezone {}", zone);
        self.wait_for(TIMEZONE_SELECT).await?;

        let has_option: bool = self
            .eval(&format!(
                "Array.from(document.querySelector({}).options).some(o => o.value === {})",
                js_string(TIMEZONE_SELECT),
                js_string(zone)
            ))
            .await?;
        if !has_option {
            return Err(BrowserError::ElementNotFound(format!(
                "{} option '{}'",
                TIMEZONE_SELECT, zone
            )));
        }

        self.set_value(TIMEZONE_SELECT, zone).await
    }

    pub async fn submit(&self) -> Result<()> {
        log::info!("Submit form");
        self.click(SUBMIT_BUTTON).await
    }

    /// Open the form, fill whichever fields are given, and submit
    pub async fn add_entry(&self, label: Option<&str>, zone: Option<&str>) -> Result<()> {
        log::info!("Add new timezone");
        self.open_add_form().await?;
        if let Some(label) = label {
            self.fill_label(label).await?;
        }
        if let Some(zone) = zone {
            self.select_timezone(zone).await?;
        }
        self.submit().await
    }

    /// Add an entry with a uniformly chosen timezone option. Returns the chosen identifier.
    pub async fn add_random_entry(&self, label: &str) -> Result<String> {
        log::info!("Add new timezone");
        self.open_add_form().await?;
        self.fill_label(label).await?;

        let options = self.timezone_options().await?;
        log::info!("Select random timezone option");
        let zone = crate::random::choose(&options)
            .cloned()
            .ok_or_else(|| BrowserError::ElementNotFound(format!("{} options", TIMEZONE_SELECT)))?;

        self.select_timezone(&zone).await?;
        self.submit().await?;
        Ok(zone)
    }

    /// Click the delete control of the last row showing `zone`
    pub async fn delete_entry(&self, zone: &str) -> Result<()> {
        log::info!("Delete timezone {}", zone);
        let index: Option<usize> = self
            .eval(&format!(
                "(() => {{
                    const rows = Array.from(document.querySelectorAll({rows}));
                    let found = null;
                    rows.forEach((row, i) => {{
                        const cell = row.querySelector('td:nth-child(2)');
                        if (cell && cell.textContent.trim() === {zone}) found = i;
                    }});
                    return found;
                }})()",
                rows = js_string(ROWS),
                zone = js_string(zone)
            ))
            .await?;

        let index = index
            .ok_or_else(|| BrowserError::ElementNotFound(format!("row for {}", zone)))?;
        let rows = self.page.find_elements(ROWS).await?;
        let row = rows
            .get(index)
            .ok_or_else(|| BrowserError::ElementNotFound(format!("row {} for {}", index, zone)))?;

        row.find_element("td:nth-child(2) ~ td button")
            .await
            .map_err(|_| BrowserError::ElementNotFound(format!("delete control for {}", zone)))?
            .click()
            .await?;
        Ok(())
    }

    /// Whether the add form is rendered with a non-empty box
    pub async fn add_form_visible(&self) -> Result<bool> {
        self.eval(&format!(
            "(() => {{
                const form = document.querySelector({});
                if (!form) return false;
                const rect = form.getBoundingClientRect();
                const style = getComputedStyle(form);
                return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden';
            }})()",
            js_string(ADD_FORM)
        ))
        .await
    }

    /// Give the page a moment to react to an action that should be rejected
    pub async fn settle(&self) {
        tokio::time::sleep(SETTLE_DELAY).await;
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.wait_for(selector).await?.click().await?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str) -> Result<Element> {
        retry(|| self.page.find_element(selector), POLL_INTERVAL, ACTION_TIMEOUT)
            .await
            .map_err(|timeout| {
                BrowserError::ElementNotFound(format!("{} ({})", selector, timeout))
            })
    }

    /// Set a form control's value the way a user edit would, so framework
    /// change handlers fire.
    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        let applied: bool = self
            .eval(&format!(
                "(() => {{
                    const el = document.querySelector({selector});
                    if (!el) return false;
                    el.focus();
                    const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value').set;
                    setter.call(el, {value});
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return true;
                }})()",
                selector = js_string(selector),
                value = js_string(value)
            ))
            .await?;

        if applied {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        self.eval(&format!(
            "Array.from(document.querySelectorAll({})).map(e => e.textContent || '')",
            js_string(selector)
        ))
        .await
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::ScriptFailed(format!("Failed to deserialize result: {}", e)))
    }
}

/// Quote a Rust string as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_backslashes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(js_string("it's"), "\"it's\"");
    }
}
