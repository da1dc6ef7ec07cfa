use super::retry::retry;
use crate::browser::chrome::ChromeDriver;
use crate::config::BrowserOptions;
use crate::error::LifecycleError;
use std::time::Duration;

/// Spacing between page-load attempts.
pub const READY_INTERVAL: Duration = Duration::from_secs(1);

/// Load `url` in a throwaway browser until it succeeds or `timeout` elapses.
///
/// The browser is closed on both outcomes.
pub async fn await_ready(
    url: &str,
    timeout: Duration,
    browser: &BrowserOptions,
) -> Result<(), LifecycleError> {
    let driver = ChromeDriver::new(browser.connection_mode()).await?;
    let outcome = match driver.new_page().await {
        Ok(page) => {
            retry(
                || ChromeDriver::navigate(&page, url),
                READY_INTERVAL,
                timeout,
            )
            .await
        }
        Err(e) => {
            let _ = driver.close().await;
            return Err(e.into());
        }
    };

    if let Err(e) = driver.close().await {
        log::debug!("Closing readiness browser failed: {}", e);
    }

    outcome.map_err(|timeout_err| {
        log::debug!("Readiness probe for {} {}", url, timeout_err);
        LifecycleError::ServerNotReady {
            url: url.to_string(),
            timeout,
        }
    })
}
