// spider_chrome re-exports chromiumoxide API
use super::context::BrowserSession;
use crate::error::{BrowserError, Result};
use crate::server::retry::retry;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for a single page load.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

const LOADED_CHECK: &str =
    "document.readyState === 'complete' && location.href !== 'about:blank'";

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Launch a dedicated Chrome with a throwaway profile
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Attach to a Chrome started with `--remote-debugging-port`
    DebugPort(u16),
}

impl ChromeDriver {
    /// Launch or attach to Chrome and start draining its event stream
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile directory so concurrent runs never share state
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                let temp_dir = std::env::temp_dir().join(format!(
                    "time-keeper-e2e-{}-{}",
                    std::process::id(),
                    unique_id
                ));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config.user_data_dir(&temp_dir);

                // Linux AppArmor workaround
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            // Let chromiumoxide look for a system Chrome
                            log::warn!("Auto-download failed ({}), trying system Chrome...", e);
                        }
                    }
                }

                let config = config
                    .build()
                    .map_err(|e| BrowserError::LaunchFailed(launch_hint(&e)))?;

                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(launch_hint(&e.to_string())))?;

                tokio::spawn(async move { while handler.next().await.is_some() {} });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                log::info!("Attaching to Chrome on {}", url);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    BrowserError::ConnectionFailed(format!(
                        "No Chrome answering on {} (start it with --remote-debugging-port={}): {}",
                        url, port, e
                    ))
                })?;

                tokio::spawn(async move { while handler.next().await.is_some() {} });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// Open a blank page in the default browser context
    pub async fn new_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create page: {}", e)))
    }

    /// Open an isolated browser context, optionally pinned to an IANA timezone.
    ///
    /// The caller owns the returned session and must `close()` it.
    pub async fn new_context(&self, timezone: Option<&str>) -> Result<BrowserSession<'_>> {
        BrowserSession::open(&self.browser, timezone).await
    }

    /// Navigate `page` to `url` and wait for the load to finish
    pub async fn navigate(page: &Page, url: &str) -> Result<()> {
        log::debug!("Navigating to {}", url);

        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| BrowserError::NavigationFailed(format!("Invalid URL {}: {}", url, e)))?;

        let response = page.execute(params).await.map_err(|e| {
            let error_str = e.to_string();

            // "oneshot canceled" means the browser connection is gone
            if error_str.contains("oneshot canceled") {
                BrowserError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e))
            }
        })?;

        if let Some(error_text) = &response.result.error_text {
            return Err(BrowserError::NavigationFailed(format!(
                "Navigation to {} failed: {}",
                url, error_text
            )));
        }

        // Page.navigate answers once the new document is committed; wait for its load event
        retry(
            || document_loaded(page),
            LOAD_POLL_INTERVAL,
            NAVIGATION_TIMEOUT,
        )
        .await
        .map_err(|timeout| {
            BrowserError::NavigationFailed(format!("{} did not finish loading: {}", url, timeout))
        })
    }

    /// Shut the browser down. An attached browser is left running.
    pub async fn close(mut self) -> Result<()> {
        if self.temp_dir.is_none() {
            return Ok(());
        }
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to close Chrome: {}", e)))?;
        Ok(())
    }

    /// Chrome for Testing from the user cache, fetched on first use
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| BrowserError::Other("Cannot determine cache directory".to_string()))?
            .join("time-keeper-e2e")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create cache dir: {}", e)))?;

        let marker = cache_dir.join(".downloaded");
        if marker.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir) {
                return Ok(executable);
            }
        }

        log::info!("Downloading Chrome for Testing (first time only, ~150MB)...");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| BrowserError::Other(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| BrowserError::Other(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&marker, "downloaded")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to write marker: {}", e)))?;

        log::info!("Chrome downloaded to {}", info.executable_path.display());

        Ok(info.executable_path)
    }

    fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        [
            "chrome",
            "chrome.exe",
            "Google Chrome.app/Contents/MacOS/Google Chrome",
            "chrome-linux/chrome",
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            "chrome-win/chrome.exe",
        ]
        .iter()
        .map(|candidate| cache_dir.join(candidate))
        .find(|path| path.exists())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(profile) = self.temp_dir.take().filter(|dir| dir.exists()) {
            if let Err(e) = std::fs::remove_dir_all(&profile) {
                log::debug!("Could not remove Chrome profile {}: {}", profile.display(), e);
            }
        }
    }
}

async fn document_loaded(page: &Page) -> Result<()> {
    let loaded: bool = page
        .evaluate(LOADED_CHECK)
        .await?
        .into_value()
        .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?;
    if loaded {
        Ok(())
    } else {
        Err(BrowserError::NavigationFailed(
            "document still loading".to_string(),
        ))
    }
}

fn launch_hint(cause: &str) -> String {
    format!(
        "{}. \n\n\
         Chrome not found. You can:\n\
         - Install Chrome: https://www.google.com/chrome/\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium\n\
         - macOS: brew install --cask google-chrome\n\
         - Or specify path: --chrome-path /path/to/chrome\n\
         - Linux sandbox issue? Try: --no-sandbox",
        cause
    )
}
