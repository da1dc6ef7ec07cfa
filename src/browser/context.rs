//! Isolated browser contexts.
//!
//! A context has its own cookies and storage. Pinning a timezone goes through
//! `Emulation.setTimezoneOverride` on the context's page before anything is
//! loaded, so the page's `Intl` and `Date` see that zone from the start.

use crate::error::{BrowserError, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;

pub struct BrowserSession<'a> {
    browser: &'a Browser,
    context_id: BrowserContextId,
    page: Page,
    timezone: Option<String>,
}

impl<'a> BrowserSession<'a> {
    pub(crate) async fn open(browser: &'a Browser, timezone: Option<&str>) -> Result<Self> {
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create browser context: {}", e)))?;
        let context_id = created.result.browser_context_id.clone();

        let page = match browser.new_page(blank_target_in(&context_id)).await {
            Ok(page) => page,
            Err(e) => {
                dispose(browser, &context_id).await;
                return Err(BrowserError::Other(format!(
                    "Failed to open page in browser context: {}",
                    e
                )));
            }
        };

        let session = Self {
            browser,
            context_id,
            page,
            timezone: timezone.map(str::to_string),
        };

        if let Some(zone) = timezone {
            log::debug!("Pinning browser context to {}", zone);
            if let Err(e) = session
                .page
                .execute(SetTimezoneOverrideParams::new(zone))
                .await
            {
                session.close().await;
                return Err(BrowserError::Other(format!(
                    "Failed to override timezone with {}: {}",
                    zone, e
                )));
            }
        }

        Ok(session)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Timezone the context is pinned to, if any
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    /// Close the page and dispose of the context. Failures are logged, not returned.
    pub async fn close(self) {
        if let Err(e) = self.page.clone().close().await {
            log::debug!("Closing context page failed: {}", e);
        }
        dispose(self.browser, &self.context_id).await;
    }
}

fn blank_target_in(context_id: &BrowserContextId) -> CreateTargetParams {
    let mut target = CreateTargetParams::new("about:blank");
    target.browser_context_id = Some(context_id.clone());
    target
}

async fn dispose(browser: &Browser, context_id: &BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id.clone()))
        .await
    {
        log::warn!("Failed to dispose browser context: {}", e);
    }
}
