//! Chrome DevTools Protocol rasterizer (uses the `headless_chrome` crate)
//!
//! Region ids are element ids in the loaded page. Each capture measures the
//! element's full scroll extent in document coordinates and clips a PNG
//! screenshot to it at the requested device scale.

use crate::{CaptureRequest, CapturedRegion, Error, Rasterizer, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page, DOM};
use headless_chrome::{Browser, LaunchOptions};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Browser settings for the CDP rasterizer
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// User agent string to send with requests
    pub user_agent: String,
    /// Window size; regions larger than this are still captured through the clip
    pub viewport: (u32, u32),
    /// Timeout for page loads in milliseconds
    pub timeout_ms: u64,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/115.0 RFOX/0.3".to_string(),
            viewport: (1280, 720),
            timeout_ms: 30000,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Extent {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Rasterizer that captures elements of a page loaded in headless Chrome
pub struct CdpRasterizer {
    // keeps the Chrome process alive for as long as the tab is used
    _browser: Browser,
    tab: Arc<Tab>,
}

impl CdpRasterizer {
    /// Launch Chrome and load `url`.
    pub fn launch(url: &str, config: CdpConfig) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some(config.viewport))
            .idle_browser_timeout(Duration::from_millis(config.timeout_ms.max(30000)))
            .build()
            .map_err(|e| Error::CdpError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CdpError(format!("Failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| Error::CdpError(format!("Failed to set user agent: {}", e)))?;

        if !config.headers.is_empty() {
            let headers: HashMap<&str, &str> = config
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            tab.set_extra_http_headers(headers)
                .map_err(|e| Error::CdpError(format!("Failed to set headers: {}", e)))?;
        }

        tab.navigate_to(url)
            .map_err(|e| Error::CdpError(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::CdpError(format!("Wait for navigation failed: {}", e)))?;
        log::info!("loaded {} for capture", url);

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn measure(&self, region_id: &str) -> Result<Extent> {
        let id_literal = serde_json::to_string(region_id)
            .map_err(|e| Error::Other(format!("Cannot quote region id: {}", e)))?;
        let script = format!(
            r#"(function() {{
                const el = document.getElementById({id});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return JSON.stringify({{
                    x: r.left + window.scrollX,
                    y: r.top + window.scrollY,
                    width: Math.max(el.scrollWidth, r.width),
                    height: Math.max(el.scrollHeight, r.height)
                }});
            }})()"#,
            id = id_literal
        );
        let eval = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| Error::CaptureError(format!("Measuring '{}' failed: {}", region_id, e)))?;

        match eval.value {
            Some(serde_json::Value::String(raw)) => serde_json::from_str(&raw)
                .map_err(|e| Error::CaptureError(format!("Bad extent for '{}': {}", region_id, e))),
            _ => Err(Error::RegionNotFound(region_id.to_string())),
        }
    }
}

impl Rasterizer for CdpRasterizer {
    fn capture(&mut self, region_id: &str, request: &CaptureRequest) -> Result<CapturedRegion> {
        let extent = self.measure(region_id)?;
        let width = request.width.map(f64::from).unwrap_or(extent.width);
        let height = request.height.map(f64::from).unwrap_or(extent.height);
        if width < 1.0 || height < 1.0 {
            return Err(Error::EmptyCapture);
        }
        if request.allow_cross_origin {
            log::debug!("cross-origin images are drawn as loaded by the page");
        }

        let crate::Rgb(r, g, b) = request.background;
        self.tab
            .call_method(Emulation::SetDefaultBackgroundColorOverride {
                color: Some(DOM::RGBA {
                    r: u32::from(r),
                    g: u32::from(g),
                    b: u32::from(b),
                    a: Some(1.0),
                }),
            })
            .map_err(|e| Error::CaptureError(format!("Failed to set background: {}", e)))?;

        let clip = Page::Viewport {
            x: extent.x,
            y: extent.y,
            width,
            height,
            scale: request.scale,
        };
        let png = self
            .tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(|e| Error::CaptureError(format!("Screenshot of '{}' failed: {}", region_id, e)))?;

        let captured = CapturedRegion::from_encoded(png)?;
        log::debug!(
            "captured #{} ({}x{} css px) at {}x{}px",
            region_id,
            width,
            height,
            captured.pixel_width,
            captured.pixel_height
        );
        Ok(captured)
    }
}
