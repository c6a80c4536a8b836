use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, Tab};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::SmokeError;

/// How a UI element is addressed. The widget's inputs carry stable ids (CSS),
/// but its action buttons are only distinguishable by their visible label.
#[derive(Debug, Clone)]
pub enum Locator {
    Css(String),
    Text { tag: String, needle: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn button(label: impl Into<String>) -> Self {
        Locator::Text {
            tag: "button".into(),
            needle: label.into(),
        }
    }

    pub fn text(tag: impl Into<String>, needle: impl Into<String>) -> Self {
        Locator::Text {
            tag: tag.into(),
            needle: needle.into(),
        }
    }

    /// JS expression yielding the element or null, with `doc` in scope.
    fn js_lookup(&self) -> String {
        match self {
            Locator::Css(selector) => format!("doc.querySelector({})", js_string(selector)),
            Locator::Text { tag, needle } => format!(
                "Array.from(doc.querySelectorAll({})).find((el) => el.textContent.trim().includes({})) || null",
                js_string(tag),
                js_string(needle)
            ),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "{selector}"),
            Locator::Text { tag, needle } => write!(f, "{tag}[text*={needle:?}]"),
        }
    }
}

/// Quote a string for embedding in generated JavaScript.
fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Script that overwrites a field's content and reports the value it holds
/// afterwards. Select-then-assign, never append: leftovers from autofill or a
/// previous run cannot survive it, and repeating it with a different value
/// leaves exactly that value.
fn set_value_script(doc_expr: &str, lookup: &str, value: &str) -> String {
    format!(
        r#"(() => {{
            const doc = {doc_expr};
            const el = {lookup};
            if (!el) throw new Error("element not found");
            el.focus();
            if (el.select) el.select();
            el.value = {value_js};
            el.dispatchEvent(new Event("input", {{ bubbles: true }}));
            el.dispatchEvent(new Event("change", {{ bubbles: true }}));
            return el.value;
        }})()"#,
        value_js = js_string(value),
    )
}

/// Accessor chain from the top document down through a nested frame path.
/// Frames are not sibling-addressable: traversal always starts at the top
/// document, so switching frames means rebuilding this chain from the root.
fn frame_document_expr(frames: &[String]) -> String {
    let mut expr = String::from("document");
    for frame_id in frames {
        expr = format!("{expr}.getElementById({}).contentDocument", js_string(frame_id));
    }
    expr
}

/// One browser instance plus its open tabs. All DOM access goes through
/// JavaScript evaluated in the active tab, scoped to the current frame path.
/// The underlying browser process dies with this value.
pub struct BrowserSession {
    browser: Browser,
    tabs: Vec<Arc<Tab>>,
    active: usize,
    frame_path: Vec<String>,
    wait_timeout: Duration,
}

impl BrowserSession {
    pub fn launch(config: &BrowserConfig) -> Result<Self, SmokeError> {
        let mut extra_args: Vec<OsString> = Vec::new();

        // Required for running in CI containers
        extra_args.push(OsString::from("--no-sandbox"));
        extra_args.push(OsString::from("--disable-dev-shm-usage"));
        extra_args.push(OsString::from("--disable-gpu"));
        extra_args.push(OsString::from(format!("--user-agent={}", config.user_agent)));

        let mut builder = headless_chrome::LaunchOptionsBuilder::default();
        builder
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            // The OTP step can sit quietly for minutes; don't let the idle
            // watchdog reap the browser underneath it.
            .idle_browser_timeout(Duration::from_secs(config.wait_timeout_seconds * 10))
            .args(extra_args.iter().map(|a| a.as_ref()).collect());

        // Use CHROME_PATH env var if set (for Docker/custom installs)
        if let Ok(chrome_path) = std::env::var("CHROME_PATH") {
            builder.path(Some(std::path::PathBuf::from(chrome_path)));
        }

        let launch_options = builder
            .build()
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        let browser = Browser::new(launch_options).map_err(|e| SmokeError::Browser(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| SmokeError::Browser(e.to_string()))?;

        info!("browser launched (headless={})", config.headless);

        Ok(Self {
            browser,
            tabs: vec![tab],
            active: 0,
            frame_path: Vec::new(),
            wait_timeout: Duration::from_secs(config.wait_timeout_seconds),
        })
    }

    fn tab(&self) -> &Arc<Tab> {
        &self.tabs[self.active]
    }

    pub fn navigate(&mut self, url: &str) -> Result<(), SmokeError> {
        info!("navigating to {url}");
        self.frame_path.clear();
        let tab = self.tab();
        tab.navigate_to(url)
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        Ok(())
    }

    /// Reload the active tab. Used by the webmail inbox between poll attempts.
    pub fn refresh(&mut self) -> Result<(), SmokeError> {
        self.frame_path.clear();
        let tab = self.tab();
        tab.reload(false, None)
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        Ok(())
    }

    /// Open a new tab and make it active. Returns its index.
    pub fn open_new_tab(&mut self) -> Result<usize, SmokeError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        self.tabs.push(tab);
        self.active = self.tabs.len() - 1;
        self.frame_path.clear();
        debug!("opened tab {}", self.active);
        Ok(self.active)
    }

    pub fn switch_to_tab(&mut self, index: usize) -> Result<(), SmokeError> {
        if index >= self.tabs.len() {
            return Err(SmokeError::Browser(format!(
                "no tab at index {index} ({} open)",
                self.tabs.len()
            )));
        }
        self.active = index;
        self.frame_path.clear();
        Ok(())
    }

    /// Close the active tab and fall back to the first one.
    pub fn close_current_tab(&mut self) -> Result<(), SmokeError> {
        if self.tabs.len() == 1 {
            return Err(SmokeError::Browser("cannot close the last tab".into()));
        }
        let tab = self.tabs.remove(self.active);
        if let Err(e) = tab.close(true) {
            warn!("closing tab failed: {e}");
        }
        self.active = 0;
        self.frame_path.clear();
        Ok(())
    }

    pub fn exit_to_top_frame(&mut self) {
        self.frame_path.clear();
    }

    /// Descend into a nested frame, waiting for its document to be reachable.
    pub async fn enter_frame(&mut self, frame_id: &str) -> Result<(), SmokeError> {
        let timeout = self.wait_timeout;
        self.enter_frame_within(frame_id, timeout).await
    }

    pub async fn enter_frame_within(
        &mut self,
        frame_id: &str,
        timeout: Duration,
    ) -> Result<(), SmokeError> {
        let mut candidate = self.frame_path.clone();
        candidate.push(frame_id.to_string());

        let doc_expr = frame_document_expr(&candidate);
        let predicate = format!(
            "(() => {{ try {{ const doc = {doc_expr}; return !!(doc && doc.readyState); }} catch (e) {{ return false; }} }})()"
        );

        if self.wait_for(&predicate, timeout).await? {
            debug!("entered frame {frame_id}");
            self.frame_path = candidate;
            Ok(())
        } else {
            Err(SmokeError::FrameUnavailable(frame_id.to_string()))
        }
    }

    fn eval(&self, expression: &str) -> Result<Option<serde_json::Value>, SmokeError> {
        let result = self
            .tab()
            .evaluate(expression, false)
            .map_err(|e| SmokeError::Browser(e.to_string()))?;
        Ok(result.value)
    }

    /// Poll a boolean JS predicate with exponential backoff until it holds or
    /// the deadline passes. Backoff starts at 100ms and caps at 1s.
    async fn wait_for(&self, predicate: &str, timeout: Duration) -> Result<bool, SmokeError> {
        let start = Instant::now();
        let mut poll_interval = Duration::from_millis(100);
        let max_interval = Duration::from_secs(1);

        loop {
            let holds = self
                .eval(predicate)
                .ok()
                .flatten()
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if holds {
                return Ok(true);
            }

            if start.elapsed() >= timeout {
                return Ok(false);
            }

            tokio::time::sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }

    fn condition_js(&self, locator: &Locator, clickable: bool) -> String {
        let doc_expr = frame_document_expr(&self.frame_path);
        let lookup = locator.js_lookup();
        let extra = if clickable { " && !el.disabled" } else { "" };
        format!(
            "(() => {{ try {{ const doc = {doc_expr}; const el = {lookup}; if (!el) return false; \
             const rect = el.getBoundingClientRect(); \
             return rect.width > 0 && rect.height > 0{extra}; }} catch (e) {{ return false; }} }})()"
        )
    }

    pub async fn wait_until_visible(&self, locator: &Locator) -> Result<(), SmokeError> {
        self.wait_until_visible_within(locator, self.wait_timeout).await
    }

    pub async fn wait_until_visible_within(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<(), SmokeError> {
        if self.wait_for(&self.condition_js(locator, false), timeout).await? {
            Ok(())
        } else {
            Err(SmokeError::ElementNotFound {
                locator: locator.to_string(),
                waited: timeout,
            })
        }
    }

    pub async fn wait_until_clickable(&self, locator: &Locator) -> Result<(), SmokeError> {
        if self
            .wait_for(&self.condition_js(locator, true), self.wait_timeout)
            .await?
        {
            Ok(())
        } else {
            Err(SmokeError::ElementNotFound {
                locator: locator.to_string(),
                waited: self.wait_timeout,
            })
        }
    }

    /// Type into a field with replace semantics: whatever was there before
    /// (autofill, a previous run's leftovers) is selected and overwritten, and
    /// the result is read back so the field is known to hold exactly `value`.
    pub async fn set_field_value(&self, locator: &Locator, value: &str) -> Result<(), SmokeError> {
        self.wait_until_visible(locator).await?;

        let doc_expr = frame_document_expr(&self.frame_path);
        let js = set_value_script(&doc_expr, &locator.js_lookup(), value);

        let written = self
            .eval(&js)?
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        if written != value {
            return Err(SmokeError::Browser(format!(
                "field {locator} holds {written:?} after typing"
            )));
        }
        debug!("set {locator}");
        Ok(())
    }

    /// Read a field's current value, or None if the element is missing.
    pub fn field_value(&self, locator: &Locator) -> Result<Option<String>, SmokeError> {
        let doc_expr = frame_document_expr(&self.frame_path);
        let lookup = locator.js_lookup();
        let js = format!(
            "(() => {{ const doc = {doc_expr}; const el = {lookup}; \
             return (el && typeof el.value === \"string\") ? el.value : null; }})()"
        );
        Ok(self.eval(&js)?.and_then(|v| v.as_str().map(String::from)))
    }

    /// Click that survives overlay widgets intercepting native events. Waits
    /// for clickability, tries a trusted input-domain click at the top
    /// document, and falls back to a script-dispatched click. Inside a frame
    /// trusted input cannot be routed, so the scripted path is used directly.
    pub async fn click_robust(&self, locator: &Locator) -> Result<(), SmokeError> {
        self.wait_until_clickable(locator).await?;

        if self.frame_path.is_empty() {
            if let Locator::Css(selector) = locator {
                match self.tab().find_element(selector).and_then(|el| {
                    el.click()?;
                    Ok(())
                }) {
                    Ok(()) => {
                        debug!("clicked {locator} (native)");
                        return Ok(());
                    }
                    Err(e) => warn!("native click on {locator} failed, falling back to script: {e}"),
                }
            }
        }

        let doc_expr = frame_document_expr(&self.frame_path);
        let lookup = locator.js_lookup();
        let js = format!(
            "(() => {{ const doc = {doc_expr}; const el = {lookup}; \
             if (!el) throw new Error(\"element not found\"); el.click(); return true; }})()"
        );
        self.eval(&js)?;
        debug!("clicked {locator} (scripted)");
        Ok(())
    }

    /// Read an element's rendered text, or None if it is missing.
    pub fn inner_text(&self, locator: &Locator) -> Result<Option<String>, SmokeError> {
        let doc_expr = frame_document_expr(&self.frame_path);
        let lookup = locator.js_lookup();
        let js = format!(
            "(() => {{ try {{ const doc = {doc_expr}; const el = {lookup}; \
             return el ? el.innerText : null; }} catch (e) {{ return null; }} }})()"
        );
        Ok(self.eval(&js)?.and_then(|v| v.as_str().map(String::from)))
    }

    /// Capture the active viewport to `{dir}/{prefix}_{timestamp}.png`.
    pub fn screenshot_to(&self, dir: &Path, prefix: &str) -> Result<PathBuf, SmokeError> {
        std::fs::create_dir_all(dir).map_err(|e| SmokeError::Browser(e.to_string()))?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{prefix}_{timestamp}.png"));

        let screenshot_data = self
            .tab()
            .capture_screenshot(
                headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|e| SmokeError::Browser(e.to_string()))?;

        std::fs::write(&path, screenshot_data).map_err(|e| SmokeError::Browser(e.to_string()))?;
        info!("screenshot saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_backslashes() {
        assert_eq!(js_string("plain"), r#""plain""#);
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
        assert_eq!(js_string(r"a\b"), r#""a\\b""#);
        assert_eq!(js_string("a\nb"), r#""a\nb""#);
    }

    #[test]
    fn frame_expr_chains_through_nested_frames() {
        assert_eq!(frame_document_expr(&[]), "document");
        assert_eq!(
            frame_document_expr(&["outer".into()]),
            r#"document.getElementById("outer").contentDocument"#
        );
        assert_eq!(
            frame_document_expr(&["outer".into(), "inner".into()]),
            r#"document.getElementById("outer").contentDocument.getElementById("inner").contentDocument"#
        );
    }

    #[test]
    fn css_locator_uses_query_selector() {
        let lookup = Locator::css("#email-input").js_lookup();
        assert_eq!(lookup, r##"doc.querySelector("#email-input")"##);
    }

    #[test]
    fn text_locator_matches_trimmed_label() {
        let lookup = Locator::button("Sign Up").js_lookup();
        assert!(lookup.contains(r#"doc.querySelectorAll("button")"#));
        assert!(lookup.contains(r#"includes("Sign Up")"#));
        assert!(lookup.ends_with("|| null"));
    }

    #[test]
    fn set_value_script_replaces_rather_than_appends() {
        let script = set_value_script("document", r##"doc.querySelector("#unified-id-input")"##, "id12345");
        // Existing content is selected away and the value assigned outright.
        assert!(script.contains("el.select()"));
        assert!(script.contains(r#"el.value = "id12345""#));
        assert!(!script.contains("el.value +="));
        // The field reports what it actually holds for read-back verification.
        assert!(script.trim_end().ends_with("})()"));
        assert!(script.contains("return el.value;"));
    }

    #[test]
    fn locator_display_is_readable() {
        assert_eq!(Locator::css("#pin-input-0").to_string(), "#pin-input-0");
        assert_eq!(Locator::button("Next").to_string(), r#"button[text*="Next"]"#);
    }
}
