//! Element interaction on top of the script execution primitive.
//!
//! Each operation is a JavaScript template resolved against a CSS
//! selector and run in the page via [`CdpClient::evaluate`]. The page
//! answers with a structured value carrying a boolean discriminator
//! (`found` for inspection, `success` for writes and clicks); a `false`
//! discriminator is a *semantic* negative (element missing, not editable,
//! hidden, disabled), which is a normal return here; only round-trip
//! failures surface as [`BrowserError`].
//!
//! Writes and clicks fire several independent strategies per call rather
//! than probing which one the page needs; pages wire their listeners
//! differently, and redundant no-op triggers are tolerated.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cdp::CdpClient;
use crate::error::BrowserError;

/// Default per-command deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What the page reported about one element, at the moment of the call.
/// Never cached; the DOM may mutate between calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    /// First 100 characters of the element's inner markup.
    #[serde(rename = "innerHTML", default)]
    pub inner_html: Option<String>,
    /// First 200 characters of the element's outer markup.
    #[serde(rename = "outerHTML", default)]
    pub outer_html: Option<String>,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub is_content_editable: bool,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub is_button: bool,
    /// Set when the inspection script itself threw.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Result of a write or click operation: one script round trip, never
/// aggregated across retries (retry policy belongs to the caller).
#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub success: bool,
    /// Operation-specific fields as returned by the page (text echo and
    /// verification for writes, element/parent info for clicks).
    pub detail: Value,
    pub error: Option<String>,
    pub stack: Option<String>,
}

/// Interpret the structured value a write/click script returned.
pub fn interpret_outcome(value: Value) -> InteractionOutcome {
    let success = value
        .get("success")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let error = value
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let stack = value
        .get("stack")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    InteractionOutcome {
        success,
        detail: value,
        error,
        stack,
    }
}

// ---------------------------------------------------------------------------
// Selector handling and script templates
// ---------------------------------------------------------------------------

/// Escape a string for interpolation inside a single-quoted JS literal.
pub fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Unwrap a selector given in `document.querySelector("...")` form to the
/// bare selector; anything else passes through unchanged.
pub fn normalize_selector(raw: &str) -> &str {
    let inner = match raw
        .strip_prefix("document.querySelector(")
        .and_then(|r| r.strip_suffix(')'))
    {
        Some(i) => i.trim(),
        None => return raw,
    };
    let bytes = inner.as_bytes();
    if inner.len() >= 2 {
        let (first, last) = (bytes[0], bytes[inner.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &inner[1..inner.len() - 1];
        }
    }
    raw
}

/// Inspection template: resolve the selector and describe the element.
pub fn build_inspect_script(selector: &str) -> String {
    let sel = escape_js(selector);
    format!(
        r#"
        try {{
            const element = document.querySelector('{sel}');
            if (!element) {{
                return {{ found: false }};
            }}
            const style = window.getComputedStyle(element);
            return {{
                found: true,
                tagName: element.tagName,
                id: element.id,
                className: element.className,
                innerHTML: element.innerHTML.substring(0, 100),
                outerHTML: element.outerHTML.substring(0, 200),
                isVisible: style.display !== 'none' && style.visibility !== 'hidden',
                isContentEditable: element.isContentEditable,
                isConnected: element.isConnected,
                isDisabled: element.disabled !== undefined ? element.disabled : false,
                isButton: element.tagName.toLowerCase() === 'button' ||
                          element.type === 'button' ||
                          element.type === 'submit' ||
                          element.role === 'button'
            }};
        }} catch (e) {{
            return {{
                found: false,
                error: e.toString(),
                stack: e.stack || 'no stack available'
            }};
        }}"#
    )
}

/// Write template: reject non-editable targets, then apply every write
/// strategy the element class supports and verify by substring.
pub fn build_set_text_script(selector: &str, text: &str) -> String {
    let sel = escape_js(selector);
    let payload = escape_js(text);
    format!(
        r#"
        try {{
            const element = document.querySelector('{sel}');
            if (!element) {{
                return {{ success: false, error: 'element not found' }};
            }}
            const tag = element.tagName.toLowerCase();
            if (!element.isContentEditable && tag !== 'input' && tag !== 'textarea') {{
                return {{ success: false, error: 'element not editable' }};
            }}
            const payload = '{payload}';
            if (element.isContentEditable) {{
                element.innerHTML = payload;
                element.focus();
                const range = document.createRange();
                range.selectNodeContents(element);
                const selection = window.getSelection();
                selection.removeAllRanges();
                selection.addRange(range);
                document.execCommand('delete', false, null);
                document.execCommand('insertText', false, payload);
            }} else {{
                element.value = payload;
                element.dispatchEvent(new Event('input', {{ bubbles: true }}));
                element.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }}
            const content = element.isContentEditable ? element.textContent : element.value;
            return {{
                success: true,
                inputText: payload,
                actualContent: content.substring(0, 100),
                match: content.includes(payload)
            }};
        }} catch (e) {{
            return {{
                success: false,
                error: e.toString(),
                stack: e.stack || 'no stack available'
            }};
        }}"#
    )
}

/// Click template: reject hidden or disabled targets, then fire a direct
/// activation, a synthesized pointer sequence, and a parent fallback for
/// non-interactive wrappers inside button-like parents.
pub fn build_click_script(selector: &str) -> String {
    let sel = escape_js(selector);
    format!(
        r#"
        try {{
            const element = document.querySelector('{sel}');
            if (!element) {{
                return {{ success: false, error: 'element not found' }};
            }}
            const style = window.getComputedStyle(element);
            if (style.display === 'none' || style.visibility === 'hidden') {{
                return {{ success: false, error: 'element not visible' }};
            }}
            if (element.disabled !== undefined && element.disabled) {{
                return {{ success: false, error: 'element disabled' }};
            }}
            element.click();
            const events = [
                new MouseEvent('mouseover', {{ bubbles: true, cancelable: true }}),
                new MouseEvent('mousedown', {{ bubbles: true, cancelable: true }}),
                new MouseEvent('mouseup', {{ bubbles: true, cancelable: true }}),
                new MouseEvent('click', {{ bubbles: true, cancelable: true }})
            ];
            events.forEach(event => element.dispatchEvent(event));
            const parent = element.parentElement;
            if (parent && element.tagName.toLowerCase() === 'span' &&
                (parent.tagName.toLowerCase() === 'button' ||
                 parent.type === 'button' ||
                 parent.type === 'submit')) {{
                parent.click();
            }}
            return {{
                success: true,
                elementInfo: {{
                    tagName: element.tagName,
                    id: element.id,
                    className: element.className,
                    parentTag: parent ? parent.tagName : null,
                    parentId: parent ? parent.id : null
                }}
            }};
        }} catch (e) {{
            return {{
                success: false,
                error: e.toString(),
                stack: e.stack || 'no stack available'
            }};
        }}"#
    )
}

// ---------------------------------------------------------------------------
// PageDriver
// ---------------------------------------------------------------------------

/// High-level driver for one page target.
///
/// Owns the [`CdpClient`] and turns script round trips into typed
/// results. Sequencing of multiple calls and any retry policy belong to
/// the caller.
pub struct PageDriver {
    client: CdpClient,
    timeout: Duration,
}

impl PageDriver {
    /// Connect to a page target's WebSocket debugger URL.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let client = CdpClient::connect(ws_url).await?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client (for tests and advanced use).
    pub fn from_client(client: CdpClient) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-command deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Direct access to the underlying client.
    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    /// Close the underlying channel.
    pub async fn close(&self) {
        self.client.close().await;
    }

    /// Locate an element and describe it.
    ///
    /// `{found: false}` with no error means the selector matched nothing;
    /// `{found: false, error: ...}` means the inspection script threw.
    /// Selectors in `document.querySelector("...")` form are unwrapped
    /// to the inner selector first.
    pub async fn inspect(&self, selector: &str) -> Result<ElementDescriptor, BrowserError> {
        let selector = normalize_selector(selector);
        info!(selector, "inspecting element");

        let script = build_inspect_script(selector);
        let value = self.client.evaluate(&script, self.timeout).await?;
        let descriptor: ElementDescriptor =
            serde_json::from_value(value.clone()).map_err(|e| BrowserError::Evaluation {
                detail: format!("malformed element descriptor: {e}"),
                raw: value,
            })?;

        if descriptor.found {
            info!(
                tag = descriptor.tag_name.as_deref().unwrap_or(""),
                id = descriptor.id.as_deref().unwrap_or(""),
                class = descriptor.class_name.as_deref().unwrap_or(""),
                visible = descriptor.is_visible,
                editable = descriptor.is_content_editable,
                connected = descriptor.is_connected,
                disabled = descriptor.is_disabled,
                button = descriptor.is_button,
                "element found"
            );
            info!(
                html = descriptor.inner_html.as_deref().unwrap_or(""),
                "element markup snippet"
            );
        } else {
            match &descriptor.error {
                Some(error) => {
                    warn!(selector, error = %error, "inspection script threw");
                    if let Some(stack) = &descriptor.stack {
                        warn!(stack = %stack, "inspection error stack");
                    }
                }
                None => warn!(selector, "element not found"),
            }
        }

        Ok(descriptor)
    }

    /// Set text on a content-editable element or an input/textarea.
    ///
    /// Non-editable targets are rejected by the page before any write
    /// strategy runs. Verification is a substring check: the page may
    /// normalize trailing whitespace, and that still counts as success.
    pub async fn set_text(
        &self,
        selector: &str,
        text: &str,
    ) -> Result<InteractionOutcome, BrowserError> {
        info!(selector, text, "setting element text");

        let script = build_set_text_script(selector, text);
        let value = self.client.evaluate(&script, self.timeout).await?;
        let outcome = interpret_outcome(value);

        if outcome.success {
            info!(
                input = outcome.detail["inputText"].as_str().unwrap_or(""),
                actual = outcome.detail["actualContent"].as_str().unwrap_or(""),
                matched = outcome.detail["match"].as_bool().unwrap_or(false),
                "text set"
            );
        } else {
            warn!(
                selector,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "set text failed"
            );
            if let Some(stack) = &outcome.stack {
                warn!(stack = %stack, "set text error stack");
            }
        }

        Ok(outcome)
    }

    /// Click an element.
    ///
    /// Hidden or disabled targets are rejected by the page before any
    /// trigger strategy fires.
    pub async fn click(&self, selector: &str) -> Result<InteractionOutcome, BrowserError> {
        info!(selector, "clicking element");

        let script = build_click_script(selector);
        let value = self.client.evaluate(&script, self.timeout).await?;
        let outcome = interpret_outcome(value);

        if outcome.success {
            let element = &outcome.detail["elementInfo"];
            info!(
                tag = element["tagName"].as_str().unwrap_or(""),
                id = element["id"].as_str().unwrap_or(""),
                parent_tag = element["parentTag"].as_str().unwrap_or(""),
                parent_id = element["parentId"].as_str().unwrap_or(""),
                "element clicked"
            );
        } else {
            warn!(
                selector,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "click failed"
            );
            if let Some(stack) = &outcome.stack {
                warn!(stack = %stack, "click error stack");
            }
        }

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- Selector handling --------------------------------------------------

    #[test]
    fn escape_js_passes_plain_selectors_through() {
        assert_eq!(escape_js("#app > div.main"), "#app > div.main");
    }

    #[test]
    fn escape_js_escapes_quotes_and_backslashes() {
        assert_eq!(escape_js(r#"a[name='x"y']"#), r#"a[name=\'x\"y\']"#);
        assert_eq!(escape_js(r"a\b"), r"a\\b");
    }

    #[test]
    fn escape_js_escapes_control_characters() {
        assert_eq!(escape_js("line1\nline2\ttab"), "line1\\nline2\\ttab");
    }

    #[test]
    fn normalize_selector_unwraps_js_path() {
        assert_eq!(
            normalize_selector(r##"document.querySelector("#send-btn > span")"##),
            "#send-btn > span"
        );
        assert_eq!(
            normalize_selector("document.querySelector('#input')"),
            "#input"
        );
    }

    #[test]
    fn normalize_selector_leaves_plain_selectors_alone() {
        assert_eq!(normalize_selector("#send-btn > span"), "#send-btn > span");
        // Unquoted argument is not a recognized js-path; pass through.
        assert_eq!(
            normalize_selector("document.querySelector(sel)"),
            "document.querySelector(sel)"
        );
    }

    // -- Script templates ---------------------------------------------------

    #[test]
    fn inspect_script_embeds_escaped_selector() {
        let script = build_inspect_script("a[title='x']");
        assert!(script.contains(r"document.querySelector('a[title=\'x\']')"));
        assert!(script.contains("found: true"));
        assert!(script.contains("innerHTML.substring(0, 100)"));
        assert!(script.contains("outerHTML.substring(0, 200)"));
    }

    #[test]
    fn set_text_script_checks_editability_before_writing() {
        let script = build_set_text_script("#editor", "hello");
        let reject = script.find("element not editable").unwrap();
        let write = script.find("element.value = payload").unwrap();
        assert!(reject < write);
        assert!(script.contains("new Event('input', { bubbles: true })"));
        assert!(script.contains("new Event('change', { bubbles: true })"));
        assert!(script.contains("content.includes(payload)"));
    }

    #[test]
    fn set_text_script_escapes_payload() {
        let script = build_set_text_script("#editor", "it's a test");
        assert!(script.contains(r"const payload = 'it\'s a test';"));
    }

    #[test]
    fn click_script_checks_visibility_and_disabled_before_triggers() {
        let script = build_click_script("#btn");
        let hidden = script.find("element not visible").unwrap();
        let disabled = script.find("element disabled").unwrap();
        let trigger = script.find("element.click()").unwrap();
        assert!(hidden < trigger);
        assert!(disabled < trigger);
        assert!(script.contains("mouseover"));
        assert!(script.contains("mousedown"));
        assert!(script.contains("mouseup"));
        assert!(script.contains("parent.click()"));
    }

    // -- Descriptor interpretation ------------------------------------------

    #[test]
    fn descriptor_deserializes_full_shape() {
        let descriptor: ElementDescriptor = serde_json::from_value(json!({
            "found": true,
            "tagName": "DIV",
            "id": "editor",
            "className": "input-box",
            "innerHTML": "<p></p>",
            "outerHTML": "<div id=\"editor\"><p></p></div>",
            "isVisible": true,
            "isContentEditable": true,
            "isConnected": true,
            "isDisabled": false,
            "isButton": false
        }))
        .unwrap();
        assert!(descriptor.found);
        assert_eq!(descriptor.tag_name.as_deref(), Some("DIV"));
        assert!(descriptor.is_content_editable);
        assert!(!descriptor.is_button);
        assert!(descriptor.error.is_none());
    }

    #[test]
    fn not_found_is_distinct_from_script_failure() {
        let missing: ElementDescriptor =
            serde_json::from_value(json!({ "found": false })).unwrap();
        assert!(!missing.found);
        assert!(missing.error.is_none());

        let threw: ElementDescriptor = serde_json::from_value(json!({
            "found": false,
            "error": "SyntaxError: bad selector",
            "stack": "SyntaxError: bad selector\n  at <anonymous>"
        }))
        .unwrap();
        assert!(!threw.found);
        assert_eq!(threw.error.as_deref(), Some("SyntaxError: bad selector"));
    }

    // -- Outcome interpretation ---------------------------------------------

    #[test]
    fn outcome_success_keeps_detail() {
        let outcome = interpret_outcome(json!({
            "success": true,
            "inputText": "hello",
            "actualContent": "hello",
            "match": true
        }));
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.detail["match"], true);
    }

    #[test]
    fn outcome_failure_extracts_error_and_stack() {
        let outcome = interpret_outcome(json!({
            "success": false,
            "error": "element not editable",
            "stack": "at setText"
        }));
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("element not editable"));
        assert_eq!(outcome.stack.as_deref(), Some("at setText"));
    }

    #[test]
    fn outcome_with_missing_discriminator_is_failure() {
        let outcome = interpret_outcome(json!({ "detail": "weird shape" }));
        assert!(!outcome.success);
        assert!(outcome.error.is_none());
    }
}
