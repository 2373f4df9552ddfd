//! Response normalization
//!
//! Every backend response goes through three passes:
//! 1. attribute sanitization (`on*` handlers, `javascript:` links) on the
//!    parsed fragment
//! 2. unwrapping of known page wrappers, then of a lone `<pre>` block
//! 3. removal of paragraph wrappers around `[imageN]` markers
//!
//! The result is stable: normalizing normalized content returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

/// CSS classes of the containers chat pages render answers into
const WRAPPER_SELECTOR: &str = ".markdown, .ds-markdown, .model-response-text";

/// Upper bound for nested wrappers and entity decoding rounds
const MAX_ROUNDS: usize = 8;

/// Attributes holding a URL the browser may navigate to or load
const URL_ATTRIBUTES: [&str; 4] = ["href", "src", "action", "formaction"];

static DOUBLE_ENTITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&amp;(#?[a-zA-Z0-9]+;)").unwrap());

static MARKER_PARAGRAPH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<p>\s*(\[image\d+\])\s*</p>").unwrap());

/// Normalizes a raw backend response. Never fails: on any internal problem
/// the original content is returned.
pub fn normalize(raw: &str) -> String {
    match try_normalize(raw) {
        Some(normalized) => normalized,
        None => {
            tracing::debug!("Normalization skipped, returning raw content");
            raw.to_string()
        }
    }
}

fn try_normalize(raw: &str) -> Option<String> {
    let sanitized = sanitize_attributes(raw);

    let content = match unwrap_wrappers(&sanitized)? {
        Some(inner) => MARKER_PARAGRAPH_PATTERN
            .replace_all(&inner, "\n$1\n")
            .into_owned(),
        None => sanitized,
    };

    let content = unwrap_code_block(&content).unwrap_or(content);

    Some(decode_double_entities(&content))
}

/// Strips event handlers and script URLs from every element.
/// Content with nothing to strip is returned as is.
fn sanitize_attributes(content: &str) -> String {
    let mut fragment = Html::parse_fragment(content);

    let flagged: Vec<_> = fragment
        .tree
        .nodes()
        .filter(|node| {
            node.value().as_element().is_some_and(|element| {
                element
                    .attrs()
                    .any(|(name, value)| !is_safe_attribute(name, value))
            })
        })
        .map(|node| node.id())
        .collect();

    if flagged.is_empty() {
        return content.to_string();
    }

    for id in flagged {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            if let Node::Element(element) = node.value() {
                element
                    .attrs
                    .retain(|name, value| is_safe_attribute(&name.local, value));
            }
        }
    }

    fragment.root_element().inner_html()
}

fn is_safe_attribute(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();

    if name.starts_with("on") {
        return false;
    }

    if URL_ATTRIBUTES.contains(&name.as_str()) {
        // Browsers ignore whitespace and control characters inside the scheme
        let scheme: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control())
            .take("javascript:".len())
            .collect();
        return !scheme.eq_ignore_ascii_case("javascript:");
    }

    true
}

/// Inner HTML of the outermost wrapper, repeated while wrappers remain.
/// `Some(None)` when no wrapper is present.
fn unwrap_wrappers(content: &str) -> Option<Option<String>> {
    let selector = Selector::parse(WRAPPER_SELECTOR).ok()?;
    let mut current: Option<String> = None;

    for _ in 0..MAX_ROUNDS {
        let source = current.as_deref().unwrap_or(content);
        let fragment = Html::parse_fragment(source);

        match fragment.select(&selector).next() {
            Some(wrapper) => current = Some(wrapper.inner_html()),
            None => break,
        }
    }

    Some(current)
}

/// Plain text of a response made of a single `<pre>` block
fn unwrap_code_block(content: &str) -> Option<String> {
    let fragment = Html::parse_fragment(content);
    let root = fragment.root_element();
    let mut block: Option<ElementRef<'_>> = None;

    for node in root.children() {
        if let Some(element) = ElementRef::wrap(node) {
            if block.is_some() || element.value().name() != "pre" {
                return None;
            }
            block = Some(element);
        } else if let Some(text) = node.value().as_text() {
            if !text.trim().is_empty() {
                return None;
            }
        }
    }

    let code: String = block?.text().collect();

    // Decoded entities must not turn into live markup
    if contains_elements(&code) {
        Some(escape_markup(&code))
    } else {
        Some(code)
    }
}

fn contains_elements(text: &str) -> bool {
    Html::parse_fragment(text)
        .root_element()
        .children()
        .any(|node| node.value().is_element())
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `&amp;lt;` -> `&lt;`, repeated until nothing changes
fn decode_double_entities(content: &str) -> String {
    let mut current = content.to_string();

    for _ in 0..MAX_ROUNDS {
        let decoded = DOUBLE_ENTITY_PATTERN.replace_all(&current, "&$1");
        if decoded == current {
            break;
        }
        current = decoded.into_owned();
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(normalize("Hello world"), "Hello world");
    }

    #[test]
    fn test_strips_event_handlers() {
        let out = normalize(r#"<p onclick="steal()" class="a">Hi</p><img src="x.png" ONERROR='bad()'>"#);

        assert_eq!(out, r#"<p class="a">Hi</p><img src="x.png">"#);
    }

    #[test]
    fn test_strips_javascript_urls() {
        let out = normalize(r#"<a href=" JavaScript:alert(1)">x</a><a href="https://ok.example">y</a>"#);

        assert_eq!(out, r#"<a>x</a><a href="https://ok.example">y</a>"#);
    }

    #[test]
    fn test_strips_handlers_behind_unusual_syntax() {
        let out = normalize("<svg/onload=alert(1)>");
        assert!(out.starts_with("<svg"));
        assert!(!out.contains("onload"));

        let out = normalize(r#"<a title="x>" onclick="steal()">y</a>"#);
        assert!(!out.contains("onclick"));
        assert!(out.contains(r#"title="x>""#));
        assert!(out.ends_with(">y</a>"));

        assert_eq!(normalize("<IMG SRC=x.png OnError=bad()>"), r#"<img src="x.png">"#);
        assert_eq!(normalize(r#"<a href="java&#x09;script:alert(1)">x</a>"#), "<a>x</a>");
    }

    #[test]
    fn test_clean_markup_is_not_reserialized() {
        let raw = "<p class='lead'>Fish &amp; chips</p>\n[image1]\n<p>a < b</p>";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn test_code_block_with_encoded_markup_stays_inert() {
        let raw = r#"<pre><code>&lt;img src=x onerror="bad()"&gt;</code></pre>"#;
        let out = normalize(raw);

        assert_eq!(out, r#"&lt;img src=x onerror="bad()"&gt;"#);
        assert_eq!(normalize(&out), out);
    }

    #[test]
    fn test_code_block_inside_wrapper_is_unwrapped() {
        let raw = r#"<div class="markdown"><pre><code>let x = 1;</code></pre></div>"#;
        assert_eq!(normalize(raw), "let x = 1;");
    }

    #[test]
    fn test_prose_mentioning_handlers_is_kept() {
        let text = "Set onload = init in your code";
        assert_eq!(normalize(text), text);
    }

    #[test]
    fn test_unwraps_markdown_container() {
        let raw = r#"<div class="markdown prose"><p>Answer</p><p>[image1]</p></div>"#;
        let out = normalize(raw);

        assert!(!out.contains("markdown"));
        assert!(out.contains("<p>Answer</p>"));
        assert!(out.contains("\n[image1]\n"));
        assert!(!out.contains("<p>[image1]</p>"));
    }

    #[test]
    fn test_unwraps_nested_wrappers() {
        let raw = r#"<div class="model-response-text"><div class="ds-markdown"><p>Deep</p></div></div>"#;
        assert_eq!(normalize(raw), "<p>Deep</p>");
    }

    #[test]
    fn test_extracts_single_code_block() {
        let raw = "<pre><code><span class=\"kw\">fn</span> main() { a &lt; b }</code></pre>";
        assert_eq!(normalize(raw), "fn main() { a < b }");
    }

    #[test]
    fn test_two_blocks_are_not_unwrapped() {
        let raw = "<pre>a</pre><pre>b</pre>";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn test_decodes_double_encoded_entities() {
        assert_eq!(normalize("a &amp;amp;lt; b"), "a &lt; b");
        assert_eq!(normalize("x &amp;#39; y"), "x &#39; y");
    }

    #[test]
    fn test_marker_paragraph_kept_outside_wrapper() {
        let raw = "<p>[image1]</p>";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Plain answer",
            r#"<div class="markdown"><h2>Title</h2><p onmouseover="x()">Body &amp;amp;gt;</p><p>[image2]</p></div>"#,
            "<pre><code>let x = 1;</code></pre>",
            r#"<ul><li><a href="javascript:void(0)">a</a></li></ul>"#,
            "text &amp;lt;b&amp;gt;",
            r#"<pre><code>&lt;img src=x onerror="bad()"&gt;</code></pre>"#,
            r#"<pre>&lt;div class="markdown"&gt;&lt;pre&gt;x&lt;/pre&gt;&lt;/div&gt;</pre>"#,
            r#"<div class="markdown"><pre>a &amp;lt; b</pre></div>"#,
            "<svg/onload=alert(1)><p title='x>' onclick=y()>z</p>",
        ];

        for sample in samples {
            let once = normalize(sample);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
        }
    }
}
