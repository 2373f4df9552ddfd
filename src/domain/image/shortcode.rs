//! `[imageN]` markers and the text around them

use once_cell::sync::Lazy;
use regex::Regex;

/// Blocks shorter than this are skipped when looking for context
const MIN_CONTEXT_CHARS: usize = 40;

/// Fallback context length taken from the end of the preceding text
const FALLBACK_CONTEXT_CHARS: usize = 200;

const MAX_QUERY_WORDS: usize = 12;
const MAX_QUERY_CHARS: usize = 100;
const MAX_ALT_CHARS: usize = 120;

static SHORTCODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[image(\d+)\]").unwrap());

static BLOCK_TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|h[1-6]|li|ul|ol|br|blockquote|pre|tr|table|section)\b[^>]*>")
        .unwrap()
});

static ANY_TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// A marker found in a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
    /// Marker text, e.g. `[image2]`
    pub text: String,
    pub number: usize,
    /// Byte offsets in the scanned text
    pub start: usize,
    pub end: usize,
    /// Paragraph preceding the marker
    pub context: String,
}

/// Markers of `content` in document order, each with its context
pub fn find_shortcodes(content: &str) -> Vec<Shortcode> {
    SHORTCODE_PATTERN
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;

            Some(Shortcode {
                text: whole.as_str().to_string(),
                number,
                start: whole.start(),
                end: whole.end(),
                context: context_before(&content[..whole.start()]),
            })
        })
        .collect()
}

/// Nearest preceding block longer than 40 characters, or the last 200
/// characters of the preceding text
pub fn context_before(preceding: &str) -> String {
    let text = BLOCK_TAG_PATTERN.replace_all(preceding, "\n");
    let text = ANY_TAG_PATTERN.replace_all(&text, "");
    let text = SHORTCODE_PATTERN.replace_all(&text, "");

    let nearest = text
        .split('\n')
        .rev()
        .map(collapse_whitespace)
        .find(|block| block.chars().count() > MIN_CONTEXT_CHARS);

    match nearest {
        Some(block) => block,
        None => {
            let flat = collapse_whitespace(&text);
            let skip = flat.chars().count().saturating_sub(FALLBACK_CONTEXT_CHARS);
            flat.chars().skip(skip).collect()
        }
    }
}

/// Search query: first 12 words of the context, at most 100 characters
pub fn build_query(context: &str) -> String {
    let words = context
        .split_whitespace()
        .take(MAX_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    truncate_chars(&words, MAX_QUERY_CHARS)
}

/// Alt text for an inserted image, safe inside a double-quoted attribute
pub fn alt_text(context: &str) -> String {
    truncate_chars(context, MAX_ALT_CHARS)
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    text.chars().take(max).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "The lighthouse keeper climbed the stairs every evening at dusk";

    #[test]
    fn test_finds_shortcodes_in_order() {
        let content = format!("<p>{}</p>\n[image1]\n<p>Short.</p>\n[image2]", LONG);
        let found = find_shortcodes(&content);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "[image1]");
        assert_eq!(found[1].number, 2);
        assert_eq!(&content[found[1].start..found[1].end], "[image2]");
    }

    #[test]
    fn test_context_skips_short_blocks() {
        let preceding = format!("<p>{}</p>\n<p>Short.</p>\n", LONG);
        assert_eq!(context_before(&preceding), LONG);
    }

    #[test]
    fn test_context_falls_back_to_tail() {
        let preceding = "Tiny. Also tiny.\nThird.";
        assert_eq!(context_before(preceding), "Tiny. Also tiny. Third.");

        let long_line = "word ".repeat(30);
        let parts = format!("{}\n", long_line.replace(' ', "\n"));
        let context = context_before(&parts);
        assert!(context.chars().count() <= 200);
        assert!(context.ends_with("word"));
    }

    #[test]
    fn test_context_strips_inline_tags() {
        let preceding = format!("<p><strong>Bold</strong> {}</p>", LONG);
        assert_eq!(context_before(&preceding), format!("Bold {}", LONG));
    }

    #[test]
    fn test_build_query_limits_words() {
        let query = build_query("one two three four five six seven eight nine ten eleven twelve thirteen");
        assert_eq!(query, "one two three four five six seven eight nine ten eleven twelve");
    }

    #[test]
    fn test_build_query_limits_length() {
        let word = "x".repeat(30);
        let query = build_query(&format!("{w} {w} {w} {w}", w = word));
        assert!(query.chars().count() <= 100);
    }

    #[test]
    fn test_alt_text_escapes_quotes() {
        assert_eq!(alt_text(r#"a "quoted" <b>"#), "a &quot;quoted&quot; &lt;b&gt;");
    }
}
