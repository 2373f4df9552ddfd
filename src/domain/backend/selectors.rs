//! Page selectors per chat platform
//!
//! Precedence for every selector: explicit step selector (when the step
//! enables custom selectors) > platform default > generic fallback.

use serde::Serialize;

use super::BackendRequest;

/// Chat surfaces recognized from the target URL
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    ChatGpt,
    Claude,
    Gemini,
    DeepSeek,
    Perplexity,
    Generic,
}

struct PlatformDefaults {
    input: &'static str,
    submit: &'static str,
    output: &'static str,
    generating: Option<&'static str>,
    /// Container of the newest assistant turn
    latest_message: Option<&'static str>,
}

const GENERIC: PlatformDefaults = PlatformDefaults {
    input: "textarea, [contenteditable='true'], input[type='text']",
    submit: "button[type='submit']",
    output: ".markdown, .prose, article, .response",
    generating: None,
    latest_message: None,
};

impl Platform {
    /// Detects the platform from URL substrings
    pub fn detect(url: &str) -> Self {
        let url = url.to_lowercase();

        if url.contains("chatgpt.com") || url.contains("chat.openai.com") {
            Self::ChatGpt
        } else if url.contains("claude.ai") {
            Self::Claude
        } else if url.contains("gemini.google.com") {
            Self::Gemini
        } else if url.contains("deepseek.com") {
            Self::DeepSeek
        } else if url.contains("perplexity.ai") {
            Self::Perplexity
        } else {
            Self::Generic
        }
    }

    fn defaults(&self) -> PlatformDefaults {
        match self {
            Self::ChatGpt => PlatformDefaults {
                input: "#prompt-textarea",
                submit: "button[data-testid='send-button']",
                output: ".markdown",
                generating: Some("button[data-testid='stop-button']"),
                latest_message: Some("[data-message-author-role='assistant']"),
            },
            Self::Claude => PlatformDefaults {
                input: "div[contenteditable='true']",
                submit: "button[aria-label='Send message']",
                output: ".font-claude-message",
                generating: Some("button[aria-label='Stop response']"),
                latest_message: Some("[data-is-streaming]"),
            },
            Self::Gemini => PlatformDefaults {
                input: "rich-textarea .ql-editor",
                submit: "button.send-button",
                output: ".model-response-text",
                generating: Some("button.stop"),
                latest_message: Some("model-response"),
            },
            Self::DeepSeek => PlatformDefaults {
                input: "textarea#chat-input",
                submit: "div[role='button'][aria-disabled='false']",
                output: ".ds-markdown",
                generating: Some("div[role='button'] .ds-icon-stop"),
                latest_message: None,
            },
            Self::Perplexity => PlatformDefaults {
                input: "textarea",
                submit: "button[aria-label='Submit']",
                output: ".prose",
                generating: Some("button[aria-label='Stop']"),
                latest_message: None,
            },
            Self::Generic => GENERIC,
        }
    }
}

/// Selectors the automation routine works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelectors {
    pub platform: Platform,
    pub input: String,
    pub submit: String,
    pub output: String,
    pub generating: Option<String>,
    /// Scope used for extraction before falling back to the last output match
    pub latest_message: Option<String>,
}

/// Applies selector precedence for a request
pub fn resolve_selectors(request: &BackendRequest) -> ResolvedSelectors {
    let platform = Platform::detect(&request.url);
    let defaults = platform.defaults();

    let custom = request
        .selectors
        .as_ref()
        .filter(|_| request.use_custom_selectors);

    let pick = |explicit: Option<&String>, platform_default: &str, generic: &str| -> String {
        explicit
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .or(Some(platform_default).filter(|s| !s.is_empty()))
            .unwrap_or(generic)
            .to_string()
    };

    let custom_output = custom.and_then(|c| c.output.as_ref()).filter(|s| !s.trim().is_empty());

    ResolvedSelectors {
        platform,
        input: pick(custom.and_then(|c| c.input.as_ref()), defaults.input, GENERIC.input),
        submit: pick(custom.and_then(|c| c.submit.as_ref()), defaults.submit, GENERIC.submit),
        output: pick(custom_output, defaults.output, GENERIC.output),
        generating: custom
            .and_then(|c| c.generating.as_ref())
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .or(defaults.generating.map(str::to_string)),
        // An explicit output selector is used as written
        latest_message: match custom_output {
            Some(_) => None,
            None => defaults.latest_message.map(str::to_string),
        },
    }
}
