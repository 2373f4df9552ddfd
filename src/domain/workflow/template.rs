//! Prompt and URL template resolution
//!
//! Supported placeholders:
//! - `{{input}}` - primary input, falls back to the raw queue text
//! - `{{input1}}` .. `{{input19}}` - named inputs, empty when missing
//! - `{{prev}}` - response of the preceding step
//! - `{{prevN}}` - response of step N (1-indexed), matched by step id
//! - `{{url_prev}}` / `{{url_prevN}}` - URL visited by a previous step
//!
//! Placeholders with an out-of-range index are left in the text untouched.
//! Substituted values are never scanned again.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::entity::WorkflowStep;
use super::error::WorkflowError;
use crate::domain::queue::StepResult;

/// Highest `{{inputN}}` index
pub const MAX_NAMED_INPUTS: usize = 19;

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(input|prev|url_prev)(\d+)?\}\}").unwrap());

/// Placeholder family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Input,
    Prev,
    UrlPrev,
}

/// A placeholder found in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    /// Explicit index; `None` for the bare form
    pub index: Option<usize>,
    /// Placeholder text as written
    pub raw: String,
}

impl Placeholder {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let raw = caps.get(0)?.as_str().to_string();
        let kind = match caps.get(1)?.as_str() {
            "input" => PlaceholderKind::Input,
            "prev" => PlaceholderKind::Prev,
            _ => PlaceholderKind::UrlPrev,
        };

        let index = match caps.get(2) {
            // Indices that overflow are out of range for every family
            Some(digits) => Some(digits.as_str().parse::<usize>().unwrap_or(usize::MAX)),
            None => None,
        };

        Some(Self { kind, index, raw })
    }
}

/// Lists the placeholders of a template in order of appearance
pub fn extract_placeholders(template: &str) -> Vec<Placeholder> {
    PLACEHOLDER_PATTERN
        .captures_iter(template)
        .filter_map(|caps| Placeholder::from_captures(&caps))
        .collect()
}

/// Input values of a queue item
#[derive(Debug, Clone, Copy)]
pub struct TemplateInputs<'a> {
    original: &'a str,
    mapped: Option<&'a BTreeMap<String, String>>,
}

impl<'a> TemplateInputs<'a> {
    pub fn new(original: &'a str, mapped: Option<&'a BTreeMap<String, String>>) -> Self {
        Self { original, mapped }
    }

    /// `{{input}}`: the mapped `input` key, else the raw text
    pub fn primary(&self) -> &'a str {
        self.mapped
            .and_then(|m| m.get("input"))
            .map(String::as_str)
            .unwrap_or(self.original)
    }

    /// `{{inputN}}`: empty when the key is not mapped
    pub fn named(&self, index: usize) -> &'a str {
        self.mapped
            .and_then(|m| m.get(&format!("input{}", index)))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Resolves templates of the step at `position` against an item's history
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    steps: &'a [WorkflowStep],
    results: &'a [StepResult],
}

impl<'a> TemplateResolver<'a> {
    pub fn new(steps: &'a [WorkflowStep], results: &'a [StepResult]) -> Self {
        Self { steps, results }
    }

    /// Expands every placeholder family in a prompt template
    pub fn resolve_prompt(
        &self,
        template: &str,
        position: usize,
        inputs: &TemplateInputs<'_>,
    ) -> Result<String, WorkflowError> {
        self.resolve(template, |placeholder| match placeholder.kind {
            PlaceholderKind::Input => Ok(self.input_value(placeholder, inputs)),
            PlaceholderKind::Prev => Ok(self.prev_value(placeholder, position)),
            PlaceholderKind::UrlPrev => self.url_value(placeholder, position),
        })
    }

    /// Expands only the `url_prev` family in a URL template
    pub fn resolve_url(&self, template: &str, position: usize) -> Result<String, WorkflowError> {
        self.resolve(template, |placeholder| match placeholder.kind {
            PlaceholderKind::UrlPrev => self.url_value(placeholder, position),
            _ => Ok(None),
        })
    }

    fn resolve<F>(&self, template: &str, mut lookup: F) -> Result<String, WorkflowError>
    where
        F: FnMut(&Placeholder) -> Result<Option<String>, WorkflowError>,
    {
        let mut output = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER_PATTERN.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(placeholder) = Placeholder::from_captures(&caps) else {
                continue;
            };

            output.push_str(&template[last..whole.start()]);
            match lookup(&placeholder)? {
                Some(value) => output.push_str(&value),
                None => output.push_str(whole.as_str()),
            }
            last = whole.end();
        }

        output.push_str(&template[last..]);
        Ok(output)
    }

    fn input_value(&self, placeholder: &Placeholder, inputs: &TemplateInputs<'_>) -> Option<String> {
        match placeholder.index {
            None => Some(inputs.primary().to_string()),
            Some(k) if (1..=MAX_NAMED_INPUTS).contains(&k) => Some(inputs.named(k).to_string()),
            Some(_) => None,
        }
    }

    fn prev_value(&self, placeholder: &Placeholder, position: usize) -> Option<String> {
        let step_index = match placeholder.index {
            None if position == 0 => return Some(String::new()),
            None => position - 1,
            Some(k) if (1..=self.steps.len()).contains(&k) => k - 1,
            Some(_) => return None,
        };

        Some(
            self.result_at(step_index)
                .map(|result| result.response.clone())
                .unwrap_or_default(),
        )
    }

    fn url_value(
        &self,
        placeholder: &Placeholder,
        position: usize,
    ) -> Result<Option<String>, WorkflowError> {
        let step_index = match placeholder.index {
            None if position == 0 => {
                return Err(WorkflowError::missing_history(&placeholder.raw, 0));
            }
            None => position - 1,
            Some(k) if (1..=self.steps.len()).contains(&k) => k - 1,
            Some(_) => return Ok(None),
        };

        match self.result_at(step_index) {
            Some(result) if !result.visited_url.is_empty() => Ok(Some(result.visited_url.clone())),
            _ => Err(WorkflowError::missing_history(
                &placeholder.raw,
                step_index + 1,
            )),
        }
    }

    fn result_at(&self, step_index: usize) -> Option<&'a StepResult> {
        let step_id = self.steps.get(step_index)?.id();
        self.results.iter().find(|r| r.step_id == step_id)
    }
}

/// Prompt suffix asking the model for `count` image markers
pub fn image_instruction(count: u32) -> String {
    let markers = (1..=count)
        .map(|i| format!("[image{}]", i))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "\n\nInsert exactly {} image placeholder(s) into your answer where an illustration fits: {}. \
         Put each placeholder alone on its own line and do not add any other image markup.",
        count, markers
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(n: usize) -> Vec<WorkflowStep> {
        (1..=n)
            .map(|i| WorkflowStep::new(format!("s{}", i), format!("Step {}", i), ""))
            .collect()
    }

    fn result(step_id: &str, response: &str, url: &str) -> StepResult {
        StepResult::new(step_id, step_id, "p", response, url)
    }

    fn mapped(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_first_step_prev_is_empty() {
        let steps = steps(2);
        let resolver = TemplateResolver::new(&steps, &[]);
        let inputs = TemplateInputs::new("x", None);

        let prompt = resolver
            .resolve_prompt("A: {{input}} B: {{prev}}", 0, &inputs)
            .unwrap();

        assert_eq!(prompt, "A: x B: ");
    }

    #[test]
    fn test_prev_with_index_matches_by_step_id() {
        let steps = steps(4);
        // Stored out of positional order on purpose
        let results = vec![
            result("s3", "third", "u3"),
            result("s1", "first", "u1"),
            result("s2", "second", "u2"),
        ];
        let resolver = TemplateResolver::new(&steps, &results);
        let inputs = TemplateInputs::new("x", None);

        let prompt = resolver.resolve_prompt("{{prev2}} / {{prev}}", 3, &inputs).unwrap();

        assert_eq!(prompt, "second / third");
    }

    #[test]
    fn test_named_inputs() {
        let steps = steps(1);
        let resolver = TemplateResolver::new(&steps, &[]);
        let map = mapped(&[("input", "main"), ("input1", "one")]);
        let inputs = TemplateInputs::new("raw", Some(&map));

        let prompt = resolver
            .resolve_prompt("{{input}}|{{input1}}|{{input2}}|{{input20}}", 0, &inputs)
            .unwrap();

        assert_eq!(prompt, "main|one||{{input20}}");
    }

    #[test]
    fn test_input_falls_back_to_original_text() {
        let steps = steps(1);
        let resolver = TemplateResolver::new(&steps, &[]);
        let map = mapped(&[("input1", "one")]);
        let inputs = TemplateInputs::new("raw", Some(&map));

        assert_eq!(resolver.resolve_prompt("{{input}}", 0, &inputs).unwrap(), "raw");
    }

    #[test]
    fn test_out_of_range_prev_left_literal() {
        let steps = steps(2);
        let results = vec![result("s1", "first", "u1")];
        let resolver = TemplateResolver::new(&steps, &results);
        let inputs = TemplateInputs::new("x", None);

        let prompt = resolver
            .resolve_prompt("{{prev0}} {{prev3}} {{prev1}}", 1, &inputs)
            .unwrap();

        assert_eq!(prompt, "{{prev0}} {{prev3}} first");
    }

    #[test]
    fn test_missing_prev_result_is_empty() {
        let steps = steps(3);
        let resolver = TemplateResolver::new(&steps, &[]);
        let inputs = TemplateInputs::new("x", None);

        assert_eq!(resolver.resolve_prompt("[{{prev1}}]", 2, &inputs).unwrap(), "[]");
    }

    #[test]
    fn test_all_occurrences_replaced_and_unknown_untouched() {
        let steps = steps(1);
        let resolver = TemplateResolver::new(&steps, &[]);
        let inputs = TemplateInputs::new("x", None);

        let prompt = resolver
            .resolve_prompt("{{input}}{{input}} {{other}}", 0, &inputs)
            .unwrap();

        assert_eq!(prompt, "xx {{other}}");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let steps = steps(2);
        let results = vec![result("s1", "{{input}}", "u1")];
        let resolver = TemplateResolver::new(&steps, &results);
        let inputs = TemplateInputs::new("x", None);

        assert_eq!(resolver.resolve_prompt("{{prev}}", 1, &inputs).unwrap(), "{{input}}");
    }

    #[test]
    fn test_url_prev() {
        let steps = steps(3);
        let results = vec![
            result("s1", "a", "https://chat.example/c/1"),
            result("s2", "b", "https://chat.example/c/2"),
        ];
        let resolver = TemplateResolver::new(&steps, &results);

        assert_eq!(resolver.resolve_url("{{url_prev}}", 2).unwrap(), "https://chat.example/c/2");
        assert_eq!(resolver.resolve_url("{{url_prev1}}", 2).unwrap(), "https://chat.example/c/1");
        assert_eq!(resolver.resolve_url("{{url_prev9}}", 2).unwrap(), "{{url_prev9}}");
    }

    #[test]
    fn test_url_prev_without_history_fails() {
        let steps = steps(2);
        let resolver = TemplateResolver::new(&steps, &[]);

        let err = resolver.resolve_url("{{url_prev}}", 1).unwrap_err();
        assert_eq!(err, WorkflowError::missing_history("{{url_prev}}", 1));

        let err = resolver.resolve_url("{{url_prev}}", 0).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingHistory { .. }));
    }

    #[test]
    fn test_resolve_url_ignores_other_families() {
        let steps = steps(1);
        let resolver = TemplateResolver::new(&steps, &[]);

        assert_eq!(
            resolver.resolve_url("https://x.example/?q={{input}}", 0).unwrap(),
            "https://x.example/?q={{input}}"
        );
    }

    #[test]
    fn test_extract_placeholders() {
        let found = extract_placeholders("{{input}} {{prev2}} {{url_prev}}");

        assert_eq!(found.len(), 3);
        assert_eq!(found[0].kind, PlaceholderKind::Input);
        assert_eq!(found[1].index, Some(2));
        assert_eq!(found[2].raw, "{{url_prev}}");
    }

    #[test]
    fn test_image_instruction_lists_markers() {
        let suffix = image_instruction(2);
        assert!(suffix.contains("[image1], [image2]"));
        assert!(suffix.contains("own line"));
    }
}
