//! Template rendering
//!
//! `render` is total over its input: every `{{placeholder}}` is replaced,
//! unknown keys with the empty string, so no braces ever reach a recipient.

use std::{collections::BTreeMap, sync::LazyLock};

use cadence_common::model::Template;
use regex::{Captures, Regex};

use crate::{entities, sanitize::sanitize};

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder pattern")
});

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?(?:</script\s*>|$)|<style\b.*?(?:</style\s*>|$)|<!--.*?(?:-->|$)")
        .expect("valid code block pattern")
});

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static LINE_BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|tr|blockquote|h[1-6])\s*>")
        .expect("valid line break pattern")
});

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// The three parts of a rendered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Render `template` with `variables`.
///
/// - The subject is substituted and kept on a single line.
/// - The body is substituted, its line breaks become `<br>`, and the result is
///   sanitized to give the HTML part.
/// - The plain-text part is derived from the HTML *before* sanitization.
#[must_use]
pub fn render(template: &Template, variables: &BTreeMap<String, String>) -> Rendered {
    let subject = single_line(&substitute(&template.subject, variables));
    let html = line_breaks_to_html(&substitute(&template.body, variables));

    Rendered {
        subject,
        text: html_to_text(&html),
        html: sanitize(&html),
    }
}

/// Replace every `{{key}}` in `input`. Unknown keys become the empty string.
///
/// Substituted values are not scanned again, so a value containing `{{x}}`
/// is emitted as-is.
#[must_use]
pub fn substitute(input: &str, variables: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            variables.get(&caps[1]).map_or("", String::as_str).to_string()
        })
        .into_owned()
}

fn single_line(subject: &str) -> String {
    subject.split(['\r', '\n']).filter(|part| !part.is_empty()).collect::<Vec<_>>().join(" ")
}

fn line_breaks_to_html(body: &str) -> String {
    body.replace("\r\n", "<br>")
        .replace(['\r', '\n'], "<br>")
}

fn html_to_text(html: &str) -> String {
    let without_code = CODE_BLOCK.replace_all(html, "");
    let with_breaks = LINE_BREAK_TAG.replace_all(&without_code, "\n");
    let stripped = ANY_TAG.replace_all(&with_breaks, "");

    entities::decode(&stripped).trim().to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn variables(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let vars = variables(&[("first_name", "Ada"), ("company", "Engines")]);

        assert_eq!(
            substitute("Hi {{first_name}} at {{ company }}", &vars),
            "Hi Ada at Engines"
        );
    }

    #[test]
    fn test_unknown_placeholders_render_empty() {
        let vars = variables(&[]);

        assert_eq!(substitute("Hi {{first_name}}!", &vars), "Hi !");
        assert_eq!(substitute("{{a}}{{b_2}}", &vars), "");
    }

    #[test]
    fn test_non_identifier_braces_are_left_alone() {
        let vars = variables(&[("x", "1")]);
        assert_eq!(substitute("{{not valid}} {x}", &vars), "{{not valid}} {x}");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars = variables(&[("a", "{{b}}"), ("b", "nope")]);
        assert_eq!(substitute("{{a}}", &vars), "{{b}}");
    }

    #[test]
    fn test_render_produces_html_and_text() {
        let template = Template::new(
            "t1",
            "Hello {{first_name}}\r\nBcc: victim@example.com",
            "Hi {{first_name}},\nSee <a href=\"https://example.com\">this</a>.\n\nThanks",
        );
        let rendered = render(&template, &variables(&[("first_name", "Ada")]));

        assert_eq!(rendered.subject, "Hello Ada Bcc: victim@example.com");
        assert_eq!(
            rendered.html,
            "Hi Ada,<br>See <a href=\"https://example.com\">this</a>.<br><br>Thanks"
        );
        assert_eq!(rendered.text, "Hi Ada,\nSee this.\n\nThanks");
    }

    #[test]
    fn test_render_sanitizes_substituted_values() {
        let template = Template::new("t1", "Hi", "Hello {{name}}");
        let rendered = render(
            &template,
            &variables(&[("name", "<script>alert(1)</script>Ada")]),
        );

        assert_eq!(rendered.html, "Hello Ada");
        assert_eq!(rendered.text, "Hello Ada");
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = Template::new(
            "t1",
            "{{a}} {{missing}}",
            "<p onclick=\"x()\">{{a}}</p>\n<a href=\"javascript:x\">{{b}}</a>",
        );
        let vars = variables(&[("a", "one"), ("b", "two")]);

        assert_eq!(render(&template, &vars), render(&template, &vars));
    }
}
