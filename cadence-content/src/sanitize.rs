//! Allow-list HTML sanitizer
//!
//! Anything not explicitly allowed is removed. Elements that carry code or
//! foreign content (`script`, `style`, `iframe`, ...) are removed together with
//! everything inside them; any other unknown element is unwrapped, keeping its
//! text. URL attributes survive only with a safe scheme.

use std::sync::LazyLock;

use regex::Regex;

use crate::entities;

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<!--.*?(?:-->|$)|<(/?)([A-Za-z][A-Za-z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("valid tag pattern")
});

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid attribute pattern")
});

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "img", "li", "ol", "p", "pre", "s", "small", "span", "strong", "sub", "sup", "table",
    "tbody", "td", "th", "thead", "tr", "u", "ul",
];

/// Elements removed along with their content
const DROP_WITH_CONTENT: &[&str] = &[
    "embed", "iframe", "math", "noscript", "object", "script", "select", "style", "svg",
    "template", "textarea",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

const LINK_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];
const IMAGE_SCHEMES: &[&str] = &["http", "https"];

/// Sanitize `html` against the allow-list
#[must_use]
pub fn sanitize(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    let mut dropping: Option<String> = None;

    for caps in TAG.captures_iter(html) {
        let Some(tag) = caps.get(0) else {
            continue;
        };

        if dropping.is_none() {
            push_text(&mut out, &html[cursor..tag.start()]);
        }
        cursor = tag.end();

        // Comments have no name group
        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let raw_attributes = caps.get(3).map_or("", |m| m.as_str());

        if let Some(dropped) = &dropping {
            if closing && *dropped == name {
                dropping = None;
            }
            continue;
        }

        if DROP_WITH_CONTENT.contains(&name.as_str()) {
            let self_closing = raw_attributes.trim_end().ends_with('/');
            if !closing && !self_closing {
                dropping = Some(name);
            }
            continue;
        }

        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }

        if closing {
            if !VOID_TAGS.contains(&name.as_str()) {
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
            continue;
        }

        out.push('<');
        out.push_str(&name);
        for (attribute, value) in allowed_attributes(&name, raw_attributes) {
            out.push(' ');
            out.push_str(&attribute);
            out.push_str("=\"");
            out.push_str(&escape_attribute(&value));
            out.push('"');
        }
        out.push('>');
    }

    if dropping.is_none() {
        push_text(&mut out, &html[cursor..]);
    }

    out
}

fn allowed_attributes(tag: &str, raw: &str) -> Vec<(String, String)> {
    let mut kept = Vec::new();

    for caps in ATTRIBUTE.captures_iter(raw) {
        let name = caps[1].to_ascii_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());

        let allowed = match (tag, name.as_str()) {
            (_, "title")
            | ("a", "target" | "rel")
            | ("img", "alt" | "width" | "height")
            | ("td" | "th", "colspan" | "rowspan") => true,
            ("a", "href") => is_safe_url(value, LINK_SCHEMES),
            ("img", "src") => is_safe_url(value, IMAGE_SCHEMES),
            _ => false,
        };

        if allowed && !kept.iter().any(|(existing, _)| *existing == name) {
            kept.push((name, value.to_string()));
        }
    }

    kept
}

/// Whether `value` is a relative URL or uses one of `schemes`.
///
/// Character references, whitespace and control characters are removed first,
/// since browsers ignore them when reading a scheme (`java&#x09;script:`).
fn is_safe_url(value: &str, schemes: &[&str]) -> bool {
    let cleaned: String = entities::decode(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    let Some(colon) = cleaned.find(':') else {
        return true;
    };

    let scheme = &cleaned[..colon];

    // A colon after a path, query or fragment delimiter is not a scheme separator
    if scheme.contains(['/', '?', '#']) {
        return true;
    }

    schemes.contains(&scheme)
}

fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_allowed_markup_is_kept() {
        assert_eq!(
            sanitize(r#"<p>Hi <strong>there</strong><br/><a href="https://example.com" title="x">link</a></p>"#),
            r#"<p>Hi <strong>there</strong><br><a href="https://example.com" title="x">link</a></p>"#
        );
    }

    #[test]
    fn test_script_elements_are_removed_with_content() {
        let dirty = "Hello<script>alert('x')</script> <SCRIPT src=//evil></SCRIPT>world";
        let clean = sanitize(dirty);

        assert_eq!(clean, "Hello world");
        assert!(!clean.to_ascii_lowercase().contains("<script"));
    }

    #[test]
    fn test_unclosed_script_drops_the_rest() {
        assert_eq!(sanitize("ok<script>alert(1)"), "ok");
    }

    #[test]
    fn test_javascript_urls_are_removed() {
        let cases = [
            r#"<a href="javascript:alert(1)">x</a>"#,
            r#"<a href="JaVaScRiPt:alert(1)">x</a>"#,
            r#"<a href=" java&#x09;script:alert(1)">x</a>"#,
            r#"<a href="&#106;avascript&colon;alert(1)">x</a>"#,
            "<a href='vbscript:msgbox'>x</a>",
        ];

        for case in cases {
            let clean = sanitize(case);
            assert_eq!(clean, "<a>x</a>", "input: {case}");
            assert!(!clean.to_ascii_lowercase().contains("javascript:"));
        }
    }

    #[test]
    fn test_event_handlers_and_styles_are_removed() {
        assert_eq!(
            sanitize(r#"<img src="https://example.com/a.png" onerror="alert(1)" style="x">"#),
            r#"<img src="https://example.com/a.png">"#
        );
        assert_eq!(
            sanitize(r#"<img src="data:image/png;base64,AAAA">"#),
            "<img>"
        );
    }

    #[test]
    fn test_unknown_tags_are_unwrapped() {
        assert_eq!(
            sanitize("<font color=red>big</font> <iframe src=x>gone</iframe>"),
            "big "
        );
    }

    #[test]
    fn test_relative_and_mail_links_are_kept() {
        assert_eq!(
            sanitize(r#"<a href="/pricing?ref=a:b">p</a><a href="mailto:a@b.c">m</a>"#),
            r#"<a href="/pricing?ref=a:b">p</a><a href="mailto:a@b.c">m</a>"#
        );
    }

    #[test]
    fn test_stray_angle_brackets_are_escaped() {
        assert_eq!(sanitize("1 < 2 > 0"), "1 &lt; 2 &gt; 0");
        assert_eq!(sanitize("<!-- hidden -->shown"), "shown");
    }

    #[test]
    fn test_attribute_values_are_requoted() {
        assert_eq!(
            sanitize(r#"<a title='say "hi"' href=https://example.com>x</a>"#),
            r#"<a title="say &quot;hi&quot;" href="https://example.com">x</a>"#
        );
    }
}
