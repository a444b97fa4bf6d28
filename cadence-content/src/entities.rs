//! Minimal HTML character reference decoding

use std::sync::LazyLock;

use regex::{Captures, Regex};

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[A-Za-z]{2,8});?").expect("valid entity pattern")
});

/// Decode numeric references and the handful of named references that matter
/// for text output and URL scheme checks. Unknown names are left as they are.
pub fn decode(input: &str) -> String {
    ENTITY
        .replace_all(input, |caps: &Captures<'_>| {
            let reference = &caps[1];

            let decoded = if let Some(hex) = reference
                .strip_prefix("#x")
                .or_else(|| reference.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(decimal) = reference.strip_prefix('#') {
                decimal.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named(reference)
            };

            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn named(name: &str) -> Option<char> {
    Some(match name.to_ascii_lowercase().as_str() {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "colon" => ':',
        "tab" => '\t',
        "newline" => '\n',
        _ => return None,
    })
}
