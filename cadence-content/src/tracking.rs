//! Open and click tracking
//!
//! Tracking is expressed entirely as references in the HTML: an open pixel
//! pointing at `/trk/open?id=<id>` and links routed through
//! `/trk/click?u=<target>&id=<id>`. Serving those endpoints is someone else's
//! job.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::entities;

/// A transparent 1x1 GIF, used when a message is not tracked
pub const INERT_PIXEL: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

const OPEN_PATH: &str = "/trk/open";
const CLICK_PATH: &str = "/trk/click";

#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant")]
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<a\b[^>]*?\bhref\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).expect("valid link pattern")
});

/// Opaque identifier tying opens and clicks back to a send
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingId(String);

impl TrackingId {
    /// A new random (UUID v4) identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TrackingId> for String {
    fn from(value: TrackingId) -> Self {
        value.0
    }
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Inject live tracking references. When `false` every message gets the
    /// inert pixel and links are left alone.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Prefix for tracking URLs, e.g. `https://t.example.com`. Empty produces
    /// host-relative references.
    #[serde(default)]
    pub base_url: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: String::new(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

/// HTML with tracking applied, and the id it was tracked under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedHtml {
    pub html: String,
    pub tracking_id: Option<TrackingId>,
}

/// Applies the configured tracking to rendered HTML
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    config: TrackingConfig,
}

impl Tracker {
    #[must_use]
    pub const fn new(config: TrackingConfig) -> Self {
        Self { config }
    }

    /// Wrap links and add an open pixel under a freshly generated id
    #[must_use]
    pub fn track(&self, html: &str) -> TrackedHtml {
        let tracking_id = self.config.enabled.then(TrackingId::generate);
        let id = tracking_id.as_ref().map(TrackingId::as_str);
        let base = self.config.base_url.as_str();

        TrackedHtml {
            html: inject_open_pixel(&wrap_links(html, id, base), id, base),
            tracking_id,
        }
    }
}

/// The open-pixel reference for `tracking_id`, or the inert pixel without one
#[must_use]
pub fn open_pixel_url(tracking_id: Option<&str>, base_url: &str) -> String {
    tracking_id.map_or_else(
        || INERT_PIXEL.to_string(),
        |id| {
            format!(
                "{}{OPEN_PATH}?id={}",
                base_url.trim_end_matches('/'),
                urlencoding::encode(id)
            )
        },
    )
}

/// The click-redirect reference for `target` under `tracking_id`
#[must_use]
pub fn click_url(target: &str, tracking_id: &str, base_url: &str) -> String {
    format!(
        "{}{CLICK_PATH}?u={}&id={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(target),
        urlencoding::encode(tracking_id)
    )
}

/// Append an open pixel, before `</body>` when there is one
#[must_use]
pub fn inject_open_pixel(html: &str, tracking_id: Option<&str>, base_url: &str) -> String {
    let pixel = format!(
        r#"<img src="{}" width="1" height="1" alt="" style="display:none">"#,
        open_pixel_url(tracking_id, base_url)
    );

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + pixel.len());
            out.push_str(&html[..index]);
            out.push_str(&pixel);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{html}{pixel}"),
    }
}

/// Route every link through the click tracker.
///
/// Without a tracking id the HTML is returned unchanged. Fragment, `mailto:`
/// and `tel:` links, and links that are already wrapped, are kept as they are.
#[must_use]
pub fn wrap_links(html: &str, tracking_id: Option<&str>, base_url: &str) -> String {
    let Some(id) = tracking_id else {
        return html.to_string();
    };

    LINK.replace_all(html, |caps: &Captures<'_>| {
        let href = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        let target = entities::decode(href);

        if !should_wrap(&target) {
            return caps[0].to_string();
        }

        let wrapped = click_url(&target, id, base_url).replace('&', "&amp;");
        format!("{}\"{wrapped}\"", &caps[1])
    })
    .into_owned()
}

fn should_wrap(target: &str) -> bool {
    let lower = target.trim().to_ascii_lowercase();

    !(lower.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.contains(CLICK_PATH))
}
