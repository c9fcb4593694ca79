//! JD classifier: decides whether supplied JD text is a link to browse or an
//! inline description. Pure; no network access, no failure mode.

use std::sync::OnceLock;

use regex::Regex;

fn url_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Anchored start-to-end: optional scheme, dot-separated host labels,
    // optional path/query. A JD paragraph with an embedded link is not a link.
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(https?://)?([\w-]+\.)+[\w-]+(/[\w\-._~:/?#\[\]@!$&'()*+,;=%]*)?$")
            .expect("invalid url shape pattern")
    })
}

/// Returns true if the JD text is a URL, false if it is an inline description.
pub fn is_jd_link(text: &str) -> bool {
    url_shape().is_match(text.trim())
}
