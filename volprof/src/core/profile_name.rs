//! Profile filename derivation.
//!
//! Volatility discovers Linux profiles by zip name, so the name must be a
//! single token: whitespace and quote characters are stripped from every part,
//! and path separators become `_`.

use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

use crate::core::template::render;

static STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\s"'`]+"#).expect("valid strip regex"));

/// Raw facts that make up a profile name.
#[derive(Debug, Clone, Copy)]
pub struct NameParts<'a> {
    pub hostname: &'a str,
    pub os_description: &'a str,
    pub kernel: &'a str,
    pub arch: &'a str,
}

/// Remove whitespace and quotes: `"Ubuntu 22.04"` becomes `Ubuntu22.04`.
pub fn sanitize_component(raw: &str) -> String {
    STRIP_RE.replace_all(raw, "").replace('/', "_")
}

/// Render the configured template with sanitized parts.
pub fn render_profile_name(template: &str, parts: &NameParts<'_>) -> Result<String> {
    let name = render(
        template,
        minijinja::context! {
            hostname => sanitize_component(parts.hostname),
            os => sanitize_component(parts.os_description),
            kernel => sanitize_component(parts.kernel),
            arch => sanitize_component(parts.arch),
        },
    )?;
    if name.is_empty() {
        bail!("profile name rendered empty");
    }
    if name.contains('/') {
        bail!("profile name must not contain '/': {name}");
    }
    Ok(name)
}
