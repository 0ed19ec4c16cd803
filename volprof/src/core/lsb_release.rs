//! Parsing for `/etc/lsb-release`.

use anyhow::{Result, anyhow};

/// Extract the unquoted value of `DISTRIB_DESCRIPTION`.
///
/// The last assignment wins, matching shell `source` semantics.
pub fn distrib_description(contents: &str) -> Result<String> {
    let mut found = None;
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() != "DISTRIB_DESCRIPTION" {
            continue;
        }
        found = Some(unquote(value.trim()).to_string());
    }
    match found {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(anyhow!("DISTRIB_DESCRIPTION is empty")),
        None => Err(anyhow!("DISTRIB_DESCRIPTION not found")),
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
