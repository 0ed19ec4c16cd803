//! minijinja rendering for configurable names.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior, Value};

/// Render `source` with strict undefined handling, so a misspelled variable is
/// an error instead of an empty string.
pub fn render(source: &str, ctx: Value) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template("name", source)
        .context("parse template")?;
    let template = env.get_template("name").context("load template")?;
    let rendered = template.render(ctx).context("render template")?;
    Ok(rendered.trim().to_string())
}

/// Render a template whose only variable is `kernel` (package names).
pub fn render_kernel_template(source: &str, kernel: &str) -> Result<String> {
    render(source, minijinja::context! { kernel => kernel })
}
