// src/config/render.rs

//! Templating collaborator boundary (§6).
//!
//! The real templating engine (Jinja-style, per §1) is explicitly out of
//! scope for this crate. [`Renderer`] is the narrow trait the engine calls
//! through; [`SimpleRenderer`] is a minimal `${name}` substitution stand-in
//! so the crate is runnable end to end without that external collaborator.
//! It is not a reimplementation of the real templating surface.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("unbound template variable '{0}'")]
    UnboundVariable(String),
    #[error("unterminated '${{' in template")]
    UnterminatedBrace,
}

pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, bindings: &HashMap<String, String>) -> Result<String, RenderError>;
}

/// Replaces every `${name}` occurrence with `bindings["name"]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleRenderer;

impl Renderer for SimpleRenderer {
    fn render(&self, template: &str, bindings: &HashMap<String, String>) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or(RenderError::UnterminatedBrace)?;
            let name = &after[..end];
            let value = bindings
                .get(name)
                .ok_or_else(|| RenderError::UnboundVariable(name.to_string()))?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_bindings() {
        let mut bindings = HashMap::new();
        bindings.insert("name".to_string(), "world".to_string());
        let rendered = SimpleRenderer.render("hello ${name}!", &bindings).unwrap();
        assert_eq!(rendered, "hello world!");
    }

    #[test]
    fn errors_on_unbound_variable() {
        let bindings = HashMap::new();
        let err = SimpleRenderer.render("${missing}", &bindings).unwrap_err();
        assert_eq!(err, RenderError::UnboundVariable("missing".to_string()));
    }
}
