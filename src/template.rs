//! Configuration templating seam.
//!
//! The templating engine proper is an external collaborator; the harness
//! only needs to hand it a template name and a parameter mapping and get a
//! rendered configuration back. `FileTemplateEngine` is the minimal shipped
//! implementation: `{{ key }}` placeholder substitution over a template
//! directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{HarnessError, Result};

/// Named parameters handed to the engine, e.g. `result_path`, `macro_amount`.
pub type TemplateParams = BTreeMap<String, String>;

/// Renders a configuration file from a named template.
pub trait TemplateEngine {
    /// Renders `template_name` with `params` into the final config text.
    fn render(&self, template_name: &str, params: &TemplateParams) -> Result<String>;
}

/// Placeholder-substitution engine over a directory of template files.
#[derive(Debug, Clone)]
pub struct FileTemplateEngine {
    template_dir: PathBuf,
}

impl FileTemplateEngine {
    /// Creates an engine reading templates from `template_dir`.
    #[must_use]
    pub const fn new(template_dir: PathBuf) -> Self {
        Self { template_dir }
    }
}

impl TemplateEngine for FileTemplateEngine {
    fn render(&self, template_name: &str, params: &TemplateParams) -> Result<String> {
        let path = self.template_dir.join(template_name);
        let mut text = fs::read_to_string(&path).map_err(|_| HarnessError::Environment {
            path: path.clone(),
        })?;

        for (key, value) in params {
            text = text
                .replace(&format!("{{{{ {key} }}}}"), value)
                .replace(&format!("{{{{{key}}}}}"), value);
        }

        if let Some(start) = text.find("{{") {
            let end = text[start..].find("}}").map_or(text.len(), |e| start + e + 2);
            return Err(HarnessError::Template {
                name: template_name.to_string(),
                detail: format!("unresolved placeholder {}", &text[start..end]),
            });
        }

        Ok(text)
    }
}
