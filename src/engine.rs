use std::collections::HashMap;

use crate::error::{VeertlError, VeertlResult};
use crate::interface::{Evaluator, SourceProvider};
use crate::template::Template;

/// `VeertlEngine` is a registry of named templates that resolves
/// `#include`/`#inherint` targets against its own contents.
///
/// # Examples
///
/// ```
/// use veertl::{VeertlEngine, Context, VariableTy};
///
/// let mut engine = VeertlEngine::new();
/// engine.add_template("greeting", "Hello, ${name}!").unwrap();
///
/// let mut context = Context::new();
/// context.insert("name", VariableTy::String.with_data("World"));
///
/// let output = engine.render("greeting", &mut context).unwrap();
/// assert_eq!(output, "Hello, World!");
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Default)]
pub struct VeertlEngine {
    templates: HashMap<String, Template>,
}

impl VeertlEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Parses and registers a template under `name`.
    ///
    /// # Errors
    ///
    /// Returns `VeertlError::TemplateExists` when `name` is already
    /// registered, and `VeertlError::Parse` when the source fails to parse.
    pub fn add_template<S: Into<String>, T: Into<String>>(
        &mut self,
        name: S,
        source: T,
    ) -> VeertlResult<()> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(VeertlError::TemplateExists {
                template_name: name,
            });
        }
        let mut template = Template::parse(source)?;
        template.name = Some(name.clone());
        self.templates.insert(name, template);
        Ok(())
    }

    /// Looks up a registered template by name.
    #[must_use]
    pub fn get_template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Renders the named template with the given evaluator.
    ///
    /// Include and inherit directives are resolved against the engine's own
    /// registry before rendering.
    ///
    /// # Errors
    ///
    /// Returns `VeertlError::MissingTemplate` when `name` is not registered
    /// or an include target cannot be found, plus any parse, resolution, or
    /// evaluation error from the template itself.
    pub fn render<E: Evaluator>(&self, name: &str, evaluator: &mut E) -> VeertlResult<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| VeertlError::MissingTemplate {
                template_name: name.to_string(),
            })?;

        if template.needs_resolution() {
            let mut resolved = template.clone();
            resolved.post_process(self)?;
            return resolved.render(evaluator);
        }
        template.render(evaluator)
    }
}

impl SourceProvider for VeertlEngine {
    fn load(&self, name: &str) -> VeertlResult<String> {
        self.templates
            .get(name)
            .map(|template| template.source().to_string())
            .ok_or_else(|| VeertlError::MissingTemplate {
                template_name: name.to_string(),
            })
    }
}
