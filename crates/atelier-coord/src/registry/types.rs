use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Metadata for one component type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Unique component name; registry key.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Markup tag the host binds this component to.
    pub tag: String,
}

impl ComponentDefinition {
    /// Create a definition whose tag defaults to the component name.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tag: name.clone(),
            name,
            description: description.into(),
        }
    }

    /// Set the host markup tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// A live component mounted in one window.
pub trait ComponentInstance: Send {
    /// Name of the component type this instance was created from.
    fn type_name(&self) -> &str;
}

/// Factory able to create instances of one component type.
pub trait ComponentFactory: Send + Sync + std::fmt::Debug {
    /// Metadata for the component type.
    fn definition(&self) -> &ComponentDefinition;

    /// Create a fresh instance.
    fn create(&self) -> Result<Box<dyn ComponentInstance>>;
}

/// Host-side hook making a registered component usable by the UI system.
///
/// Called at most once per component name, however many times the name is
/// registered. Chosen by the composition root; windows never probe for it.
pub trait ComponentHost: Send + Sync {
    /// Perform the host definition side effect for `definition`.
    fn define(&self, definition: &ComponentDefinition) -> Result<()>;
}

/// Host that does nothing; for tests and headless operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl ComponentHost for NoopHost {
    fn define(&self, _definition: &ComponentDefinition) -> Result<()> {
        Ok(())
    }
}
