//! Plugin formats and the registry the engine instantiates plugins through.
//!
//! A [`PluginFormat`] turns a [`PluginDescription`] into a live [`Processor`].
//! Formats are collected into a [`PluginRegistry`] value that is handed to the
//! engine and to the document loader; there is no process-wide registry.

mod internal;

pub use internal::{
    AUDIO_INPUT_ID, AUDIO_OUTPUT_ID, GAIN_ID, INTERNAL_FORMAT, InternalFormat, MAX_CHANNELS,
    MIDI_INPUT_ID,
};

use crate::graph::NodeKind;
use crate::processor::Processor;

/// Errors raised while loading or restoring a plugin.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// No registered format with this name.
    #[error("unknown plugin format: {0}")]
    UnknownFormat(String),

    /// The format does not know this identifier.
    #[error("plugin not found: {format}/{identifier}")]
    NotFound {
        /// Format name.
        format: String,
        /// Plugin identifier.
        identifier: String,
    },

    /// The format knows the plugin but could not create it.
    #[error("could not instantiate plugin: {0}")]
    Instantiate(String),

    /// The plugin needs deferred work but no work thread was supplied.
    #[error("plugin requires a work thread")]
    WorkerUnavailable,

    /// Sample rate or block size unusable.
    #[error("invalid module configuration: {0}")]
    InvalidConfig(String),

    /// A saved state blob could not be applied.
    #[error("invalid plugin state: {0}")]
    State(String),
}

/// Identifies a plugin within a format, plus its audio channel counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginDescription {
    /// Display name.
    pub name: String,
    /// Name of the [`PluginFormat`] that loads it.
    pub format: String,
    /// Format-specific identifier.
    pub identifier: String,
    /// Audio input channels.
    pub num_inputs: u32,
    /// Audio output channels.
    pub num_outputs: u32,
}

impl PluginDescription {
    /// Creates a description.
    pub fn new(
        name: impl Into<String>,
        format: impl Into<String>,
        identifier: impl Into<String>,
        num_inputs: u32,
        num_outputs: u32,
    ) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            identifier: identifier.into(),
            num_inputs,
            num_outputs,
        }
    }
}

/// A freshly created plugin and the role its node plays in the graph.
pub struct Instance {
    /// The processor.
    pub processor: Box<dyn Processor>,
    /// Graph role.
    pub kind: NodeKind,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// A source of plugins.
pub trait PluginFormat: Send + Sync {
    /// Format name stored in [`PluginDescription::format`].
    fn name(&self) -> &str;

    /// Every plugin this format can load.
    fn descriptions(&self) -> Vec<PluginDescription>;

    /// Whether `description` belongs to this format.
    fn handles(&self, description: &PluginDescription) -> bool {
        description.format == self.name()
    }

    /// Creates a new processor.
    fn instantiate(
        &self,
        description: &PluginDescription,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Instance, PluginError>;
}

/// The set of formats available to one engine.
#[derive(Default)]
pub struct PluginRegistry {
    formats: Vec<Box<dyn PluginFormat>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the internal I/O format.
    pub fn with_internal(input_channels: u32, output_channels: u32) -> Self {
        Self::new().with_format(InternalFormat::new(input_channels, output_channels))
    }

    /// Adds a format, builder style.
    #[must_use]
    pub fn with_format(mut self, format: impl PluginFormat + 'static) -> Self {
        self.add_format(Box::new(format));
        self
    }

    /// Adds a format. A format with the same name replaces the old one.
    pub fn add_format(&mut self, format: Box<dyn PluginFormat>) {
        self.formats.retain(|f| f.name() != format.name());
        self.formats.push(format);
    }

    /// Looks up a format by name.
    pub fn find_format(&self, name: &str) -> Option<&dyn PluginFormat> {
        self.formats
            .iter()
            .find(|f| f.name() == name)
            .map(AsRef::as_ref)
    }

    /// Registered format names.
    pub fn format_names(&self) -> Vec<&str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    /// Descriptions from every format.
    pub fn descriptions(&self) -> Vec<PluginDescription> {
        self.formats.iter().flat_map(|f| f.descriptions()).collect()
    }

    /// Finds a description by format and identifier.
    pub fn find(&self, format: &str, identifier: &str) -> Option<PluginDescription> {
        self.find_format(format)?
            .descriptions()
            .into_iter()
            .find(|d| d.identifier == identifier)
    }

    /// Instantiates a plugin through the format that handles it.
    pub fn instantiate(
        &self,
        description: &PluginDescription,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Instance, PluginError> {
        let format = self
            .formats
            .iter()
            .find(|f| f.handles(description))
            .ok_or_else(|| PluginError::UnknownFormat(description.format.clone()))?;
        format.instantiate(description, sample_rate, block_size)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("formats", &self.format_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = PluginRegistry::with_internal(2, 2);
        assert_eq!(registry.format_names(), vec![INTERNAL_FORMAT]);
        assert!(registry.find_format(INTERNAL_FORMAT).is_some());
        assert!(registry.find_format("LV2").is_none());

        let output = registry.find(INTERNAL_FORMAT, AUDIO_OUTPUT_ID).unwrap();
        assert_eq!(output.num_inputs, 2);
        assert_eq!(output.num_outputs, 0);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let registry = PluginRegistry::with_internal(2, 2);
        let desc = PluginDescription::new("Thing", "VST3", "thing", 2, 2);
        let err = registry.instantiate(&desc, 48000.0, 256).unwrap_err();
        assert!(matches!(err, PluginError::UnknownFormat(f) if f == "VST3"));
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let registry = PluginRegistry::with_internal(2, 2);
        let desc = PluginDescription::new("Thing", INTERNAL_FORMAT, "nope", 0, 0);
        assert!(matches!(
            registry.instantiate(&desc, 48000.0, 256),
            Err(PluginError::NotFound { .. })
        ));
    }

    #[test]
    fn test_same_name_replaces_format() {
        let registry = PluginRegistry::with_internal(1, 1).with_format(InternalFormat::new(4, 4));
        assert_eq!(registry.format_names().len(), 1);
        let input = registry.find(INTERNAL_FORMAT, AUDIO_INPUT_ID).unwrap();
        assert_eq!(input.num_outputs, 4);
    }
}
