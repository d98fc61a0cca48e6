//! Specification layers: the inputs to composition.

use std::fmt;
use std::sync::Arc;

use crate::deid::DeidLayer;
use crate::resolve::Resolver;

use super::model::{
    AdditionalData, ErrorsFn, HeaderEdits, HeaderFn, HostProps, OutputPathFn, SPEC_VERSION,
};

/// Context threaded through contextual layers, merged key by key.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// A partial specification. Unset fields leave the accumulated value alone.
#[derive(Clone)]
pub struct PartialSpec {
    pub version: String,
    pub input_path_pattern: Option<String>,
    pub modify_header: Option<HeaderFn>,
    pub output_path_components: Option<OutputPathFn>,
    pub excluded_filetypes: Option<Vec<String>>,
    pub deid: Option<DeidLayer>,
    pub additional_data: Option<AdditionalData>,
    pub errors: Option<ErrorsFn>,
    pub host_props: Option<HostProps>,
}

impl Default for PartialSpec {
    fn default() -> Self {
        Self {
            version: SPEC_VERSION.to_string(),
            input_path_pattern: None,
            modify_header: None,
            output_path_components: None,
            excluded_filetypes: None,
            deid: None,
            additional_data: None,
            errors: None,
            host_props: None,
        }
    }
}

impl fmt::Debug for PartialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialSpec")
            .field("version", &self.version)
            .field("input_path_pattern", &self.input_path_pattern)
            .field("modify_header", &self.modify_header.is_some())
            .field("output_path_components", &self.output_path_components.is_some())
            .field("excluded_filetypes", &self.excluded_filetypes)
            .field("deid", &self.deid)
            .field("additional_data", &self.additional_data)
            .field("errors", &self.errors.is_some())
            .field("host_props", &self.host_props)
            .finish()
    }
}

impl PartialSpec {
    /// An empty layer at the current specification version.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_input_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.input_path_pattern = Some(pattern.into());
        self
    }

    pub fn with_modify_header<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> HeaderEdits + Send + Sync + 'static,
    {
        self.modify_header = Some(Arc::new(f));
        self
    }

    pub fn with_output_path_components<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Vec<String> + Send + Sync + 'static,
    {
        self.output_path_components = Some(Arc::new(f));
        self
    }

    pub fn with_excluded_filetypes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_filetypes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_deid(mut self, layer: DeidLayer) -> Self {
        self.deid = Some(layer);
        self
    }

    pub fn with_additional_data(mut self, data: AdditionalData) -> Self {
        self.additional_data = Some(data);
        self
    }

    pub fn with_errors<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Vec<String> + Send + Sync + 'static,
    {
        self.errors = Some(Arc::new(f));
        self
    }

    pub fn with_host_props(mut self, props: HostProps) -> Self {
        self.host_props = Some(props);
        self
    }
}

/// Output of a contextual layer.
#[derive(Debug, Clone, Default)]
pub struct ContextLayer {
    /// Keys merged into the running context.
    pub ctx: Context,
    /// Layer to fold in; `None` contributes nothing.
    pub spec: Option<PartialSpec>,
}

/// A layer computed from the context accumulated by earlier layers.
pub type ContextFn = Arc<dyn Fn(&Context) -> ContextLayer + Send + Sync>;

/// One input to [`compose_specs`](super::compose_specs).
#[derive(Clone)]
pub enum SpecLayer {
    Partial(PartialSpec),
    Contextual(ContextFn),
}

impl SpecLayer {
    pub fn contextual<F>(f: F) -> Self
    where
        F: Fn(&Context) -> ContextLayer + Send + Sync + 'static,
    {
        SpecLayer::Contextual(Arc::new(f))
    }
}

impl From<PartialSpec> for SpecLayer {
    fn from(spec: PartialSpec) -> Self {
        SpecLayer::Partial(spec)
    }
}

impl fmt::Debug for SpecLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecLayer::Partial(spec) => f.debug_tuple("Partial").field(spec).finish(),
            SpecLayer::Contextual(_) => f.write_str("Contextual(..)"),
        }
    }
}
