//! Transformer kinds available to configurations.
//!
//! Each kind is a [`TransformerFactory`] that decodes its own parameters.
//! The [`default_registry`] holds every built-in kind and is what the engine
//! resolves configuration entries against.
//!
//! | Kind | Factory |
//! |------|---------|
//! | `identifier` | [`IdentifierFactory`] |
//! | `datetime_shift` | [`DatetimeShiftFactory`] |
//! | `column_drop` | [`ColumnDropFactory`] |

use std::collections::BTreeMap;
use std::sync::OnceLock;

use deid_model::{DeidSettings, TableSpec, TransformerSpec};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::drop::{self, ColumnDropParams, ColumnDropTransformer};
use crate::error::{ConfigError, Result};
use crate::filter::RowFilter;
use crate::identifier::{self, IdentifierParams, IdentifierTransformer};
use crate::pipeline::TablePipeline;
use crate::temporal::{self, DatetimeShiftParams, DatetimeShiftTransformer};
use crate::transformer::{Transformer, TransformerNode};

/// Builds transformers of one kind from configuration parameters.
pub trait TransformerFactory: Send + Sync {
    /// Kind name used in configuration files.
    fn kind(&self) -> &'static str;

    /// One-line description for listings.
    fn description(&self) -> &'static str;

    /// Whether nodes of this kind accept `filter` and `value_cast`.
    fn supports_row_scope(&self) -> bool {
        true
    }

    /// Build a transformer for node `node` from its parameters.
    fn build(
        &self,
        node: &str,
        params: &Map<String, Value>,
        settings: &DeidSettings,
    ) -> std::result::Result<Box<dyn Transformer>, ConfigError>;
}

fn decode<P: DeserializeOwned>(
    node: &str,
    kind: &str,
    params: &Map<String, Value>,
) -> std::result::Result<P, ConfigError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|err| {
        ConfigError::InvalidParams {
            node: node.to_string(),
            kind: kind.to_string(),
            message: err.to_string(),
        }
    })
}

pub struct IdentifierFactory;

impl TransformerFactory for IdentifierFactory {
    fn kind(&self) -> &'static str {
        identifier::KIND
    }

    fn description(&self) -> &'static str {
        "Replace values with stable sequential surrogate ids"
    }

    fn build(
        &self,
        node: &str,
        params: &Map<String, Value>,
        _settings: &DeidSettings,
    ) -> std::result::Result<Box<dyn Transformer>, ConfigError> {
        let params: IdentifierParams = decode(node, self.kind(), params)?;
        Ok(Box::new(IdentifierTransformer::from_params(params)))
    }
}

pub struct DatetimeShiftFactory;

impl TransformerFactory for DatetimeShiftFactory {
    fn kind(&self) -> &'static str {
        temporal::KIND
    }

    fn description(&self) -> &'static str {
        "Shift dates and times by one random offset per reference id"
    }

    fn build(
        &self,
        node: &str,
        params: &Map<String, Value>,
        settings: &DeidSettings,
    ) -> std::result::Result<Box<dyn Transformer>, ConfigError> {
        let params: DatetimeShiftParams = decode(node, self.kind(), params)?;
        let shift = params
            .time_shift
            .unwrap_or_else(|| settings.time_shift.clone());
        if shift.min >= shift.max {
            return Err(ConfigError::InvalidShiftRange {
                node: node.to_string(),
                min: shift.min,
                max: shift.max,
            });
        }
        Ok(Box::new(DatetimeShiftTransformer::new(
            params.reference_column,
            params.reference,
            params.datetime_column,
            shift,
        )))
    }
}

pub struct ColumnDropFactory;

impl TransformerFactory for ColumnDropFactory {
    fn kind(&self) -> &'static str {
        drop::KIND
    }

    fn description(&self) -> &'static str {
        "Remove a column; not restored on reverse"
    }

    fn supports_row_scope(&self) -> bool {
        false
    }

    fn build(
        &self,
        node: &str,
        params: &Map<String, Value>,
        _settings: &DeidSettings,
    ) -> std::result::Result<Box<dyn Transformer>, ConfigError> {
        let params: ColumnDropParams = decode(node, self.kind(), params)?;
        Ok(Box::new(ColumnDropTransformer::new(params.column)))
    }
}

/// Transformer factories indexed by kind.
#[derive(Default)]
pub struct TransformerRegistry {
    factories: BTreeMap<&'static str, Box<dyn TransformerFactory>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any factory of the same kind.
    pub fn register(&mut self, factory: Box<dyn TransformerFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn TransformerFactory> {
        self.factories.get(kind).map(|factory| factory.as_ref())
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn factories(&self) -> impl Iterator<Item = &dyn TransformerFactory> + '_ {
        self.factories.values().map(|factory| factory.as_ref())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the node declared by `spec` at `position` within its table.
    pub fn build_node(
        &self,
        spec: &TransformerSpec,
        position: usize,
        settings: &DeidSettings,
    ) -> std::result::Result<TransformerNode, ConfigError> {
        let id = spec.node_id(position);
        let Some(factory) = self.get(&spec.kind) else {
            return Err(ConfigError::UnknownKind {
                kind: spec.kind.clone(),
                known: self.kinds().collect::<Vec<_>>().join(", "),
            });
        };

        if !factory.supports_row_scope() {
            let option = if spec.filter.is_some() {
                Some("filter")
            } else if spec.value_cast.is_some() {
                Some("value_cast")
            } else {
                None
            };
            if let Some(option) = option {
                return Err(ConfigError::UnsupportedOption {
                    node: id,
                    kind: spec.kind.clone(),
                    option,
                });
            }
        }

        let body = factory.build(&id, &spec.params, settings)?;
        let mut node =
            TransformerNode::new(id.clone(), body).with_dependencies(spec.depends_on.clone());
        if let Some(filter) = &spec.filter {
            let filter = RowFilter::parse(&filter.condition, filter.description.clone())
                .map_err(|source| ConfigError::Filter {
                    node: id.clone(),
                    source,
                })?;
            let read = filter.predicate().columns();
            if let Some(column) = node
                .rewritten_columns()
                .into_iter()
                .find(|column| read.contains(column))
            {
                return Err(ConfigError::FilterOnRewrittenColumn {
                    node: id,
                    column: column.to_string(),
                });
            }
            node = node.with_filter(filter);
        }
        if let Some(cast) = spec.value_cast {
            node = node.with_value_cast(cast);
        }
        Ok(node)
    }

    /// Build the pipeline of a table.
    pub fn build_pipeline(
        &self,
        table: &TableSpec,
        settings: &DeidSettings,
    ) -> Result<TablePipeline> {
        let mut pipeline = TablePipeline::new(table.name.clone());
        for (position, spec) in table.transformers.iter().enumerate() {
            pipeline.add(self.build_node(spec, position, settings)?)?;
        }
        Ok(pipeline)
    }
}

/// Cached registry with every built-in kind.
static DEFAULT_REGISTRY: OnceLock<TransformerRegistry> = OnceLock::new();

/// The registry of built-in transformer kinds.
pub fn default_registry() -> &'static TransformerRegistry {
    DEFAULT_REGISTRY.get_or_init(build_default_registry)
}

/// Build a registry holding every built-in kind.
pub fn build_default_registry() -> TransformerRegistry {
    let mut registry = TransformerRegistry::new();
    registry.register(Box::new(IdentifierFactory));
    registry.register(Box::new(DatetimeShiftFactory));
    registry.register(Box::new(ColumnDropFactory));
    registry
}
