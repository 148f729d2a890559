//! DDL script generation.
//!
//! A [`ScriptGeneratorContext`] carries everything needed to render schema
//! objects for one target: the dialect, optional catalog/schema overrides,
//! the requested [`ScriptType`]s and the default-value translators. Per
//! object generators live in [`generators`]; [`ScriptGeneratorManager`]
//! orders a whole database and [`ScriptExporter`]s write the result.

mod exporter;
pub mod generators;
mod manager;
pub mod naming;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use exporter::{FileScriptExporter, ScriptExporter, SessionScriptExporter, WriterScriptExporter};
pub use generators::{
    CheckGenerator, ColumnGenerator, ForeignKeyGenerator, IndexGenerator, PrimaryKeyGenerator,
    SequenceGenerator, TableGenerator, TableObject,
};
pub use manager::ScriptGeneratorManager;

use crate::core::identifier::Identifier;
use crate::core::session::DatabaseInfo;
use crate::dialect::{unwrap_parens, Dialect, Script, SessionState, TranslationContext, TranslationManager};
use crate::error::{MigrateError, Result};
use crate::metadata::{Column, MetaData, MetaDataType, QualifiedName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Drop,
    Create,
}

impl ScriptType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Some(ScriptType::Drop),
            "create" => Some(ScriptType::Create),
            _ => None,
        }
    }
}

/// Case folding applied to identifiers before they are quoted.
///
/// Quoted source identifiers are case sensitive and never folded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierNormalizer {
    #[default]
    Noop,
    /// SQL standard folding: unquoted names are upper case.
    Standard,
    Lower,
    Upper,
}

impl IdentifierNormalizer {
    pub fn normalize(&self, identifier: &Identifier) -> String {
        let value = identifier.value();
        if identifier.is_quoted() {
            return value.to_string();
        }
        match self {
            IdentifierNormalizer::Noop => value.to_string(),
            IdentifierNormalizer::Standard | IdentifierNormalizer::Upper => value.to_uppercase(),
            IdentifierNormalizer::Lower => value.to_lowercase(),
        }
    }
}

/// Rendering settings shared by every generator.
#[derive(Debug, Clone)]
pub struct ScriptGeneratorContext {
    dialect: Arc<dyn Dialect>,
    target_catalog: Option<Identifier>,
    target_schema: Option<Identifier>,
    script_types: BTreeSet<ScriptType>,
    meta_data_types: BTreeSet<MetaDataType>,
    normalizer: IdentifierNormalizer,
    translations: TranslationManager,
    state: SessionState,
    source: DatabaseInfo,
}

impl ScriptGeneratorContext {
    /// Context rendering DROP and CREATE scripts for every object kind.
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            target_catalog: None,
            target_schema: None,
            script_types: [ScriptType::Drop, ScriptType::Create].into_iter().collect(),
            meta_data_types: MetaDataType::ALL.into_iter().collect(),
            normalizer: IdentifierNormalizer::default(),
            translations: TranslationManager::default(),
            state: SessionState::new(),
            source: DatabaseInfo::default(),
        }
    }

    pub fn with_target_catalog(mut self, catalog: Option<&str>) -> Self {
        self.target_catalog = catalog.map(Identifier::parse);
        self
    }

    pub fn with_target_schema(mut self, schema: Option<&str>) -> Self {
        self.target_schema = schema.map(Identifier::parse);
        self
    }

    pub fn with_script_types(mut self, script_types: impl IntoIterator<Item = ScriptType>) -> Self {
        self.script_types = script_types.into_iter().collect();
        self
    }

    pub fn with_meta_data_types(mut self, types: impl IntoIterator<Item = MetaDataType>) -> Self {
        self.meta_data_types = types.into_iter().collect();
        self
    }

    pub fn with_normalizer(mut self, normalizer: IdentifierNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_translations(mut self, translations: TranslationManager) -> Self {
        self.translations = translations;
        self
    }

    /// Session state of the source connection, consulted by translators.
    pub fn with_session_state(mut self, state: SessionState) -> Self {
        self.state = state;
        self
    }

    /// Product the rendered objects were inspected from.
    pub fn with_source(mut self, source: DatabaseInfo) -> Self {
        self.source = source;
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn source(&self) -> &DatabaseInfo {
        &self.source
    }

    pub fn script_types(&self) -> &BTreeSet<ScriptType> {
        &self.script_types
    }

    pub fn has_script_type(&self, script_type: ScriptType) -> bool {
        self.script_types.contains(&script_type)
    }

    /// Whether objects of `object_type` are rendered at all.
    pub fn generates(&self, object_type: MetaDataType) -> bool {
        self.meta_data_types.contains(&object_type)
    }

    /// Render a single name: the raw value, or normalized and quoted.
    pub fn name(&self, identifier: &Identifier, normalize: bool) -> Result<String> {
        if normalize {
            self.dialect.quote(&self.normalizer.normalize(identifier))
        } else {
            Ok(identifier.value().to_string())
        }
    }

    /// Render a catalog/schema qualified name, applying the target overrides.
    ///
    /// The catalog is kept only where the dialect has catalogs and either a
    /// schema part follows it or the dialect has no schemas.
    pub fn qualified_name(&self, name: &QualifiedName, normalize: bool) -> Result<String> {
        let dialect = self.dialect();
        let catalog = self.target_catalog.as_ref().or(name.catalog.as_ref());
        let schema = self
            .target_schema
            .as_ref()
            .or(name.schema.as_ref())
            .filter(|_| dialect.supports_schemas());
        let catalog = catalog.filter(|_| dialect.supports_catalogs() && (schema.is_some() || !dialect.supports_schemas()));

        let mut parts = Vec::with_capacity(3);
        for part in [catalog, schema, Some(&name.name)].into_iter().flatten() {
            parts.push(self.name(part, normalize)?);
        }
        Ok(parts.join("."))
    }

    /// Name of any metadata object.
    pub fn get_name(&self, object: &dyn MetaData, normalize: bool) -> Result<String> {
        let identifier = object.identifier().ok_or_else(|| {
            MigrateError::ScriptGenerator(format!("{} has no name", object.object_type()))
        })?;
        self.name(identifier, normalize)
    }

    /// Qualified name of any metadata object. Tables and sequences are
    /// qualified with their (overridden) catalog and schema; other objects
    /// render as their plain name.
    pub fn get_qualified_name(&self, object: &dyn MetaData, normalize: bool) -> Result<String> {
        match object.object_type() {
            MetaDataType::Table | MetaDataType::Sequence => {
                let (catalog, schema) = object.container();
                let name = object.identifier().ok_or_else(|| {
                    MigrateError::ScriptGenerator(format!("{} has no name", object.object_type()))
                })?;
                self.qualified_name(
                    &QualifiedName {
                        catalog: catalog.cloned(),
                        schema: schema.cloned(),
                        name: name.clone(),
                    },
                    normalize,
                )
            }
            _ => self.get_name(object, normalize),
        }
    }

    /// Column default after the translator chain; SQL Server's redundant
    /// wrapping parentheses are removed first.
    pub fn translate_default(&self, column: &Column) -> Result<Option<String>> {
        let value = column.default_value.as_deref().map(unwrap_parens);
        let script = Script {
            value,
            source: &self.source,
        };
        let context = TranslationContext {
            target: self.dialect(),
            state: &self.state,
        };
        self.translations
            .translate(&script, column, &context)
            .map_err(|e| match e {
                MigrateError::Translator(message) => MigrateError::Translator(format!(
                    "default of column {}: {}",
                    column.name, message
                )),
                other => other,
            })
    }
}

/// Renders DROP and CREATE statements for one kind of object.
pub trait ScriptGenerator<T: ?Sized> {
    fn create_scripts(&self, object: &T, context: &ScriptGeneratorContext) -> Result<Vec<String>>;

    fn drop_scripts(&self, object: &T, context: &ScriptGeneratorContext) -> Result<Vec<String>>;

    /// DROP scripts followed by CREATE scripts, each only when requested.
    fn scripts(&self, object: &T, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let mut scripts = Vec::new();
        if context.has_script_type(ScriptType::Drop) {
            scripts.extend(self.drop_scripts(object, context)?);
        }
        if context.has_script_type(ScriptType::Create) {
            scripts.extend(self.create_scripts(object, context)?);
        }
        Ok(scripts)
    }
}
