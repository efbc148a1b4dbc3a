//! Schema registry
//!
//! Externally supplied YAML describing, per target table, the ordered column
//! list and the conversion rule for each typed column, plus a list of named
//! SQL scripts. The engine only ever reads it.
//!
//! ```yaml
//! tables:
//!   tab02:
//!     columns: [data_completa, linha, valor, bloqueio_id]
//!     rules:
//!       data_completa: date
//!       valor: decimal
//!       bloqueio_id: integer
//!     formats:
//!       data_completa: ["%d/%m/%Y"]
//! scripts:
//!   - name: refresh totals
//!     sql: "REFRESH MATERIALIZED VIEW totals;"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Separator placed between registry scripts when several are run together
pub const SCRIPT_JOINER: &str = "\n;\n";

/// Conversion applied to one column after null normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRule {
    Integer,
    Decimal,
    Date,
    Time,
    Timestamp,
    Text,
    /// Text folded to ASCII: accents stripped, other non-ASCII dropped
    #[serde(rename = "ascii_text")]
    AsciiText,
}

/// One table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rules: BTreeMap<String, ColumnRule>,
    /// Explicit parse formats for date/time/timestamp columns
    #[serde(default)]
    pub formats: BTreeMap<String, Vec<String>>,
}

impl TableSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rules: BTreeMap::new(),
            formats: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, column: impl Into<String>, rule: ColumnRule) -> Self {
        self.rules.insert(column.into(), rule);
        self
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn rule_for(&self, column: &str) -> ColumnRule {
        self.rules.get(column).copied().unwrap_or(ColumnRule::Text)
    }

    pub fn formats_for(&self, column: &str) -> Option<&[String]> {
        self.formats.get(column).map(Vec::as_slice)
    }

    /// Rules or formats naming columns the table does not have
    pub fn unknown_rule_columns(&self) -> Vec<&str> {
        let known: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        self.rules
            .keys()
            .chain(self.formats.keys())
            .map(String::as_str)
            .filter(|c| !known.contains(c))
            .collect()
    }
}

/// A named SQL script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedScript {
    pub name: String,
    pub sql: String,
}

/// Table definitions and named scripts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    #[serde(default)]
    tables: BTreeMap<String, TableSchema>,
    #[serde(default)]
    scripts: Vec<NamedScript>,
}

impl SchemaRegistry {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(yaml)
            .map_err(|e| EngineError::registry(format!("invalid YAML: {}", e)))?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            EngineError::registry(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Structural checks that make the whole registry unusable.
    ///
    /// Rules that name unknown columns are deliberately not checked here: they
    /// only disable the affected table when it is loaded.
    pub fn validate(&self) -> Result<()> {
        for (name, schema) in &self.tables {
            if schema.columns.is_empty() {
                return Err(EngineError::registry(format!("table '{}' has no columns", name)));
            }
            let mut seen = HashSet::new();
            for column in &schema.columns {
                if !seen.insert(column.as_str()) {
                    return Err(EngineError::registry(format!(
                        "table '{}' lists column '{}' twice",
                        name, column
                    )));
                }
            }
        }

        let mut names = HashSet::new();
        for script in &self.scripts {
            if !names.insert(script.name.as_str()) {
                return Err(EngineError::registry(format!(
                    "script '{}' is defined twice",
                    script.name
                )));
            }
        }
        Ok(())
    }

    pub fn insert_table(&mut self, name: impl Into<String>, schema: TableSchema) {
        self.tables.insert(name.into(), schema);
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableSchema)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn scripts(&self) -> &[NamedScript] {
        &self.scripts
    }

    pub fn script(&self, name: &str) -> Option<&NamedScript> {
        self.scripts.iter().find(|s| s.name == name)
    }

    /// Join the named scripts, in the order given, into one script
    pub fn joined_scripts(&self, names: &[String]) -> Result<String> {
        let parts = names
            .iter()
            .map(|name| {
                self.script(name)
                    .map(|s| s.sql.as_str())
                    .ok_or_else(|| EngineError::registry(format!("no script named '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(SCRIPT_JOINER))
    }
}
