// Rows of the metaserv catalog: databases own schemas, schemas own tables,
// tables own columns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDatabase {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSchema {
    pub id: i64,
    pub db_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub id: i64,
    pub schema_id: i64,
    /// Filled in by catalog lookup.
    pub schema_name: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub id: i64,
    pub table_id: i64,
    /// Filled in by catalog lookup.
    pub table_name: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub ordinal: Option<i32>,
    pub ucd: Option<String>,
    pub unit: Option<String>,
    pub datatype: Option<String>,
    pub nullable: Option<bool>,
    pub array_size: Option<i32>,
}

impl CatalogColumn {
    /// Column with only a name and the descriptive fields set. Used by static
    /// catalogs and tests.
    pub fn described(
        id: i64,
        table_id: i64,
        name: &str,
        datatype: &str,
        ucd: Option<&str>,
        unit: Option<&str>,
    ) -> Self {
        Self {
            id,
            table_id,
            table_name: None,
            name: name.to_string(),
            description: None,
            ordinal: None,
            ucd: ucd.map(str::to_string),
            unit: unit.map(str::to_string),
            datatype: Some(datatype.to_string()),
            nullable: None,
            array_size: None,
        }
    }
}
