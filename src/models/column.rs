use serde::{Deserialize, Serialize};

/// Engine-neutral column type reported by an execution backend.
///
/// Backends map their native type codes onto this set; anything without a
/// counterpart becomes `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    NChar,
    NVarChar,
    Clob,
    Date,
    Time,
    Timestamp,
    TimestampWithTimezone,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Array,
    Boolean,
    Json,
    Null,
    Other,
}

impl EngineType {
    /// Logical datatype reported to clients when the catalog has nothing better.
    pub fn logical_type(&self) -> &'static str {
        match self {
            EngineType::Integer | EngineType::SmallInt | EngineType::TinyInt => "int",
            EngineType::BigInt => "long",
            EngineType::Float | EngineType::Real => "float",
            EngineType::Double | EngineType::Decimal | EngineType::Numeric => "double",
            EngineType::Array | EngineType::Binary | EngineType::Bit | EngineType::Blob => "binary",
            EngineType::Char | EngineType::VarChar | EngineType::NVarChar | EngineType::Clob => {
                "string"
            }
            EngineType::Boolean => "boolean",
            EngineType::Date | EngineType::Timestamp | EngineType::TimestampWithTimezone => {
                "timestamp"
            }
            EngineType::Time => "time",
            _ => "UNKNOWN",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            EngineType::TinyInt
                | EngineType::SmallInt
                | EngineType::Integer
                | EngineType::BigInt
                | EngineType::Float
                | EngineType::Real
                | EngineType::Double
                | EngineType::Numeric
                | EngineType::Decimal
        )
    }

    /// Column affinity used when declaring the mirror table.
    pub fn sqlite_affinity(&self) -> &'static str {
        match self {
            EngineType::TinyInt
            | EngineType::SmallInt
            | EngineType::Integer
            | EngineType::BigInt
            | EngineType::Boolean => "INTEGER",
            EngineType::Float
            | EngineType::Real
            | EngineType::Double
            | EngineType::Numeric
            | EngineType::Decimal => "REAL",
            EngineType::Binary
            | EngineType::VarBinary
            | EngineType::LongVarBinary
            | EngineType::Blob
            | EngineType::Bit => "BLOB",
            _ => "TEXT",
        }
    }
}

/// Per-column metadata of one executed result set, as the engine reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct JdbcColumnMetadata {
    pub name: String,
    pub label: Option<String>,
    pub table_name: String,
    /// 1-based.
    pub ordinal: usize,
    pub type_name: String,
    pub schema_name: Option<String>,
    pub catalog_name: Option<String>,
    pub nullable: bool,
    pub engine_type: EngineType,
}

impl JdbcColumnMetadata {
    /// Name shown to clients: the select alias when there is one.
    pub fn display_name(&self) -> &str {
        match &self.label {
            Some(label) if !label.is_empty() => label,
            _ => &self.name,
        }
    }
}

/// Output-facing column description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub datatype: Option<String>,
    pub description: String,
    pub ucd: Option<String>,
    pub unit: Option<String>,
    pub table_name: Option<String>,
    #[serde(skip)]
    pub engine_type: Option<EngineType>,
}
