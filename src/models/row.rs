use serde_json::{json, Value};

/// One cell of a result row, as fetched from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
    Bytes(Vec<u8>),
}

pub type Row = Vec<CellValue>;

impl CellValue {
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Integer(i) => json!(i),
            // NaN and infinities have no JSON form.
            CellValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Boolean(b) => json!(b),
            CellValue::Text(s) => json!(s),
            CellValue::Bytes(bytes) => json!(hex(bytes)),
        }
    }

    /// Text form for table cells; `None` for SQL NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Integer(i) => Some(i.to_string()),
            CellValue::Real(f) => Some(f.to_string()),
            CellValue::Boolean(b) => Some(b.to_string()),
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Bytes(bytes) => Some(hex(bytes)),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_forms() {
        assert_eq!(CellValue::Null.to_json(), Value::Null);
        assert_eq!(CellValue::Integer(42).to_json(), json!(42));
        assert_eq!(CellValue::Real(1.5).to_json(), json!(1.5));
        assert_eq!(CellValue::Real(f64::NAN).to_json(), Value::Null);
        assert_eq!(CellValue::Bytes(vec![0x0a, 0xff]).to_json(), json!("0aff"));
    }

    #[test]
    fn test_text_forms() {
        assert_eq!(CellValue::Null.to_text(), None);
        assert_eq!(CellValue::Boolean(true).to_text().as_deref(), Some("true"));
        assert_eq!(CellValue::Text("M31".to_string()).to_text().as_deref(), Some("M31"));
    }
}
