// Serializes a result stream as JSON or VOTable, one fragment at a time so the
// rows never have to be held in memory together.
use quick_xml::escape::escape;

use crate::api::middleware::AppError;
use crate::models::{ColumnMetadata, JobError, OutputFormat, Row};

const VOTABLE_NS: &str = "http://www.ivoa.net/xml/VOTable/v1.3";

pub struct ResultWriter {
    format: OutputFormat,
    query_id: String,
    rows_written: u64,
}

impl ResultWriter {
    pub fn new(format: OutputFormat, query_id: impl Into<String>) -> Self {
        Self {
            format,
            query_id: query_id.into(),
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn header(&self, columns: &[ColumnMetadata]) -> Result<String, AppError> {
        match self.format {
            OutputFormat::Json => Ok(format!(
                "{{\"metadata\":{{\"columns\":{}}},\"results\":[",
                serde_json::to_string(columns)?
            )),
            OutputFormat::VoTable => {
                let mut out = String::from("<?xml version=\"1.0\"?>");
                out.push_str(&format!("<VOTABLE version=\"1.3\" xmlns=\"{}\">", VOTABLE_NS));
                out.push_str(&format!(
                    "<RESOURCE name=\"Result for query: {}\" type=\"meta\">",
                    escape(self.query_id.as_str())
                ));
                out.push_str("<TABLE name=\"\"><DESCRIPTION>Query Results</DESCRIPTION>");
                for column in columns {
                    out.push_str(&field(column));
                }
                out.push_str("<DATA><TABLEDATA>");
                Ok(out)
            }
        }
    }

    pub fn row(&mut self, row: &Row) -> Result<String, AppError> {
        let first = self.rows_written == 0;
        self.rows_written += 1;
        match self.format {
            OutputFormat::Json => {
                let values: Vec<serde_json::Value> = row.iter().map(|cell| cell.to_json()).collect();
                let encoded = serde_json::to_string(&values)?;
                Ok(if first { encoded } else { format!(",{}", encoded) })
            }
            OutputFormat::VoTable => {
                let mut out = String::from("<TR>");
                for cell in row {
                    match cell.to_text() {
                        Some(text) => {
                            out.push_str("<TD>");
                            out.push_str(&escape(text.as_str()));
                            out.push_str("</TD>");
                        }
                        None => out.push_str("<TD/>"),
                    }
                }
                out.push_str("</TR>");
                Ok(out)
            }
        }
    }

    pub fn footer(&self) -> &'static str {
        match self.format {
            OutputFormat::Json => "]}",
            OutputFormat::VoTable => "</TABLEDATA></DATA></TABLE></RESOURCE></VOTABLE>",
        }
    }
}

fn field(column: &ColumnMetadata) -> String {
    let mut out = format!("<FIELD name=\"{}\"", escape(column.name.as_str()));
    for (attribute, value) in [
        ("ucd", &column.ucd),
        ("datatype", &column.datatype),
        ("unit", &column.unit),
    ] {
        if let Some(value) = value {
            out.push_str(&format!(" {}=\"{}\"", attribute, escape(value.as_str())));
        }
    }
    out.push_str(&format!(
        "><DESCRIPTION>{}</DESCRIPTION></FIELD>",
        escape(column.description.as_str())
    ));
    out
}

/// Error document in the requested format.
pub fn error_document(format: OutputFormat, error: &JobError) -> Result<String, AppError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(error)?),
        OutputFormat::VoTable => {
            let mut out = String::from("<?xml version=\"1.0\"?><Error>");
            out.push_str(&format!("<Message>{}</Message>", escape(error.message.as_str())));
            out.push_str(&format!("<type>{}</type>", escape(error.kind.as_str())));
            if let Some(state) = &error.state {
                out.push_str(&format!("<state>{}</state>", escape(state.as_str())));
            }
            if let Some(code) = &error.code {
                out.push_str(&format!("<code>{}</code>", escape(code.as_str())));
            }
            out.push_str("</Error>");
            Ok(out)
        }
    }
}
