use std::io::Write;

use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::metadata::Envelope;

pub fn render(envelope: &Envelope, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_envelope(&mut handle, envelope, format, pretty)?;
    handle.flush()?;
    Ok(())
}

fn write_envelope<W: Write>(
    out: &mut W,
    envelope: &Envelope,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let rendered = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            writeln!(out, "{rendered}")?;
        }
        OutputFormat::Table => {
            let meta = serde_json::to_value(&envelope.meta)?;
            let mut rows = Vec::new();
            flatten("meta", &meta, &mut rows);
            flatten("data", &envelope.data, &mut rows);

            let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
            for (key, value) in rows {
                writeln!(out, "{key:<width$}  {value}")?;
            }
        }
    }
    Ok(())
}

/// Flatten nested JSON into dotted `key  value` rows.
fn flatten(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten(&format!("{prefix}.{key}"), nested, rows);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, nested) in items.iter().enumerate() {
                flatten(&format!("{prefix}[{index}]"), nested, rows);
            }
        }
        Value::String(text) => rows.push((prefix.to_owned(), text.clone())),
        other => rows.push((prefix.to_owned(), other.to_string())),
    }
}
