use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print a server response on stdout.
pub fn print_response(response: &Value, format: OutputFormat) {
    println!("{}", render_response(response, format));
}

pub fn render_response(response: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => response.to_string(),
        OutputFormat::Pretty => {
            serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string())
        }
        OutputFormat::Table => render_table(response),
        OutputFormat::Raw => match response {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        },
    }
}

fn render_table(response: &Value) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match response {
        Value::Object(map) => {
            table.set_header(vec!["KEY", "VALUE"]);
            for (key, value) in map {
                table.add_row(vec![key.clone(), cell(value)]);
            }
        }
        Value::Array(items) => {
            table.set_header(vec!["#", "VALUE"]);
            for (index, value) in items.iter().enumerate() {
                table.add_row(vec![index.to_string(), cell(value)]);
            }
        }
        scalar => {
            table.set_header(vec!["VALUE"]);
            table.add_row(vec![cell(scalar)]);
        }
    }
    table.to_string()
}

// Strings unquoted, nested values as compact JSON.
fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// One line of plain text for commands whose result is not a server response.
pub fn print_text(label: &str, text: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ label: text })),
        _ => println!("{text}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_is_compact() {
        let value = json!({"deleted": "sales"});
        assert_eq!(
            render_response(&value, OutputFormat::Json),
            r#"{"deleted":"sales"}"#
        );
    }

    #[test]
    fn pretty_spans_lines() {
        let rendered = render_response(&json!({"a": 1}), OutputFormat::Pretty);
        assert_eq!(rendered, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn raw_prints_strings_without_quotes() {
        assert_eq!(render_response(&json!("done"), OutputFormat::Raw), "done");
        assert_eq!(render_response(&json!(42), OutputFormat::Raw), "42");
    }

    #[test]
    fn table_lists_object_fields() {
        let rendered = render_response(
            &json!({"status": "ok", "groups": ["a", "b"]}),
            OutputFormat::Table,
        );
        assert!(rendered.contains("KEY"));
        assert!(rendered.contains("status"));
        assert!(rendered.contains(r#"["a","b"]"#));
    }

    #[test]
    fn table_handles_arrays_and_scalars() {
        let rendered = render_response(&json!([1, "two"]), OutputFormat::Table);
        assert!(rendered.contains("two"));
        assert!(!rendered.contains("\"two\""));

        let rendered = render_response(&json!(null), OutputFormat::Table);
        assert!(rendered.contains("null"));
    }
}
