//! Lazy data loaders for path-valued source inputs.
//!
//! Relations over large resources register their data as file paths and
//! attach a loader at SUT registration time. The engine resolves each path
//! into an in-memory value immediately before the first SUT call, so a
//! thousand-case suite never holds a thousand loaded resources at once.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::case::DataLoaderFn;
use crate::errors::MetamorphicError;
use crate::value::Value;

fn read_file(path: &Path) -> Result<String, MetamorphicError> {
    fs::read_to_string(path).map_err(|e| {
        MetamorphicError::invalid_input(format!("could not read {}: {e}", path.display()))
    })
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => n.as_f64().map_or(Value::Nil, Value::Number),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect(),
        ),
    }
}

/// Loads the file as plain text.
pub fn text_loader() -> DataLoaderFn {
    Arc::new(|path| read_file(path).map(Value::String))
}

/// Loads the file as a JSON document.
pub fn json_loader() -> DataLoaderFn {
    Arc::new(|path| {
        let text = read_file(path)?;
        let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            MetamorphicError::invalid_input(format!("invalid JSON in {}: {e}", path.display()))
        })?;
        Ok(from_json(json))
    })
}

/// Dispatches on the file extension: `txt` as text, `json` as JSON.
/// Unsupported extensions are an invalid input.
pub fn standard_loader() -> DataLoaderFn {
    Arc::new(|path| {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match extension {
            "txt" => read_file(path).map(Value::String),
            "json" => json_loader()(path),
            other => Err(MetamorphicError::invalid_input(format!(
                "unsupported resource extension '{other}' for {}",
                path.display()
            ))),
        }
    })
}

#[cfg(test)]
mod loader_tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn text_loader_reads_contents() {
        let path = temp_file("metamorph_loader_text.txt", "hello");
        let loaded = text_loader()(&path).unwrap();
        assert_eq!(loaded, Value::String("hello".into()));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn json_loader_converts_documents() {
        let path = temp_file(
            "metamorph_loader_doc.json",
            r#"{"xs": [1, 2], "ok": true, "name": "n", "missing": null}"#,
        );
        let loaded = json_loader()(&path).unwrap();
        let Value::Map(map) = loaded else {
            panic!("expected a map");
        };
        assert_eq!(
            map.get("xs"),
            Some(&Value::List(vec![Value::Number(1.0), Value::Number(2.0)]))
        );
        assert_eq!(map.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(map.get("missing"), Some(&Value::Nil));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn standard_loader_rejects_unknown_extensions() {
        let path = temp_file("metamorph_loader_blob.bin", "xx");
        let err = standard_loader()(&path).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("unsupported resource extension"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_json_is_invalid_input() {
        let path = temp_file("metamorph_loader_bad.json", "{not json");
        let err = json_loader()(&path).unwrap_err();
        assert!(err.is_recoverable());
        fs::remove_file(&path).ok();
    }
}
