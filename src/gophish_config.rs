// gophish_config.rs - Read-modify-write of the GoPhish config.json
// Only the listener and TLS fields are touched; every other field, and the
// key order of the document, passes through unchanged.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::ProvisionError;
use crate::settings::{ADMIN_LISTEN_URL, PHISH_LISTEN_URL};

const INDENT: &[u8] = b"    ";

/// Rewrite `path` so the admin UI listens on all interfaces and the phishing
/// server serves TLS with the given certificate and key.
///
/// A missing file yields `NotFound` without touching the filesystem. Invalid
/// JSON or a missing `admin_server`/`phish_server` object yields
/// `MalformedConfig` and leaves the file as it was. The certificate and key
/// strings are written as given.
pub fn update_config(path: &Path, cert_path: &str, key_path: &str) -> Result<(), ProvisionError> {
    if !path.exists() {
        return Err(ProvisionError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ProvisionError::io(format!("read {}", path.display()), e))?;

    let mut document: Value = serde_json::from_str(&content).map_err(|e| ProvisionError::MalformedConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    apply_settings(&mut document, cert_path, key_path).map_err(|reason| ProvisionError::MalformedConfig {
        path: path.to_path_buf(),
        reason,
    })?;

    let rendered = render(&document)
        .map_err(|e| ProvisionError::io(format!("serialize {}", path.display()), e.into()))?;

    fs::write(path, rendered).map_err(|e| ProvisionError::io(format!("write {}", path.display()), e))
}

/// Set the five managed fields on an already parsed document.
pub fn apply_settings(document: &mut Value, cert_path: &str, key_path: &str) -> Result<(), String> {
    if !document.is_object() {
        return Err("top-level value is not a JSON object".to_string());
    }

    let admin = section(document, "admin_server")?;
    admin.insert("listen_url".to_string(), Value::from(ADMIN_LISTEN_URL));

    let phish = section(document, "phish_server")?;
    phish.insert("listen_url".to_string(), Value::from(PHISH_LISTEN_URL));
    phish.insert("use_tls".to_string(), Value::Bool(true));
    phish.insert("cert_path".to_string(), Value::from(cert_path));
    phish.insert("key_path".to_string(), Value::from(key_path));

    Ok(())
}

fn section<'a>(document: &'a mut Value, name: &str) -> Result<&'a mut Map<String, Value>, String> {
    document
        .get_mut(name)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| format!("missing `{}` object", name))
}

fn render(document: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}
