//! Turns the host's raw upload submission into a tree of [`UploadedFile`]s.
//!
//! The raw submission maps each form field to either a single entry
//! (`{"name": .., "type": .., "tmp_name": .., "error": .., "size": ..}`), an
//! entry whose values are index-keyed collections (a multi-file field), or a
//! nested map of further fields.

use serde_json::{Map, Value};

use crate::{
    error_code::UploadErrorCode,
    errors::UploadError,
    host::DynUploadHost,
    uploaded_file::{UploadedFile, UploadedFileBuilder},
};

const ENTRY_KEYS: [&str; 5] = ["name", "type", "tmp_name", "error", "size"];

#[derive(Debug)]
pub enum UploadedFileNode {
    File(UploadedFile),
    Tree(UploadedFiles),
}

impl UploadedFileNode {
    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            UploadedFileNode::File(file) => Some(file),
            UploadedFileNode::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&UploadedFiles> {
        match self {
            UploadedFileNode::Tree(tree) => Some(tree),
            UploadedFileNode::File(_) => None,
        }
    }
}

/// Uploaded files keyed by field name, in submission order.
#[derive(Debug, Default)]
pub struct UploadedFiles {
    entries: Vec<(String, UploadedFileNode)>,
}

impl UploadedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node` under `key`, replacing an earlier node with the same key
    /// in place.
    pub fn insert(&mut self, key: impl Into<String>, node: UploadedFileNode) {
        let key = key.into();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => self.entries[index].1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&UploadedFileNode> {
        self.entries
            .iter()
            .find_map(|(k, node)| (k == key).then_some(node))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut UploadedFileNode> {
        self.entries
            .iter_mut()
            .find_map(|(k, node)| (k == key).then_some(node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UploadedFileNode)> {
        self.entries.iter().map(|(k, node)| (k.as_str(), node))
    }

    /// Every leaf with its bracketed field path, e.g. `photos[0]`.
    pub fn flatten_mut(&mut self) -> Vec<(String, &mut UploadedFile)> {
        let mut leaves = vec![];
        flatten_into(&mut leaves, None, self);
        leaves
    }
}

fn flatten_into<'a>(
    leaves: &mut Vec<(String, &'a mut UploadedFile)>,
    prefix: Option<&str>,
    tree: &'a mut UploadedFiles,
) {
    for (key, node) in tree.entries.iter_mut() {
        let field = field_path(prefix, key);
        match node {
            UploadedFileNode::File(file) => leaves.push((field, file)),
            UploadedFileNode::Tree(subtree) => flatten_into(leaves, Some(&field), subtree),
        }
    }
}

fn field_path(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}[{key}]"),
        None => key.to_string(),
    }
}

/// Parses the raw submission tree.
///
/// Fields that are neither an entry nor a nested collection are skipped.
/// Every file produced is a host upload owned by `host`.
pub fn parse_uploaded_files(
    raw: &Value,
    host: &DynUploadHost,
) -> Result<UploadedFiles, UploadError> {
    let Value::Object(fields) = raw else {
        return Err(UploadError::malformed("", "expected a map of form fields"));
    };

    parse_fields(fields, None, host)
}

/// Normalized files win when present; otherwise the raw submission is parsed,
/// and with neither the result is empty.
pub fn collect_uploaded_files(
    normalized: Option<UploadedFiles>,
    raw: Option<&Value>,
    host: &DynUploadHost,
) -> Result<UploadedFiles, UploadError> {
    match (normalized, raw) {
        (Some(files), _) => Ok(files),
        (None, Some(raw)) => parse_uploaded_files(raw, host),
        (None, None) => Ok(UploadedFiles::new()),
    }
}

fn parse_fields(
    fields: &Map<String, Value>,
    prefix: Option<&str>,
    host: &DynUploadHost,
) -> Result<UploadedFiles, UploadError> {
    let mut parsed = UploadedFiles::new();

    for (key, value) in fields {
        let field = field_path(prefix, key);
        if let Some(node) = parse_value(value, &field, host)? {
            parsed.insert(key.as_str(), node);
        }
    }

    Ok(parsed)
}

fn parse_value(
    value: &Value,
    field: &str,
    host: &DynUploadHost,
) -> Result<Option<UploadedFileNode>, UploadError> {
    let node = match value {
        Value::Object(entry) if entry.contains_key("error") => match &entry["error"] {
            Value::Object(_) | Value::Array(_) => {
                UploadedFileNode::Tree(parse_grouped(entry, field, host)?)
            },
            _ => UploadedFileNode::File(parse_entry(entry, field, host)?),
        },
        Value::Object(fields) => {
            UploadedFileNode::Tree(parse_fields(fields, Some(field), host)?)
        },
        Value::Array(items) => {
            UploadedFileNode::Tree(parse_fields(&indexed(items), Some(field), host)?)
        },
        _ => return Ok(None),
    };

    Ok(Some(node))
}

/// Splits a multi-file entry into one entry per index, each index keeping the
/// shape found under `error` so nested groups recurse naturally.
fn parse_grouped(
    entry: &Map<String, Value>,
    field: &str,
    host: &DynUploadHost,
) -> Result<UploadedFiles, UploadError> {
    let mut regrouped = Map::new();

    for index in collection_keys(&entry["error"]) {
        let mut sub_entry = Map::new();
        for key in ENTRY_KEYS {
            let value = entry
                .get(key)
                .and_then(|values| collection_get(values, &index));
            if let Some(value) = value {
                sub_entry.insert(key.to_string(), value.clone());
            }
        }
        regrouped.insert(index, Value::Object(sub_entry));
    }

    parse_fields(&regrouped, Some(field), host)
}

fn collection_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        _ => vec![],
    }
}

fn collection_get<'a>(value: &'a Value, index: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(index),
        Value::Array(items) => index.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn indexed(items: &[Value]) -> Map<String, Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (i.to_string(), item.clone()))
        .collect()
}

fn parse_entry(
    entry: &Map<String, Value>,
    field: &str,
    host: &DynUploadHost,
) -> Result<UploadedFile, UploadError> {
    let tmp_name = match entry.get("tmp_name") {
        Some(Value::String(tmp_name)) => tmp_name,
        Some(_) => return Err(UploadError::malformed(field, "tmp_name must be a string")),
        None => return Err(UploadError::malformed(field, "missing tmp_name")),
    };

    let error = match integer(&entry["error"]) {
        Some(code) => UploadErrorCode::try_from(code)?,
        None => return Err(UploadError::malformed(field, "error must be an integer")),
    };

    let mut builder = UploadedFileBuilder::new(tmp_name)
        .with_error(error)
        .with_host(host.clone());

    if let Some(name) = optional_string(entry, "name", field)? {
        builder = builder.with_client_filename(name);
    }
    if let Some(media_type) = optional_string(entry, "type", field)? {
        builder = builder.with_client_media_type(media_type);
    }
    match entry.get("size") {
        None | Some(Value::Null) => {},
        Some(size) => match integer(size).and_then(|size| u64::try_from(size).ok()) {
            Some(size) => builder = builder.with_size(size),
            None => return Err(UploadError::malformed(field, "size must be a positive integer")),
        },
    }

    Ok(builder.build())
}

fn optional_string<'a>(
    entry: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<&'a str>, UploadError> {
    match entry.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(UploadError::malformed(field, format!("{key} must be a string"))),
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
