//! Configuration files.
//!
//! # Responsibilities
//! - Detect the format from the file extension (YAML, TOML, JSON)
//! - Flatten nested tables into dotted keys (`server.port`)
//! - Attach a `path:line` location to every key
//!
//! # Design Decisions
//! - Arrays of scalars become lists; tables nested inside arrays are skipped
//! - Null values are skipped, they cannot be told apart from "unset"
//! - Line lookup is textual: each key segment is searched after the line
//!   of the previous one, falling back to the bare path when not found

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::engine::{Engine, Value};
use crate::loaders::{LoadError, Loader};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(FileFormat::Yaml),
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// A flattened file entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSetting {
    pub key: String,
    pub value: Value,
    pub location: String,
}

/// Loads one configuration file into a layer.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
    format: Option<FileFormat>,
    optional: bool,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            optional: false,
        }
    }

    /// A missing file loads nothing instead of failing.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Override extension-based detection.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and flatten the file without touching any engine.
    ///
    /// Lets a caller check that a changed file still parses before reloading.
    pub fn read_settings(&self) -> Result<Vec<FileSetting>, LoadError> {
        let format = self
            .format
            .or_else(|| FileFormat::from_path(&self.path))
            .ok_or_else(|| LoadError::UnsupportedFormat {
                path: self.path.clone(),
            })?;

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if self.optional && e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Optional config file not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(LoadError::io(&self.path, e)),
        };

        let entries = parse_document(&contents, format, &self.path)?;
        let display = self.path.display().to_string();
        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                let location = match find_line(&contents, &key) {
                    Some(line) => format!("{}:{}", display, line),
                    None => display.clone(),
                };
                FileSetting {
                    key,
                    value,
                    location,
                }
            })
            .collect())
    }

    /// Read the file once into a [`ParsedFile`].
    pub fn parse(&self) -> Result<ParsedFile, LoadError> {
        Ok(ParsedFile {
            path: self.path.clone(),
            settings: self.read_settings()?,
        })
    }
}

impl Loader for FileLoader {
    fn load(&mut self, engine: &mut Engine) -> Result<(), LoadError> {
        apply(self.read_settings()?, engine)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A file already read and flattened, applied later as a one-off load.
///
/// Used with [`Engine::reload_layer_using`] so the contents that were
/// validated are the contents that get loaded.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    path: PathBuf,
    settings: Vec<FileSetting>,
}

impl ParsedFile {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.settings.iter().map(|s| s.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

impl Loader for ParsedFile {
    fn load(&mut self, engine: &mut Engine) -> Result<(), LoadError> {
        apply(self.settings.clone(), engine)
    }

    fn describe(&self) -> String {
        format!("{} (parsed)", self.path.display())
    }
}

fn apply(settings: Vec<FileSetting>, engine: &mut Engine) -> Result<(), LoadError> {
    for FileSetting {
        key,
        value,
        location,
    } in settings
    {
        engine.set_value_at(key, value, location)?;
    }
    Ok(())
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Parse `contents` and flatten it into `(dotted key, value)` pairs.
pub fn parse_document(
    contents: &str,
    format: FileFormat,
    path: &Path,
) -> Result<Vec<(String, Value)>, LoadError> {
    let mut out = Vec::new();
    match format {
        FileFormat::Yaml => {
            // A document of only blanks and comments defines nothing.
            let blank = contents.lines().all(|line| {
                let line = line.trim();
                line.is_empty() || line.starts_with('#')
            });
            if blank {
                return Ok(out);
            }
            let doc: serde_yaml::Value =
                serde_yaml::from_str(contents).map_err(|source| LoadError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?;
            flatten_yaml("", &doc, &mut out);
        }
        FileFormat::Toml => {
            let doc: toml::Table = toml::from_str(contents).map_err(|source| LoadError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
            for (key, value) in &doc {
                flatten_toml(key, value, &mut out);
            }
        }
        FileFormat::Json => {
            let doc: serde_json::Value =
                serde_json::from_str(contents).map_err(|source| LoadError::Json {
                    path: path.to_path_buf(),
                    source,
                })?;
            flatten_json("", &doc, &mut out);
        }
    }
    Ok(out)
}

// --- YAML ---

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_scalar(node: &serde_yaml::Value) -> Option<Value> {
    match node {
        serde_yaml::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        serde_yaml::Value::String(s) => Some(Value::String(s.clone())),
        serde_yaml::Value::Sequence(items) => {
            Some(Value::List(items.iter().filter_map(yaml_scalar).collect()))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_scalar(&tagged.value),
        serde_yaml::Value::Null | serde_yaml::Value::Mapping(_) => None,
    }
}

fn flatten_yaml(prefix: &str, node: &serde_yaml::Value, out: &mut Vec<(String, Value)>) {
    match node {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                if let Some(key) = yaml_key(key) {
                    flatten_yaml(&join(prefix, &key), value, out);
                }
            }
        }
        serde_yaml::Value::Tagged(tagged) => flatten_yaml(prefix, &tagged.value, out),
        other if !prefix.is_empty() => {
            if let Some(value) = yaml_scalar(other) {
                out.push((prefix.to_string(), value));
            }
        }
        _ => {}
    }
}

// --- TOML ---

fn toml_scalar(node: &toml::Value) -> Option<Value> {
    match node {
        toml::Value::String(s) => Some(Value::String(s.clone())),
        toml::Value::Integer(i) => Some(Value::Integer(*i)),
        toml::Value::Float(f) => Some(Value::Float(*f)),
        toml::Value::Boolean(b) => Some(Value::Bool(*b)),
        toml::Value::Datetime(dt) => Some(Value::String(dt.to_string())),
        toml::Value::Array(items) => Some(Value::List(items.iter().filter_map(toml_scalar).collect())),
        toml::Value::Table(_) => None,
    }
}

fn flatten_toml(key: &str, node: &toml::Value, out: &mut Vec<(String, Value)>) {
    match node {
        toml::Value::Table(table) => {
            for (child, value) in table {
                flatten_toml(&join(key, child), value, out);
            }
        }
        other => {
            if let Some(value) = toml_scalar(other) {
                out.push((key.to_string(), value));
            }
        }
    }
}

// --- JSON ---

fn json_scalar(node: &serde_json::Value) -> Option<Value> {
    match node {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(json_scalar).collect()))
        }
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}

fn flatten_json(prefix: &str, node: &serde_json::Value, out: &mut Vec<(String, Value)>) {
    match node {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                flatten_json(&join(prefix, key), value, out);
            }
        }
        other if !prefix.is_empty() => {
            if let Some(value) = json_scalar(other) {
                out.push((prefix.to_string(), value));
            }
        }
        _ => {}
    }
}

// --- Locations ---

/// Whether `line` declares `segment` as a key or table header.
fn declares(line: &str, segment: &str) -> bool {
    let trimmed = line.trim_start();
    let trimmed = trimmed.strip_prefix("- ").unwrap_or(trimmed);

    if let Some(header) = trimmed.strip_prefix('[') {
        let header = header.trim_start_matches('[');
        let header = header.split(']').next().unwrap_or_default();
        return header.rsplit('.').next().map(str::trim) == Some(segment);
    }

    let rest = trimmed
        .strip_prefix('"')
        .and_then(|r| r.strip_prefix(segment))
        .and_then(|r| r.strip_prefix('"'))
        .or_else(|| trimmed.strip_prefix(segment));

    match rest {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.starts_with(':') || rest.starts_with('=')
        }
        None => false,
    }
}

/// 1-based line that declares the last segment of `key`.
fn find_line(contents: &str, key: &str) -> Option<usize> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut start = 0;
    let mut found = None;

    let mut segments = key.split('.').peekable();
    while let Some(segment) = segments.next() {
        match lines[start..].iter().position(|line| declares(line, segment)) {
            Some(offset) => {
                found = Some(start + offset);
                start += offset;
            }
            // A parent may be implicit (dotted keys), the leaf may not.
            None if segments.peek().is_none() => return None,
            None => {}
        }
    }
    found.map(|idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(contents: &str, format: FileFormat) -> Vec<(String, Value)> {
        let mut entries = parse_document(contents, format, Path::new("test")).unwrap();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_path(Path::new("a.yml")), Some(FileFormat::Yaml));
        assert_eq!(FileFormat::from_path(Path::new("a.YAML")), Some(FileFormat::Yaml));
        assert_eq!(FileFormat::from_path(Path::new("a.toml")), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_path(Path::new("a.json")), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path(Path::new("a.ini")), None);
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_yaml_flattening() {
        let yaml = "server:\n  host: example.com\n  port: 80\nratio: 0.5\ntags: [a, b]\nempty: ~\n";
        assert_eq!(
            flat(yaml, FileFormat::Yaml),
            vec![
                ("ratio".into(), Value::from(0.5)),
                ("server.host".into(), Value::from("example.com")),
                ("server.port".into(), Value::from(80)),
                ("tags".into(), Value::from(vec!["a", "b"])),
            ]
        );
    }

    #[test]
    fn test_empty_yaml() {
        assert!(flat("", FileFormat::Yaml).is_empty());
        assert!(flat("# only a comment\n", FileFormat::Yaml).is_empty());
    }

    #[test]
    fn test_toml_flattening() {
        let toml = "name = \"demo\"\n\n[server]\nport = 8080\n\n[server.tls]\nenabled = true\n";
        assert_eq!(
            flat(toml, FileFormat::Toml),
            vec![
                ("name".into(), Value::from("demo")),
                ("server.port".into(), Value::from(8080)),
                ("server.tls.enabled".into(), Value::from(true)),
            ]
        );
    }

    #[test]
    fn test_json_flattening() {
        let json = r#"{"a": {"b": 1, "c": null}, "d": [1, 2]}"#;
        assert_eq!(
            flat(json, FileFormat::Json),
            vec![
                ("a.b".into(), Value::from(1)),
                ("d".into(), Value::from(vec![1, 2])),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_document("a: [", FileFormat::Yaml, Path::new("x.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Yaml { .. }));
        let err = parse_document("a = ", FileFormat::Toml, Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Toml { .. }));
        let err = parse_document("{", FileFormat::Json, Path::new("x.json")).unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
    }

    #[test]
    fn test_find_line_follows_nesting() {
        let yaml = "client:\n  port: 1\nserver:\n  host: h\n  port: 2\n";
        assert_eq!(find_line(yaml, "client.port"), Some(2));
        assert_eq!(find_line(yaml, "server.port"), Some(5));
        assert_eq!(find_line(yaml, "missing"), None);
        assert_eq!(find_line(yaml, "server.timeout"), None);

        let toml = "[server]\nport = 1\n";
        assert_eq!(find_line(toml, "server.port"), Some(2));

        let json = "{\n  \"a\": {\n    \"b\": 1\n  }\n}\n";
        assert_eq!(find_line(json, "a.b"), Some(3));
    }

    #[test]
    fn test_declares() {
        assert!(declares("port: 80", "port"));
        assert!(declares("  port = 80", "port"));
        assert!(declares("\"port\": 80", "port"));
        assert!(declares("[server]", "server"));
        assert!(declares("[a.server]", "server"));
        assert!(!declares("portal: 1", "port"));
        assert!(!declares("# port: 1", "port"));
    }
}
