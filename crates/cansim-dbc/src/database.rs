//! Signal database - static mapping from frame id to message layout
//!
//! Built once at startup and read-only afterwards. Construction validates
//! every message, so a database that exists is always well-formed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::definition::MessageDefinition;
use crate::error::{CodecError, CodecResult, DatabaseError, DatabaseResult};

/// Validated, immutable set of message definitions
#[derive(Debug, Clone, Default)]
pub struct SignalDatabase {
    messages: BTreeMap<u32, MessageDefinition>,
    meta: DatabaseMeta,
}

/// Metadata about the database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMeta {
    /// Name of the network/definition set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Version string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// On-disk layout shared by the YAML and TOML loaders
#[derive(Debug, Default, Serialize, Deserialize)]
struct DefinitionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<DatabaseMeta>,
    #[serde(default)]
    messages: Vec<MessageDefinition>,
}

impl SignalDatabase {
    /// Build a database, rejecting duplicate ids and malformed layouts
    pub fn new(messages: impl IntoIterator<Item = MessageDefinition>) -> DatabaseResult<Self> {
        Self::with_meta(DatabaseMeta::default(), messages)
    }

    /// Build a database with metadata
    pub fn with_meta(
        meta: DatabaseMeta,
        messages: impl IntoIterator<Item = MessageDefinition>,
    ) -> DatabaseResult<Self> {
        let mut map = BTreeMap::new();
        for message in messages {
            message.validate()?;
            let id = message.id;
            if map.insert(id, message).is_some() {
                return Err(DatabaseError::DuplicateMessage(id));
            }
        }
        Ok(Self {
            messages: map,
            meta,
        })
    }

    /// Load definitions from a YAML string
    pub fn from_yaml(yaml: &str) -> DatabaseResult<Self> {
        let file: DefinitionFile = serde_yaml::from_str(yaml)?;
        Self::with_meta(file.meta.unwrap_or_default(), file.messages)
    }

    /// Load definitions from a TOML string
    pub fn from_toml(toml_str: &str) -> DatabaseResult<Self> {
        let file: DefinitionFile = toml::from_str(toml_str)?;
        Self::with_meta(file.meta.unwrap_or_default(), file.messages)
    }

    /// Load definitions from a file, picking the format by extension
    ///
    /// `.toml` is parsed as TOML, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Look up a message layout
    pub fn lookup(&self, id: u32) -> CodecResult<&MessageDefinition> {
        self.messages.get(&id).ok_or(CodecError::UnknownMessage(id))
    }

    /// Look up a message layout, `None` if unregistered
    pub fn get(&self, id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&id)
    }

    /// Check if an id is registered
    pub fn contains(&self, id: u32) -> bool {
        self.messages.contains_key(&id)
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<u32> {
        self.messages.keys().copied().collect()
    }

    /// All definitions in ascending id order
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.messages.values()
    }

    /// Get the number of registered messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get metadata
    pub fn meta(&self) -> &DatabaseMeta {
        &self.meta
    }

    /// Export definitions to YAML
    pub fn to_yaml(&self) -> DatabaseResult<String> {
        let file = DefinitionFile {
            meta: Some(self.meta.clone()),
            messages: self.messages.values().cloned().collect(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SignalDescriptor;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const YAML: &str = r#"
meta:
  name: Demo vehicle
  version: "1.0"

messages:
  - id: "0x100"
    name: Engine
    signals:
      - name: EngineTemp
        start_bit: 0
        bit_length: 16
        scale: 0.01
        unit: degC
      - name: RPM
        start_bit: 32
        bit_length: 32
        unit: rpm
  - id: 512
    name: ABS
    signals:
      - name: WheelSpeedFL
        start_bit: 0
        bit_length: 16
        scale: 0.01
"#;

    #[test]
    fn test_from_yaml() {
        let db = SignalDatabase::from_yaml(YAML).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.ids(), vec![0x100, 0x200]);
        assert_eq!(db.meta().name.as_deref(), Some("Demo vehicle"));

        let engine = db.lookup(0x100).unwrap();
        assert_eq!(engine.label(), "Engine");
        assert_eq!(engine.signals.len(), 2);
        assert_eq!(engine.signals[0].scale, 0.01);
        assert_eq!(engine.signals[1].scale, 1.0);
        assert_eq!(engine.signals[1].unit, "rpm");
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
[meta]
name = "Transmission only"

[[messages]]
id = 0x120
name = "Transmission"

[[messages.signals]]
name = "Gear"
start_bit = 0
bit_length = 4

[[messages.signals]]
name = "FluidTemp"
start_bit = 16
bit_length = 8
offset = -40.0
unit = "degC"
"#;
        let db = SignalDatabase::from_toml(toml_str).unwrap();
        let msg = db.lookup(0x120).unwrap();
        assert_eq!(msg.signals[1].offset, -40.0);
        assert_eq!(msg.dlc(), 3);
    }

    #[test]
    fn test_lookup_unknown() {
        let db = SignalDatabase::default();
        assert_eq!(db.lookup(0x7FF), Err(CodecError::UnknownMessage(0x7FF)));
        assert!(db.get(0x7FF).is_none());
        assert!(db.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_fatal() {
        let result = SignalDatabase::new(vec![
            MessageDefinition::new(0x100).with_signal(SignalDescriptor::new("A", 0, 8)),
            MessageDefinition::new(0x100).with_signal(SignalDescriptor::new("B", 0, 8)),
        ]);
        assert!(matches!(result, Err(DatabaseError::DuplicateMessage(0x100))));
    }

    #[test]
    fn test_overlap_in_file_is_fatal() {
        let yaml = r#"
messages:
  - id: 0x300
    signals:
      - { name: A, start_bit: 0, bit_length: 8 }
      - { name: B, start_bit: 4, bit_length: 8 }
"#;
        let result = SignalDatabase::from_yaml(yaml);
        assert!(matches!(
            result,
            Err(DatabaseError::OverlappingSignals { message: 0x300, .. })
        ));
    }

    #[test]
    fn test_bad_id_string() {
        let yaml = r#"
messages:
  - id: "engine"
"#;
        assert!(matches!(
            SignalDatabase::from_yaml(yaml),
            Err(DatabaseError::YamlError(_))
        ));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("vehicle.yaml");
        std::fs::File::create(&yaml_path)
            .unwrap()
            .write_all(YAML.as_bytes())
            .unwrap();
        assert_eq!(SignalDatabase::from_file(&yaml_path).unwrap().len(), 2);

        let toml_path = dir.path().join("vehicle.toml");
        std::fs::write(
            &toml_path,
            "[[messages]]\nid = 0x100\n[[messages.signals]]\nname = \"A\"\nstart_bit = 0\nbit_length = 8\n",
        )
        .unwrap();
        assert_eq!(SignalDatabase::from_file(&toml_path).unwrap().len(), 1);

        assert!(matches!(
            SignalDatabase::from_file(dir.path().join("missing.yaml")),
            Err(DatabaseError::IoError(_))
        ));
    }

    #[test]
    fn test_yaml_export_reloads() {
        let db = SignalDatabase::from_yaml(YAML).unwrap();
        let exported = db.to_yaml().unwrap();
        let reloaded = SignalDatabase::from_yaml(&exported).unwrap();
        assert_eq!(reloaded.ids(), db.ids());
        assert_eq!(reloaded.lookup(0x100).unwrap(), db.lookup(0x100).unwrap());
    }
}
