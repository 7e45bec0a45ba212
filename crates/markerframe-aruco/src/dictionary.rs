//! Dictionary metadata and packed marker codes.

use crate::builtins::{builtin_dictionary, builtin_names};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dictionary JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid dictionary '{name}': {reason}")]
    Invalid { name: String, reason: String },
    #[error("unknown dictionary '{name}' (built in: {available})")]
    UnknownBuiltin { name: String, available: String },
}

/// An ArUco-style dictionary loaded at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    /// Human-readable name (for logging).
    pub name: String,
    /// Number of inner bits per marker side.
    pub marker_size: usize,
    /// Maximum Hamming distance the dictionary can correct.
    #[serde(default)]
    pub max_correction_bits: u8,
    /// One code per marker id, inner `marker_size × marker_size` bits in
    /// row-major order with **black = 1**.
    pub codes: Vec<u64>,
}

impl Dictionary {
    pub fn new(
        name: impl Into<String>,
        marker_size: usize,
        max_correction_bits: u8,
        codes: Vec<u64>,
    ) -> Result<Self, DictionaryError> {
        let dict = Self {
            name: name.into(),
            marker_size,
            max_correction_bits,
            codes,
        };
        dict.validate()?;
        Ok(dict)
    }

    pub fn from_json_str(s: &str) -> Result<Self, DictionaryError> {
        let dict: Self = serde_json::from_str(s)?;
        dict.validate()?;
        Ok(dict)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// A built-in name such as `DICT_4X4_50`, or a path to a dictionary JSON file.
    pub fn from_name_or_path(spec: &str) -> Result<Self, DictionaryError> {
        let path = Path::new(spec);
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json || path.is_file() {
            return Self::load_json(path);
        }
        builtin_dictionary(spec).ok_or_else(|| DictionaryError::UnknownBuiltin {
            name: spec.to_string(),
            available: builtin_names().collect::<Vec<_>>().join(", "),
        })
    }

    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    fn invalid(&self, reason: impl Into<String>) -> DictionaryError {
        DictionaryError::Invalid {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), DictionaryError> {
        if self.marker_size == 0 {
            return Err(self.invalid("marker_size must be positive"));
        }
        let bits = self.bit_count();
        if bits > 64 {
            return Err(self.invalid(format!(
                "marker_size {} implies {bits} bits > 64",
                self.marker_size
            )));
        }
        if self.codes.is_empty() {
            return Err(self.invalid("no codes"));
        }
        if bits < 64 {
            let mask = (1u64 << bits) - 1;
            if let Some(id) = self.codes.iter().position(|&c| c & !mask != 0) {
                return Err(self.invalid(format!("code of id {id} has bits beyond {bits}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_validates_json() {
        let dict = Dictionary::from_json_str(
            r#"{ "name": "TINY", "marker_size": 4, "max_correction_bits": 1,
                "codes": [19, 4712] }"#,
        )
        .expect("valid");
        assert_eq!(dict.bit_count(), 16);
        assert_eq!(dict.len(), 2);

        let too_wide = r#"{ "name": "BAD", "marker_size": 4, "codes": [65536] }"#;
        assert!(matches!(
            Dictionary::from_json_str(too_wide),
            Err(DictionaryError::Invalid { .. })
        ));
        let empty = r#"{ "name": "EMPTY", "marker_size": 4, "codes": [] }"#;
        assert!(Dictionary::from_json_str(empty).is_err());
        assert!(matches!(
            Dictionary::from_json_str("{"),
            Err(DictionaryError::Json(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dict.json");
        std::fs::write(
            &path,
            r#"{ "name": "FILE", "marker_size": 3, "codes": [1, 2, 3] }"#,
        )
        .expect("write");
        let dict = Dictionary::load_json(&path).expect("load");
        assert_eq!(dict.name, "FILE");
        assert_eq!(dict.max_correction_bits, 0);
        assert!(matches!(
            Dictionary::load_json(dir.path().join("missing.json")),
            Err(DictionaryError::Io(_))
        ));
    }

    #[test]
    fn names_and_paths_both_resolve() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{ "name": "CUSTOM", "marker_size": 3, "codes": [5] }"#)
            .expect("write");

        let from_file = Dictionary::from_name_or_path(path.to_str().expect("utf8")).expect("file");
        assert_eq!(from_file.name, "CUSTOM");
        let builtin = Dictionary::from_name_or_path("DICT_4X4_50").expect("builtin");
        assert_eq!(builtin.len(), 50);

        match Dictionary::from_name_or_path("DICT_7X7_3") {
            Err(DictionaryError::UnknownBuiltin { name, available }) => {
                assert_eq!(name, "DICT_7X7_3");
                assert!(available.contains("DICT_4X4_50"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            Dictionary::from_name_or_path("missing/dict.json"),
            Err(DictionaryError::Io(_))
        ));
    }
}
