use crate::core::utils::version::VersionCounter;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Bool,
    Int,
    Double,
    String,
}

impl fmt::Display for KeywordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeywordKind::Bool => "bool",
            KeywordKind::Int => "int",
            KeywordKind::Double => "double",
            KeywordKind::String => "string",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum KeywordError {
    #[error("Unknown keyword '{name}'")]
    Unknown { name: String },
    #[error("Keyword '{name}' expects a {expected} value but was given a {found}")]
    TypeMismatch {
        name: String,
        expected: KeywordKind,
        found: KeywordKind,
    },
    #[error("Cannot parse '{value}' as a {kind} for keyword '{name}'")]
    Parse {
        name: String,
        value: String,
        kind: KeywordKind,
    },
}

/// Value of a module keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeywordValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl KeywordValue {
    pub fn kind(&self) -> KeywordKind {
        match self {
            KeywordValue::Bool(_) => KeywordKind::Bool,
            KeywordValue::Int(_) => KeywordKind::Int,
            KeywordValue::Double(_) => KeywordKind::Double,
            KeywordValue::String(_) => KeywordKind::String,
        }
    }

    /// Converts `self` to `kind`, widening integers to doubles where needed.
    fn coerce(self, kind: KeywordKind) -> Option<KeywordValue> {
        match (self, kind) {
            (KeywordValue::Int(i), KeywordKind::Double) => Some(KeywordValue::Double(i as f64)),
            (value, kind) if value.kind() == kind => Some(value),
            _ => None,
        }
    }

    /// Parses text supplied on a command line or in a run file.
    pub fn parse(kind: KeywordKind, text: &str) -> Option<KeywordValue> {
        let text = text.trim();
        match kind {
            KeywordKind::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Some(KeywordValue::Bool(true)),
                "false" | "off" | "no" | "0" => Some(KeywordValue::Bool(false)),
                _ => None,
            },
            KeywordKind::Int => text.parse().ok().map(KeywordValue::Int),
            KeywordKind::Double => text.parse().ok().map(KeywordValue::Double),
            KeywordKind::String => Some(KeywordValue::String(text.to_string())),
        }
    }
}

impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordValue::Bool(v) => write!(f, "{}", v),
            KeywordValue::Int(v) => write!(f, "{}", v),
            KeywordValue::Double(v) => write!(f, "{}", v),
            KeywordValue::String(v) => write!(f, "'{}'", v),
        }
    }
}

/// Side effect a keyword change has on its owning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordSignal {
    /// External data the module read must be loaded again.
    ReloadExternalData,
    /// Results the module stored are invalid and must be removed.
    ClearModuleData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    name: &'static str,
    description: &'static str,
    default: KeywordValue,
    value: KeywordValue,
    signals: Vec<KeywordSignal>,
}

impl Keyword {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn default_value(&self) -> &KeywordValue {
        &self.default
    }

    pub fn value(&self) -> &KeywordValue {
        &self.value
    }

    pub fn kind(&self) -> KeywordKind {
        self.default.kind()
    }

    pub fn signals(&self) -> &[KeywordSignal] {
        &self.signals
    }
}

/// Ordered, typed options of a module.
///
/// The list carries a version counter bumped on every change of value, which modules use
/// to rebuild state derived from their keywords.
#[derive(Debug, Clone, Default)]
pub struct KeywordList {
    keywords: Vec<Keyword>,
    version: VersionCounter,
}

impl KeywordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a keyword with its default value.
    pub fn define(
        &mut self,
        name: &'static str,
        description: &'static str,
        default: KeywordValue,
    ) -> &mut Self {
        self.define_with_signals(name, description, default, &[])
    }

    /// Declares a keyword whose changes raise `signals`.
    pub fn define_with_signals(
        &mut self,
        name: &'static str,
        description: &'static str,
        default: KeywordValue,
        signals: &[KeywordSignal],
    ) -> &mut Self {
        self.keywords.retain(|k| k.name != name);
        self.keywords.push(Keyword {
            name,
            description,
            value: default.clone(),
            default,
            signals: signals.to_vec(),
        });
        self
    }

    fn find(&self, name: &str) -> Result<&Keyword, KeywordError> {
        self.keywords
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| KeywordError::Unknown {
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Result<&KeywordValue, KeywordError> {
        self.find(name).map(|k| &k.value)
    }

    fn mismatch(keyword: &Keyword, expected: KeywordKind) -> KeywordError {
        KeywordError::TypeMismatch {
            name: keyword.name.to_string(),
            expected,
            found: keyword.kind(),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, KeywordError> {
        let keyword = self.find(name)?;
        match keyword.value {
            KeywordValue::Bool(v) => Ok(v),
            _ => Err(Self::mismatch(keyword, KeywordKind::Bool)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64, KeywordError> {
        let keyword = self.find(name)?;
        match keyword.value {
            KeywordValue::Int(v) => Ok(v),
            _ => Err(Self::mismatch(keyword, KeywordKind::Int)),
        }
    }

    pub fn get_double(&self, name: &str) -> Result<f64, KeywordError> {
        let keyword = self.find(name)?;
        match keyword.value {
            KeywordValue::Double(v) => Ok(v),
            _ => Err(Self::mismatch(keyword, KeywordKind::Double)),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<&str, KeywordError> {
        let keyword = self.find(name)?;
        match &keyword.value {
            KeywordValue::String(v) => Ok(v),
            _ => Err(Self::mismatch(keyword, KeywordKind::String)),
        }
    }

    /// Sets a keyword, returning the signals raised by the change.
    ///
    /// Setting a keyword to its current value raises nothing and leaves the version alone.
    ///
    /// # Errors
    ///
    /// [`KeywordError::Unknown`] for an undeclared name, [`KeywordError::TypeMismatch`] if the
    /// value's kind differs from the declared one. Integers are accepted for doubles.
    pub fn set(
        &mut self,
        name: &str,
        value: KeywordValue,
    ) -> Result<Vec<KeywordSignal>, KeywordError> {
        let keyword = self
            .keywords
            .iter_mut()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| KeywordError::Unknown {
                name: name.to_string(),
            })?;

        let found = value.kind();
        let value = value
            .coerce(keyword.kind())
            .ok_or_else(|| KeywordError::TypeMismatch {
                name: keyword.name.to_string(),
                expected: keyword.kind(),
                found,
            })?;

        if keyword.value == value {
            return Ok(Vec::new());
        }
        keyword.value = value;
        let signals = keyword.signals.clone();
        self.version.increment();
        Ok(signals)
    }

    /// Parses `text` according to the keyword's kind and sets it.
    pub fn set_from_str(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<Vec<KeywordSignal>, KeywordError> {
        let keyword = self.find(name)?;
        let kind = keyword.kind();
        let value = KeywordValue::parse(kind, text).ok_or_else(|| KeywordError::Parse {
            name: keyword.name.to_string(),
            value: text.to_string(),
            kind,
        })?;
        self.set(name, value)
    }

    /// Restores every keyword to its default value.
    pub fn reset(&mut self) {
        for keyword in &mut self.keywords {
            keyword.value = keyword.default.clone();
        }
        self.version.increment();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.current()
    }
}
