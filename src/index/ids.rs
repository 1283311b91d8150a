use std::{borrow::Borrow, cmp::Ordering, fmt, hash::{Hash, Hasher}, str::FromStr};

use anyhow::{anyhow, Result};
use serde_json::Value;

/// A plot identifier.
///
/// Plot identifiers arrive as floats (or numeric strings). They are parsed
/// once at the input boundary and kept as canonical text, the shortest
/// decimal that round-trips the float (`42.0`, `1176871.0`), so equality,
/// hashing and file names never depend on float comparison.
#[derive(Debug, Clone)]
pub struct PlotId {
    value: f64,
    text: String,
}

impl PlotId {
    /// Build from a float. Non-finite values are rejected; `-0.0` folds into `0.0`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() { return None }
        let value = if value == 0.0 { 0.0 } else { value };
        Some(Self { value, text: format!("{value:?}") })
    }

    /// Coerce a JSON property value: numbers, or strings that parse as numbers.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().and_then(Self::from_f64),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(Self::from_f64),
            _ => None,
        }
    }

    #[inline] pub fn as_f64(&self) -> f64 { self.value }

    #[inline] pub fn as_str(&self) -> &str { &self.text }
}

impl FromStr for PlotId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: f64 = s.trim().parse()
            .map_err(|_| anyhow!("Invalid plot identifier: {:?}", s))?;
        Self::from_f64(value).ok_or_else(|| anyhow!("Plot identifier must be finite: {:?}", s))
    }
}

impl PartialEq for PlotId {
    fn eq(&self, other: &Self) -> bool { self.text == other.text }
}

impl Eq for PlotId {}

impl Hash for PlotId {
    fn hash<H: Hasher>(&self, state: &mut H) { self.text.hash(state) }
}

impl Ord for PlotId {
    fn cmp(&self, other: &Self) -> Ordering { self.value.total_cmp(&other.value) }
}

impl PartialOrd for PlotId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.text) }
}

/// Canonical polygon identifier: trimmed, lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolyKey(String);

impl PolyKey {
    pub fn new(raw: &str) -> Self { Self(raw.trim().to_lowercase()) }

    /// Coerce a JSON property value. Numbers and booleans use their JSON text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::new(s)),
            Value::Number(n) => Some(Self::new(&n.to_string())),
            Value::Bool(b) => Some(Self::new(&b.to_string())),
            _ => None,
        }
    }

    /// Wrap text that is already canonical (read back from the index store).
    pub(crate) fn from_canonical(text: String) -> Self { Self(text) }

    #[inline] pub fn as_str(&self) -> &str { &self.0 }
}

impl Borrow<str> for PolyKey {
    fn borrow(&self) -> &str { &self.0 }
}

impl fmt::Display for PolyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
