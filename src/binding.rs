//! Parameter values for Bind messages.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};

/// Largest parameter index representable in a Bind message's Int16 count.
pub const MAX_PARAMETER_INDEX: usize = i16::MAX as usize - 1;

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    format: FormatCode,
    type_oid: Oid,
    value: Option<Vec<u8>>,
}

impl Parameter {
    pub fn new(format: FormatCode, type_oid: Oid, value: Option<Vec<u8>>) -> Self {
        Self {
            format,
            type_oid,
            value,
        }
    }

    /// Text-format parameter.
    pub fn text(type_oid: Oid, value: impl Into<String>) -> Self {
        Self::new(FormatCode::Text, type_oid, Some(value.into().into_bytes()))
    }

    /// Binary-format parameter.
    pub fn binary(type_oid: Oid, value: impl Into<Vec<u8>>) -> Self {
        Self::new(FormatCode::Binary, type_oid, Some(value.into()))
    }

    /// SQL NULL.
    pub fn null(format: FormatCode, type_oid: Oid) -> Self {
        Self::new(format, type_oid, None)
    }

    pub fn format(&self) -> FormatCode {
        self.format
    }

    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// Raw value, `None` for NULL.
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

impl Default for Parameter {
    /// Untyped text NULL.
    fn default() -> Self {
        Self::null(FormatCode::Text, 0)
    }
}

/// Sparse, index-ordered set of parameters.
///
/// Unbound indices below the highest bound one resolve to the default parameter.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    parameters: BTreeMap<usize, Parameter>,
    default: Parameter,
}

impl Binding {
    /// Empty binding whose gaps are untyped text NULLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty binding with a custom gap filler.
    pub fn with_default(default: Parameter) -> Self {
        Self {
            parameters: BTreeMap::new(),
            default,
        }
    }

    /// Bind `parameter` at `index`, builder style.
    pub fn add(mut self, index: usize, parameter: Parameter) -> Result<Self> {
        self.insert(index, parameter)?;
        Ok(self)
    }

    /// Bind `parameter` at `index`, replacing any previous value.
    pub fn insert(&mut self, index: usize, parameter: Parameter) -> Result<()> {
        if index > MAX_PARAMETER_INDEX {
            return Err(Error::InvalidUsage(format!(
                "parameter index {} exceeds protocol limit {}",
                index, MAX_PARAMETER_INDEX
            )));
        }
        self.parameters.insert(index, parameter);
        Ok(())
    }

    /// Highest bound index plus one.
    pub fn len(&self) -> usize {
        self.parameters
            .last_key_value()
            .map_or(0, |(index, _)| index + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameter at `index`, falling back to the default inside the bound range.
    pub fn get(&self, index: usize) -> Option<&Parameter> {
        if index >= self.len() {
            return None;
        }
        Some(self.parameters.get(&index).unwrap_or(&self.default))
    }

    /// Resolved parameters in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        (0..self.len()).map(|i| self.parameters.get(&i).unwrap_or(&self.default))
    }

    pub fn parameter_formats(&self) -> Vec<FormatCode> {
        self.iter().map(Parameter::format).collect()
    }

    pub fn parameter_types(&self) -> Vec<Oid> {
        self.iter().map(Parameter::type_oid).collect()
    }

    pub fn parameter_values(&self) -> Vec<Option<&[u8]>> {
        self.iter().map(Parameter::value).collect()
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for Binding {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_is_filled_from_default() {
        let binding = Binding::new()
            .add(0, Parameter::text(23, "1"))
            .and_then(|b| b.add(2, Parameter::text(25, "x")))
            .unwrap();

        assert_eq!(binding.len(), 3);
        assert_eq!(binding.parameter_types(), vec![23, 0, 25]);
        assert_eq!(
            binding.parameter_values(),
            vec![Some(&b"1"[..]), None, Some(&b"x"[..])]
        );
        assert_eq!(
            binding.parameter_formats(),
            vec![FormatCode::Text, FormatCode::Text, FormatCode::Text]
        );
    }

    #[test]
    fn custom_default() {
        let mut binding = Binding::with_default(Parameter::null(FormatCode::Binary, 20));
        binding.insert(1, Parameter::binary(20, 7_i64.to_be_bytes())).unwrap();
        assert_eq!(binding.parameter_formats(), vec![FormatCode::Binary; 2]);
        assert_eq!(binding.get(0), Some(&Parameter::null(FormatCode::Binary, 20)));
        assert_eq!(binding.get(2), None);
    }

    #[test]
    fn empty_binding() {
        let binding = Binding::new();
        assert_eq!(binding.len(), 0);
        assert!(binding.is_empty());
        assert!(binding.parameter_values().is_empty());
    }

    #[test]
    fn overwrite_same_index() {
        let binding = Binding::new()
            .add(0, Parameter::text(0, "a"))
            .and_then(|b| b.add(0, Parameter::text(0, "b")))
            .unwrap();
        assert_eq!(binding.parameter_values(), vec![Some(&b"b"[..])]);
    }

    #[test]
    fn equality_uses_resolved_view() {
        let explicit = Binding::new()
            .add(0, Parameter::default())
            .and_then(|b| b.add(1, Parameter::text(0, "v")))
            .unwrap();
        let sparse = Binding::new().add(1, Parameter::text(0, "v")).unwrap();
        assert_eq!(explicit, sparse);
    }

    #[test]
    fn index_beyond_int16_is_rejected() {
        let err = Binding::new()
            .add(MAX_PARAMETER_INDEX + 1, Parameter::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }
}
