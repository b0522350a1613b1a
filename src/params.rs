use crate::dialect::SqlGenerator;
use crate::value::Value;

/// Ordered accumulator for bound arguments.
///
/// Each compilation call needs its own `Params`; placeholders are numbered
/// from the accumulator's current length, so sharing one between concurrent
/// compilations interleaves the argument lists.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    values: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Add a value and return the placeholder for it.
    pub fn push(&mut self, value: impl Into<Value>, generator: &dyn SqlGenerator) -> String {
        self.values.push(value.into());
        generator.placeholder(self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Drop everything bound after `len`, undoing a partial compilation.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl From<Params> for Vec<Value> {
    fn from(params: Params) -> Self {
        params.values
    }
}
