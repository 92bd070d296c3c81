use std::fmt;

use super::Value;

/// One step of an [`AttributePath`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributePathStep {
    /// An attribute of an object or block.
    AttributeName(String),
    /// An element of a map.
    ElementKeyString(String),
    /// An element of a list or tuple.
    ElementKeyInt(i64),
    /// An element of a set, addressed by its content.
    ///
    /// Never transmitted: the wire form of a path ends before this step.
    ElementKeyValue(Value),
}

impl fmt::Display for AttributePathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributePathStep::AttributeName(name) => write!(f, "AttributeName({:?})", name),
            AttributePathStep::ElementKeyString(key) => write!(f, "ElementKeyString({:?})", key),
            AttributePathStep::ElementKeyInt(idx) => write!(f, "ElementKeyInt({})", idx),
            AttributePathStep::ElementKeyValue(v) => write!(f, "ElementKeyValue({})", v),
        }
    }
}

/// An address of a value inside a value tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributePath {
    steps: Vec<AttributePathStep>,
}

impl AttributePath {
    /// The empty path, addressing the root value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a path from a sequence of steps.
    pub fn from_steps(steps: impl IntoIterator<Item = AttributePathStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Shorthand for a single-step attribute path.
    pub fn root(name: impl Into<String>) -> Self {
        Self::new().with_attribute_name(name)
    }

    /// The steps of the path, root first.
    pub fn steps(&self) -> &[AttributePathStep] {
        &self.steps
    }

    /// Consume the path, returning its steps.
    pub fn into_steps(self) -> Vec<AttributePathStep> {
        self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the path addresses the root value.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a step.
    pub fn with_step(mut self, step: AttributePathStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append an attribute name step.
    pub fn with_attribute_name(self, name: impl Into<String>) -> Self {
        self.with_step(AttributePathStep::AttributeName(name.into()))
    }

    /// Append a map key step.
    pub fn with_element_key_string(self, key: impl Into<String>) -> Self {
        self.with_step(AttributePathStep::ElementKeyString(key.into()))
    }

    /// Append a list or tuple index step.
    pub fn with_element_key_int(self, index: i64) -> Self {
        self.with_step(AttributePathStep::ElementKeyInt(index))
    }

    /// Append a set element step.
    pub fn with_element_key_value(self, value: Value) -> Self {
        self.with_step(AttributePathStep::ElementKeyValue(value))
    }

    /// The path without its last step. The root's parent is the root.
    pub fn parent(&self) -> AttributePath {
        let mut steps = self.steps.clone();
        steps.pop();
        Self { steps }
    }

    /// The last step, if any.
    pub fn last_step(&self) -> Option<&AttributePathStep> {
        self.steps.last()
    }

    /// Whether `prefix` is a leading sequence of this path's steps.
    pub fn starts_with(&self, prefix: &AttributePath) -> bool {
        self.steps.starts_with(&prefix.steps)
    }

    /// The steps that can be transmitted, stopping at the first set element.
    pub fn transmittable_steps(&self) -> &[AttributePathStep] {
        let end = self
            .steps
            .iter()
            .position(|s| matches!(s, AttributePathStep::ElementKeyValue(_)))
            .unwrap_or(self.steps.len());
        &self.steps[..end]
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}
