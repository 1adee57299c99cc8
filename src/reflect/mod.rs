//! Reflection collaborator: field descriptors and dynamic field access.
//!
//! The editor never knows the concrete layout of a tracked aggregate. It walks
//! [`Member`] trait objects by [`PathStep`], converts values through
//! [`serde_json::Value`], and learns field names and kinds from the
//! [`FieldKind`] tree each type describes.
//!
//! Aggregates opt in with the [`reflect!`](crate::reflect!) macro; scalars,
//! `String`, fixed arrays and `Vec` are covered here.

mod descriptor;
mod impls;
mod macros;

use std::any::Any;
use std::cmp::Ordering;

use serde::{Serialize, de::DeserializeOwned};
pub use serde_json::Value;

pub use descriptor::{FieldDescriptor, FieldKind, TypeDescriptor};

use crate::types::PathStep;

/// Errors raised while converting or addressing reflected values.
#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    /// The value could not be converted to or from its JSON form.
    #[error("value conversion failed: {0}")]
    Value(#[from] serde_json::Error),
    /// The value had the wrong overall shape for the field.
    #[error("expected {expected}, found {found}")]
    Shape {
        /// Shape the field needs.
        expected: String,
        /// Shape that was supplied.
        found: String,
    },
    /// An element index was past the end of an indexed field.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current length.
        len: usize,
    },
    /// A textual path could not be resolved against the descriptors.
    #[error("invalid path `{expr}`: {reason}")]
    InvalidPath {
        /// The path text.
        expr: String,
        /// What went wrong.
        reason: String,
    },
}

/// Dynamic view of one field of a tracked aggregate.
pub trait Member: Any {
    /// Descriptor of this type.
    fn kind() -> FieldKind
    where
        Self: Sized;

    /// Current value in its JSON form.
    fn to_value(&self) -> Result<Value, ReflectError>;

    /// Replaces the current value.
    fn assign_value(&mut self, value: Value) -> Result<(), ReflectError>;

    /// Orders two members of the same type; `None` when incomparable.
    fn compare(&self, other: &dyn Member) -> Option<Ordering>;

    /// Down-casting hook.
    fn as_any(&self) -> &dyn Any;

    /// Child field or element.
    fn child(&self, _step: PathStep) -> Option<&dyn Member> {
        None
    }

    /// Mutable child field or element.
    fn child_mut(&mut self, _step: PathStep) -> Option<&mut dyn Member> {
        None
    }

    /// Indexed view for fixed arrays and sequences.
    fn as_indexed(&self) -> Option<&dyn Indexed> {
        None
    }

    /// Mutable indexed view for fixed arrays and sequences.
    fn as_indexed_mut(&mut self) -> Option<&mut dyn Indexed> {
        None
    }

    /// Sequence view for dynamically sized collections.
    fn as_sequence(&self) -> Option<&dyn Sequence> {
        None
    }

    /// Mutable sequence view for dynamically sized collections.
    fn as_sequence_mut(&mut self) -> Option<&mut dyn Sequence> {
        None
    }
}

/// Fields addressable by element index.
pub trait Indexed {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Returns true when there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`.
    fn element(&self, index: usize) -> Option<&dyn Member>;

    /// Rearranges elements so that position `i` holds the element previously
    /// at `order[i]`. `order` must be a permutation of `0..len`.
    fn permute(&mut self, order: &[usize]) -> Result<(), ReflectError>;

    /// Orders the elements at `a` and `b`.
    fn compare_elements(&self, a: usize, b: usize) -> Option<Ordering> {
        let left = self.element(a)?;
        let right = self.element(b)?;
        left.compare(right)
    }
}

/// Dynamically sized collections.
pub trait Sequence: Indexed {
    /// Inserts `values` so the first lands at `at`.
    fn insert_values(&mut self, at: usize, values: Vec<Value>) -> Result<(), ReflectError>;

    /// Removes the element at `index`.
    fn remove_at(&mut self, index: usize) -> Result<(), ReflectError>;

    /// Removes `count` elements starting at `at`.
    fn remove_range(&mut self, at: usize, count: usize) -> Result<(), ReflectError>;

    /// JSON form of a default-constructed element.
    fn default_element(&self) -> Result<Value, ReflectError>;

    /// Current allocated capacity.
    fn capacity(&self) -> usize;

    /// Reserves room for at least `additional` more elements.
    fn reserve(&mut self, additional: usize);

    /// Releases unused capacity.
    fn shrink_to_fit(&mut self);
}

/// Converts any serializable value to its JSON form.
pub fn serialize_value<S: Serialize + ?Sized>(value: &S) -> Result<Value, ReflectError> {
    Ok(serde_json::to_value(value)?)
}

/// Builds a value from its JSON form.
pub fn deserialize_value<D: DeserializeOwned>(value: Value) -> Result<D, ReflectError> {
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn expect_array(value: Value) -> Result<Vec<Value>, ReflectError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ReflectError::Shape {
            expected: "array".to_string(),
            found: shape_name(&other).to_string(),
        }),
    }
}

/// Rejects anything but a permutation of `0..len`.
pub(crate) fn check_permutation(order: &[usize], len: usize) -> Result<(), ReflectError> {
    if !crate::core::reorder::is_permutation(order, len) {
        return Err(ReflectError::Shape {
            expected: format!("permutation of {len} elements"),
            found: format!("{order:?}"),
        });
    }
    Ok(())
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolves `path` below `root`.
pub fn resolve<'a>(root: &'a dyn Member, steps: &[PathStep]) -> Option<&'a dyn Member> {
    let mut node = root;
    for step in steps {
        node = node.child(*step)?;
    }
    Some(node)
}

/// Resolves `path` below `root` for mutation.
pub fn resolve_mut<'a>(root: &'a mut dyn Member, steps: &[PathStep]) -> Option<&'a mut dyn Member> {
    let mut node = root;
    for step in steps {
        node = node.child_mut(*step)?;
    }
    Some(node)
}
