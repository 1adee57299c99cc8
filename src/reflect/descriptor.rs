use std::sync::Arc;

use hashbrown::HashMap;

use super::ReflectError;
use crate::types::{Path, PathStep};

/// Semantic kind of a reflected field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A leaf value.
    Scalar {
        /// Rust type name, for diagnostics.
        type_name: &'static str,
    },
    /// A fixed-size array; nested arrays describe multi-dimensional ones.
    FixedArray {
        /// Element count.
        len: usize,
        /// Element descriptor.
        element: Arc<FieldKind>,
    },
    /// A dynamically sized sequence.
    Sequence {
        /// Element descriptor.
        element: Arc<FieldKind>,
    },
    /// A nested aggregate with its own field table.
    Aggregate(Arc<TypeDescriptor>),
}

/// Ordered field table of one aggregate type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Type name.
    pub name: &'static str,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

/// One named field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: &'static str,
    /// Field kind.
    pub kind: Arc<FieldKind>,
}

impl FieldDescriptor {
    /// Describes field `name` of kind `kind`.
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind: Arc::new(kind),
        }
    }
}

impl TypeDescriptor {
    /// Builds the table for type `name`.
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name, index))
            .collect();
        Self {
            name,
            fields,
            by_name,
        }
    }

    /// Index of field `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

impl FieldKind {
    /// True for fixed arrays and sequences.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::FixedArray { .. } | Self::Sequence { .. })
    }

    /// True for dynamic sequences.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence { .. })
    }

    /// Descriptor of the child reached by `step`.
    pub fn child(&self, step: PathStep) -> Option<Arc<FieldKind>> {
        match (self, step) {
            (Self::Aggregate(ty), PathStep::Field(index)) => {
                ty.fields.get(index).map(|field| Arc::clone(&field.kind))
            }
            (Self::FixedArray { len, element }, PathStep::Index(index)) if index < *len => {
                Some(Arc::clone(element))
            }
            (Self::Sequence { element }, PathStep::Index(_)) => Some(Arc::clone(element)),
            _ => None,
        }
    }

    /// Resolves a textual path such as `bar_vec[0].ints` or `md_int_ray[1][2]`.
    pub fn resolve(self: &Arc<Self>, expr: &str) -> Result<(Path, Arc<FieldKind>), ReflectError> {
        let invalid = |reason: String| ReflectError::InvalidPath {
            expr: expr.to_string(),
            reason,
        };

        let mut path = Path::root();
        let mut kind = Arc::clone(self);
        let mut rest = expr.trim();

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after
                    .find(']')
                    .ok_or_else(|| invalid("unclosed `[`".to_string()))?;
                let index: usize = after[..close]
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("`{}` is not an index", &after[..close])))?;
                let step = PathStep::Index(index);
                kind = kind
                    .child(step)
                    .ok_or_else(|| invalid(format!("cannot index into {path} with [{index}]")))?;
                path.push(step);
                rest = &after[close + 1..];
                continue;
            }

            let name_start = rest.strip_prefix('.').unwrap_or(rest);
            let end = name_start
                .find(['.', '['])
                .unwrap_or(name_start.len());
            let name = &name_start[..end];
            if name.is_empty() {
                return Err(invalid("empty field name".to_string()));
            }
            let Self::Aggregate(ty) = kind.as_ref() else {
                return Err(invalid(format!("`{name}` is not a field of a scalar or array")));
            };
            let index = ty
                .index_of(name)
                .ok_or_else(|| invalid(format!("`{}` has no field `{name}`", ty.name)))?;
            let next = Arc::clone(&ty.fields[index].kind);
            path.push(PathStep::Field(index));
            kind = next;
            rest = &name_start[end..];
        }

        Ok((path, kind))
    }

    /// Renders `path` with field names, e.g. `bar_vec[0].ints`.
    pub fn describe(&self, path: &Path) -> String {
        let mut out = String::new();
        let mut kind: Option<Arc<FieldKind>> = None;
        for step in path.steps() {
            let current = kind.as_deref().unwrap_or(self);
            match (current, step) {
                (Self::Aggregate(ty), PathStep::Field(index)) => {
                    let name = ty.fields.get(*index).map(|f| f.name).unwrap_or("?");
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                (_, PathStep::Index(index)) => out.push_str(&format!("[{index}]")),
                (_, PathStep::Field(index)) => out.push_str(&format!(".{index}")),
            }
            kind = current.child(*step);
            if kind.is_none() {
                break;
            }
        }
        if out.is_empty() {
            out.push_str("<root>");
        }
        out
    }
}
