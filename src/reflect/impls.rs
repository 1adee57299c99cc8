use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{
    FieldKind, Indexed, Member, ReflectError, Sequence, Value, check_permutation, deserialize_value,
    expect_array, serialize_value,
};
use crate::core::reorder;
use crate::types::PathStep;

macro_rules! scalar_member {
    ($cmp:ident: $($ty:ty),* $(,)?) => {
        $(
            impl Member for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Scalar { type_name: stringify!($ty) }
                }

                fn to_value(&self) -> Result<Value, ReflectError> {
                    serialize_value(self)
                }

                fn assign_value(&mut self, value: Value) -> Result<(), ReflectError> {
                    *self = deserialize_value(value)?;
                    Ok(())
                }

                fn compare(&self, other: &dyn Member) -> Option<Ordering> {
                    let other = other.as_any().downcast_ref::<Self>()?;
                    Some(self.$cmp(other))
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        )*
    };
}

scalar_member!(cmp: bool, char, String, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
// NaN sorts after every other value instead of being incomparable.
scalar_member!(total_cmp: f32, f64);

fn compare_elements<T: Member>(left: &[T], right: &[T]) -> Option<Ordering> {
    for (a, b) in left.iter().zip(right) {
        match a.compare(b) {
            Some(Ordering::Equal) => {}
            ordering => return ordering,
        }
    }
    Some(left.len().cmp(&right.len()))
}

impl<T: Member, const N: usize> Member for [T; N] {
    fn kind() -> FieldKind {
        FieldKind::FixedArray {
            len: N,
            element: Arc::new(T::kind()),
        }
    }

    fn to_value(&self) -> Result<Value, ReflectError> {
        self.iter()
            .map(Member::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn assign_value(&mut self, value: Value) -> Result<(), ReflectError> {
        let items = expect_array(value)?;
        if items.len() != N {
            return Err(ReflectError::Shape {
                expected: format!("array of {N}"),
                found: format!("array of {}", items.len()),
            });
        }
        for (slot, item) in self.iter_mut().zip(items) {
            slot.assign_value(item)?;
        }
        Ok(())
    }

    fn compare(&self, other: &dyn Member) -> Option<Ordering> {
        let other = other.as_any().downcast_ref::<Self>()?;
        compare_elements(self, other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn child(&self, step: PathStep) -> Option<&dyn Member> {
        match step {
            PathStep::Index(index) => self.get(index).map(|e| e as &dyn Member),
            PathStep::Field(_) => None,
        }
    }

    fn child_mut(&mut self, step: PathStep) -> Option<&mut dyn Member> {
        match step {
            PathStep::Index(index) => self.get_mut(index).map(|e| e as &mut dyn Member),
            PathStep::Field(_) => None,
        }
    }

    fn as_indexed(&self) -> Option<&dyn Indexed> {
        Some(self)
    }

    fn as_indexed_mut(&mut self) -> Option<&mut dyn Indexed> {
        Some(self)
    }
}

impl<T: Member, const N: usize> Indexed for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn element(&self, index: usize) -> Option<&dyn Member> {
        self.get(index).map(|e| e as &dyn Member)
    }

    fn permute(&mut self, order: &[usize]) -> Result<(), ReflectError> {
        check_permutation(order, N)?;
        reorder::apply_in_place(self.as_mut_slice(), order);
        Ok(())
    }
}

impl<T: Member + Default> Member for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::Sequence {
            element: Arc::new(T::kind()),
        }
    }

    fn to_value(&self) -> Result<Value, ReflectError> {
        self.iter()
            .map(Member::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn assign_value(&mut self, value: Value) -> Result<(), ReflectError> {
        let items = expect_array(value)?;
        *self = build_elements(items)?;
        Ok(())
    }

    fn compare(&self, other: &dyn Member) -> Option<Ordering> {
        let other = other.as_any().downcast_ref::<Self>()?;
        compare_elements(self, other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn child(&self, step: PathStep) -> Option<&dyn Member> {
        match step {
            PathStep::Index(index) => self.get(index).map(|e| e as &dyn Member),
            PathStep::Field(_) => None,
        }
    }

    fn child_mut(&mut self, step: PathStep) -> Option<&mut dyn Member> {
        match step {
            PathStep::Index(index) => self.get_mut(index).map(|e| e as &mut dyn Member),
            PathStep::Field(_) => None,
        }
    }

    fn as_indexed(&self) -> Option<&dyn Indexed> {
        Some(self)
    }

    fn as_indexed_mut(&mut self) -> Option<&mut dyn Indexed> {
        Some(self)
    }

    fn as_sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }

    fn as_sequence_mut(&mut self) -> Option<&mut dyn Sequence> {
        Some(self)
    }
}

fn build_elements<T: Member + Default>(items: Vec<Value>) -> Result<Vec<T>, ReflectError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let mut element = T::default();
        element.assign_value(item)?;
        out.push(element);
    }
    Ok(out)
}

impl<T: Member + Default> Indexed for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn element(&self, index: usize) -> Option<&dyn Member> {
        self.get(index).map(|e| e as &dyn Member)
    }

    fn permute(&mut self, order: &[usize]) -> Result<(), ReflectError> {
        check_permutation(order, Vec::len(self))?;
        reorder::apply_in_place(self.as_mut_slice(), order);
        Ok(())
    }
}

impl<T: Member + Default> Sequence for Vec<T> {
    fn insert_values(&mut self, at: usize, values: Vec<Value>) -> Result<(), ReflectError> {
        let len = Vec::len(self);
        if at > len {
            return Err(ReflectError::IndexOutOfRange { index: at, len });
        }
        let elements = build_elements::<T>(values)?;
        self.splice(at..at, elements);
        Ok(())
    }

    fn remove_at(&mut self, index: usize) -> Result<(), ReflectError> {
        let len = Vec::len(self);
        if index >= len {
            return Err(ReflectError::IndexOutOfRange { index, len });
        }
        self.remove(index);
        Ok(())
    }

    fn remove_range(&mut self, at: usize, count: usize) -> Result<(), ReflectError> {
        let len = Vec::len(self);
        let end = at.saturating_add(count);
        if end > len {
            return Err(ReflectError::IndexOutOfRange { index: end, len });
        }
        self.drain(at..end);
        Ok(())
    }

    fn default_element(&self) -> Result<Value, ReflectError> {
        T::default().to_value()
    }

    fn capacity(&self) -> usize {
        Vec::capacity(self)
    }

    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }

    fn shrink_to_fit(&mut self) {
        Vec::shrink_to_fit(self);
    }
}
