/// Declares a struct and implements [`Member`](crate::reflect::Member) for it.
///
/// Fields are described in declaration order. The struct must also implement
/// `Serialize`, `Deserialize` and `Default`, usually by deriving them:
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// tracked::reflect! {
///     #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
///     pub struct Point {
///         pub x: i32,
///         pub y: i32,
///     }
/// }
///
/// let mut tracked = tracked::core::tracker::Tracked::<Point>::new(Point::default());
/// tracked.create_action().field("x").unwrap().set(3).unwrap();
/// assert_eq!(tracked.read().x, 3);
/// ```
#[macro_export]
macro_rules! reflect {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::reflect::Member for $name {
            fn kind() -> $crate::reflect::FieldKind {
                $crate::reflect::FieldKind::Aggregate(::std::sync::Arc::new(
                    $crate::reflect::TypeDescriptor::new(
                        stringify!($name),
                        vec![
                            $(
                                $crate::reflect::FieldDescriptor::new(
                                    stringify!($field),
                                    <$ty as $crate::reflect::Member>::kind(),
                                ),
                            )*
                        ],
                    ),
                ))
            }

            fn to_value(&self) -> ::std::result::Result<$crate::reflect::Value, $crate::reflect::ReflectError> {
                $crate::reflect::serialize_value(self)
            }

            fn assign_value(
                &mut self,
                value: $crate::reflect::Value,
            ) -> ::std::result::Result<(), $crate::reflect::ReflectError> {
                *self = $crate::reflect::deserialize_value(value)?;
                Ok(())
            }

            fn compare(&self, other: &dyn $crate::reflect::Member) -> Option<::std::cmp::Ordering> {
                let other = other.as_any().downcast_ref::<Self>()?;
                $(
                    match $crate::reflect::Member::compare(&self.$field, &other.$field) {
                        Some(::std::cmp::Ordering::Equal) => {}
                        ordering => return ordering,
                    }
                )*
                let _ = other;
                Some(::std::cmp::Ordering::Equal)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn child(&self, step: $crate::types::PathStep) -> Option<&dyn $crate::reflect::Member> {
                let $crate::types::PathStep::Field(index) = step else {
                    return None;
                };
                let mut position = 0usize;
                $(
                    if index == position {
                        return Some(&self.$field as &dyn $crate::reflect::Member);
                    }
                    position += 1;
                )*
                None
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn child_mut(
                &mut self,
                step: $crate::types::PathStep,
            ) -> Option<&mut dyn $crate::reflect::Member> {
                let $crate::types::PathStep::Field(index) = step else {
                    return None;
                };
                let mut position = 0usize;
                $(
                    if index == position {
                        return Some(&mut self.$field as &mut dyn $crate::reflect::Member);
                    }
                    position += 1;
                )*
                None
            }
        }
    };
}
