use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{
    reflect::{FieldKind, Member, deserialize_value},
    types::Path,
};

use super::{
    edit::Edit,
    tracker::{TrackError, Tracked},
};

/// Editor scoped to one field or element of a [`Tracked`] aggregate.
///
/// Actions created here record against the same history as the root editor;
/// only their base path differs.
pub struct TrackedElement<'a, T, U = ()> {
    tracked: &'a mut Tracked<T, U>,
    path: Path,
    kind: Arc<FieldKind>,
}

impl<'a, T: Member, U: Clone> TrackedElement<'a, T, U> {
    pub(crate) fn new(tracked: &'a mut Tracked<T, U>, path: Path, kind: Arc<FieldKind>) -> Self {
        Self { tracked, path, kind }
    }

    /// Path of the element.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptor of the element's type.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The element itself.
    pub fn read(&self) -> Result<&dyn Member, TrackError> {
        self.tracked
            .member(&self.path)
            .ok_or_else(|| TrackError::UnknownPath(self.tracked.describe(&self.path)))
    }

    /// The element converted to `V`.
    pub fn read_as<V: DeserializeOwned>(&self) -> Result<V, TrackError> {
        Ok(deserialize_value(self.read()?.to_value()?)?)
    }

    /// Selected indices when the element is indexed.
    pub fn selection(&self) -> &[usize] {
        self.tracked.selection_at(&self.path)
    }

    /// Starts an action rooted at this element.
    pub fn edit(&mut self) -> Edit<'_, T, U> {
        self.rooted(None)
    }

    /// Starts an annotated action rooted at this element.
    pub fn edit_with(&mut self, user_data: U) -> Edit<'_, T, U> {
        self.rooted(Some(user_data))
    }

    fn rooted(&mut self, user_data: Option<U>) -> Edit<'_, T, U> {
        self.tracked.arm_action(user_data);
        Edit::new(&mut *self.tracked, self.path.clone(), Arc::clone(&self.kind))
    }
}
