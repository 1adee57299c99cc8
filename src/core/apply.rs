//! Forward and backward replay of recorded events.
//!
//! Recording and redo share the forward path, so an event that applies cleanly
//! once will replay the same way later.

use crate::{
    op::{CapacityChange, Event},
    reflect::{Indexed, Member, Sequence, check_permutation, resolve_mut},
    types::Path,
};

use super::{reorder, selection::SelectionOverlay, tracker::TrackError};

/// Replay direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Redo, or first application while recording.
    Forward,
    /// Undo.
    Backward,
}

fn target<'a>(root: &'a mut dyn Member, path: &Path) -> Result<&'a mut dyn Member, TrackError> {
    resolve_mut(root, path.steps()).ok_or_else(|| TrackError::UnknownPath(path.to_string()))
}

fn indexed<'a>(root: &'a mut dyn Member, path: &Path) -> Result<&'a mut dyn Indexed, TrackError> {
    target(root, path)?
        .as_indexed_mut()
        .ok_or_else(|| TrackError::NotIndexed(path.to_string()))
}

fn sequence<'a>(root: &'a mut dyn Member, path: &Path) -> Result<&'a mut dyn Sequence, TrackError> {
    target(root, path)?
        .as_sequence_mut()
        .ok_or_else(|| TrackError::NotSequence(path.to_string()))
}

/// Applies `event` to the aggregate rooted at `root` and to `selections`.
pub fn apply_event(
    root: &mut dyn Member,
    selections: &mut SelectionOverlay,
    event: &Event,
    direction: Direction,
) -> Result<(), TrackError> {
    use Direction::{Backward, Forward};

    match (event, direction) {
        (Event::Set { path, new, .. }, Forward) => target(root, path)?.assign_value(new.clone())?,
        (Event::Set { path, old, .. }, Backward) => target(root, path)?.assign_value(old.clone())?,

        (Event::Insert { path, at, values }, Forward) => {
            sequence(root, path)?.insert_values(*at, values.clone())?
        }
        (Event::Insert { path, at, values }, Backward) => {
            sequence(root, path)?.remove_range(*at, values.len())?
        }

        (Event::Remove { path, removed }, Forward) => {
            let sequence = sequence(root, path)?;
            for (index, _) in removed.iter().rev() {
                sequence.remove_at(*index)?;
            }
        }
        (Event::Remove { path, removed }, Backward) => {
            let sequence = sequence(root, path)?;
            for (index, value) in removed {
                sequence.insert_values(*index, vec![value.clone()])?;
            }
        }

        (Event::Reorder { path, order }, Forward) => indexed(root, path)?.permute(order)?,
        (Event::Reorder { path, order }, Backward) => {
            let indexed = indexed(root, path)?;
            check_permutation(order, indexed.len())?;
            indexed.permute(&reorder::inverse(order))?
        }

        (Event::Capacity { path, change }, Forward) => {
            let sequence = sequence(root, path)?;
            match change {
                CapacityChange::Reserve(additional) => sequence.reserve(*additional),
                CapacityChange::ShrinkToFit => sequence.shrink_to_fit(),
            }
        }
        (Event::Capacity { .. }, Backward) => {}

        (Event::Select { path, new, .. }, Forward) => selections.set(path, new.clone()),
        (Event::Select { path, old, .. }, Backward) => selections.set(path, old.clone()),
    }

    Ok(())
}
