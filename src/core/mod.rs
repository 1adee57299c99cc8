//! In-memory editor: event log, action history, selections and edit views.

/// Forward/backward replay of recorded events.
pub mod apply;
/// Edit views that record mutations.
pub mod edit;
/// Sub-element editors.
pub mod element;
/// Action list, cursor and redo elision.
pub mod history;
/// Encoded event storage.
pub mod log;
/// Index permutations for swaps, moves and sorts.
pub mod reorder;
/// Per-field selection state.
pub mod selection;
/// The editor.
pub mod tracker;
