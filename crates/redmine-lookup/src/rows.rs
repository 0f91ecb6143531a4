//! Per-issue UI state.
//!
//! State is keyed by [`IssueId`], not by list position, so it stays with its
//! issue when the rendered list is reordered or filtered. At most one edit
//! affordance is open across all rows; opening one closes the others.

use crate::error::ClassifiedError;
use crate::model::IssueId;
use std::collections::HashMap;
use thiserror::Error;

/// Tab shown for an issue row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    /// Summary fields
    #[default]
    Info,

    /// Journal notes
    Notes,

    /// Field-change history
    History,
}

/// Edit affordance that can be open on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditMode {
    /// Description editor
    Description,

    /// Status dropdown
    Status,

    /// Assignee dropdown
    Assignee,

    /// Note composer
    Note,
}

/// Transient state of one issue row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowState {
    /// An operation is in flight for this row
    pub busy: bool,

    /// Error from the last operation, if it failed
    pub error: Option<ClassifiedError>,

    /// Selected tab
    pub active_tab: Tab,

    /// Open edit affordance
    pub edit: Option<EditMode>,
}

/// A row operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowError {
    /// Another operation is already running on the row.
    #[error("issue #{0} is busy")]
    Busy(IssueId),

    /// The issue is not displayed.
    #[error("issue #{0} is not displayed")]
    Unknown(IssueId),
}

/// State for every displayed issue row.
#[derive(Debug, Clone, Default)]
pub struct RowStates {
    rows: HashMap<IssueId, RowState>,
}

impl RowStates {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track exactly `ids`: new ids get default state, missing ids are dropped.
    pub fn sync(&mut self, ids: impl IntoIterator<Item = IssueId>) {
        let wanted: HashMap<IssueId, RowState> = ids
            .into_iter()
            .map(|id| (id, self.rows.remove(&id).unwrap_or_default()))
            .collect();
        self.rows = wanted;
    }

    /// State of one row.
    #[must_use]
    pub fn get(&self, id: IssueId) -> Option<&RowState> {
        self.rows.get(&id)
    }

    /// Number of tracked rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row and mode of the open edit affordance, if any.
    #[must_use]
    pub fn open_edit(&self) -> Option<(IssueId, EditMode)> {
        self.rows
            .iter()
            .find_map(|(id, row)| row.edit.map(|mode| (*id, mode)))
    }

    /// Open an edit affordance on `id`, closing any other one.
    ///
    /// # Errors
    ///
    /// Fails when the row is busy or not displayed.
    pub fn begin_edit(&mut self, id: IssueId, mode: EditMode) -> Result<(), RowError> {
        let row = self.rows.get(&id).ok_or(RowError::Unknown(id))?;
        if row.busy {
            return Err(RowError::Busy(id));
        }
        for row in self.rows.values_mut() {
            row.edit = None;
        }
        if let Some(row) = self.rows.get_mut(&id) {
            row.edit = Some(mode);
        }
        Ok(())
    }

    /// Close the edit affordance on `id`.
    pub fn cancel_edit(&mut self, id: IssueId) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.edit = None;
        }
    }

    /// Mark the row busy and clear its previous error.
    ///
    /// # Errors
    ///
    /// Fails when the row already has an operation in flight or is not displayed.
    pub fn start(&mut self, id: IssueId) -> Result<(), RowError> {
        let row = self.rows.get_mut(&id).ok_or(RowError::Unknown(id))?;
        if row.busy {
            return Err(RowError::Busy(id));
        }
        row.busy = true;
        row.error = None;
        Ok(())
    }

    /// Record the outcome of the operation started with [`RowStates::start`].
    ///
    /// Success closes the edit affordance; failure keeps it open so the user
    /// can retry, and replaces any earlier error.
    pub fn finish(&mut self, id: IssueId, error: Option<ClassifiedError>) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.busy = false;
            if error.is_none() {
                row.edit = None;
            }
            row.error = error;
        }
    }

    /// Clear the row's error without starting anything.
    pub fn dismiss_error(&mut self, id: IssueId) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.error = None;
        }
    }

    /// Switch the row's tab.
    pub fn select_tab(&mut self, id: IssueId, tab: Tab) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.active_tab = tab;
        }
    }
}
