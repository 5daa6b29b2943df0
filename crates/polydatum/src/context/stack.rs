//! Per-thread stack of open contexts.
//!
//! Contexts are pushed when setup starts and removed when teardown ends.
//! Lookups are filtered by owning manager so independent managers on the
//! same thread never see each other's contexts.

use std::cell::RefCell;

use super::ExecutionContext;
use crate::manager::DataManager;

thread_local! {
    static ACTIVE: RefCell<Vec<ExecutionContext>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn push(context: ExecutionContext) {
    ACTIVE.with(|stack| stack.borrow_mut().push(context));
}

/// Removes the most recent entry for `context`, wherever it sits.
pub(crate) fn remove(context: &ExecutionContext) {
    ACTIVE.with(|cell| {
        let mut stack = cell.borrow_mut();
        if let Some(position) = stack.iter().rposition(|entry| entry.is_same(context)) {
            stack.remove(position);
        }
    });
}

/// Returns the innermost open context owned by `manager`.
pub(crate) fn top_for(manager: &DataManager) -> Option<ExecutionContext> {
    ACTIVE.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|entry| entry.belongs_to(manager))
            .cloned()
    })
}

/// Number of open contexts on the current thread, across all managers.
#[must_use]
pub fn depth() -> usize {
    ACTIVE.with(|stack| stack.borrow().len())
}
