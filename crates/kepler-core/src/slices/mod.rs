pub mod map_state;
pub mod map_style;
pub mod provider_state;
pub mod ui_state;
pub mod vis_state;
pub mod vis_state_updaters;

use std::sync::Arc;

use super::diagnostics::Diagnostics;
use super::error::PayloadError;
use super::root::SliceKey;

/// Keeps the current allocation when `next` is value-equal to it.
pub(crate) fn changed<S: PartialEq>(state: &Arc<S>, next: S) -> Arc<S> {
    if **state == next {
        Arc::clone(state)
    } else {
        Arc::new(next)
    }
}

/// Turns an updater failure into a diagnostic and leaves the slice as it was.
pub(crate) fn settle<S>(
    state: &Arc<S>,
    slice: SliceKey,
    result: Result<Arc<S>, PayloadError>,
    diagnostics: &mut Diagnostics,
) -> Arc<S> {
    match result {
        Ok(next) => next,
        Err(err) => {
            diagnostics.reject(slice, &err);
            Arc::clone(state)
        }
    }
}
