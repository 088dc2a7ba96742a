use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::actions::Action;
use super::error::StoreError;
use super::persistence::SessionLog;
use super::reducer::CoreReducer;
use super::reducer::Reduction;
use super::root::RootState;

/// Queues actions for a [`Store`] from any thread.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: Sender<Action>,
}

impl Dispatcher {
    pub fn dispatch(&self, action: Action) -> Result<(), StoreError> {
        self.sender.send(action).map_err(|_| StoreError::Closed)
    }
}

struct StoreState {
    root: RootState,
    past: VecDeque<RootState>,
    future: Vec<RootState>,
    log: Option<SessionLog>,
    /// Dequeued action whose log write failed; retried before the queue.
    stalled: Option<Action>,
}

/// One running core: the current root, its undo history and the queue of
/// actions waiting to be reduced.
///
/// Reduction happens under the state lock, so no two actions ever reduce
/// against the same root concurrently.
pub struct Store {
    reducer: CoreReducer,
    state: Mutex<StoreState>,
    sender: Sender<Action>,
    receiver: Receiver<Action>,
}

impl Store {
    pub fn new(reducer: CoreReducer) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let root = reducer.initial_state();
        Self {
            reducer,
            state: Mutex::new(StoreState {
                root,
                past: VecDeque::new(),
                future: Vec::new(),
                log: None,
                stalled: None,
            }),
            sender,
            receiver,
        }
    }

    /// Records every reduced action to `log`.
    pub fn with_log(self, log: SessionLog) -> Self {
        self.state.lock().log = Some(log);
        self
    }

    pub fn reducer(&self) -> &CoreReducer {
        &self.reducer
    }

    /// Snapshot of the current root.
    pub fn state(&self) -> RootState {
        self.state.lock().root.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            sender: self.sender.clone(),
        }
    }

    pub fn dispatch(&self, action: Action) -> Result<Vec<Reduction>, StoreError> {
        self.sender.send(action).map_err(|_| StoreError::Closed)?;
        self.drain()
    }

    /// Reduces every queued action in the order it was dispatched.
    ///
    /// A failed log write stops the drain before that action is reduced.
    /// The action is held back and is the first one the next drain retries;
    /// actions behind it stay queued.
    pub fn drain(&self) -> Result<Vec<Reduction>, StoreError> {
        let mut state = self.state.lock();
        let capacity = self.reducer.config().store.history_capacity;
        let mut reductions = Vec::new();
        loop {
            let Some(action) = state
                .stalled
                .take()
                .or_else(|| self.receiver.try_recv().ok())
            else {
                break;
            };
            if let Some(log) = state.log.as_mut() {
                if let Err(err) = log.append(&action) {
                    tracing::warn!(action = action.label(), error = %err, "session log write failed");
                    state.stalled = Some(action);
                    return Err(err.into());
                }
            }
            let reduction = self.reducer.reduce(&state.root, &action);
            if !reduction.is_noop() {
                let previous = std::mem::replace(&mut state.root, reduction.root.clone());
                state.past.push_back(previous);
                while state.past.len() > capacity {
                    state.past.pop_front();
                }
                state.future.clear();
            }
            reductions.push(reduction);
        }
        Ok(reductions)
    }

    /// Steps back to the root before the last changing action.
    pub fn undo(&self) -> bool {
        let mut state = self.state.lock();
        let Some(previous) = state.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut state.root, previous);
        state.future.push(current);
        tracing::debug!(history = state.past.len(), "undo");
        true
    }

    pub fn redo(&self) -> bool {
        let mut state = self.state.lock();
        let Some(next) = state.future.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut state.root, next);
        state.past.push_back(current);
        tracing::debug!(history = state.past.len(), "redo");
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.state.lock().past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.lock().future.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::actions::MapStateAction;
    use crate::actions::UiStateAction;
    use crate::actions::ViewportPatch;
    use crate::config::CoreConfig;
    use crate::config::StoreConfig;
    use crate::reducer::CompositionBuilder;

    fn store_with_history(history_capacity: usize) -> Store {
        let config = CoreConfig {
            store: StoreConfig { history_capacity },
            ..CoreConfig::default()
        };
        Store::new(CompositionBuilder::new(config).build())
    }

    fn zoom(level: f64) -> Action {
        Action::MapState(MapStateAction::UpdateMap {
            viewport: ViewportPatch {
                zoom: Some(level),
                ..ViewportPatch::default()
            },
            map_index: None,
        })
    }

    #[test]
    fn undo_restores_the_previous_root_pointer() {
        let store = store_with_history(10);
        let before = store.state();
        store.dispatch(zoom(4.0)).expect("dispatch");
        let after = store.state();
        assert!(!after.same(&before));

        assert!(store.undo());
        assert!(store.state().same(&before));
        assert!(Arc::ptr_eq(store.state().map_state(), before.map_state()));

        assert!(store.redo());
        assert!(store.state().same(&after));
        assert!(!store.redo());
    }

    #[test]
    fn history_is_bounded_and_new_actions_clear_redo() {
        let store = store_with_history(2);
        for level in [2.0, 3.0, 4.0] {
            store.dispatch(zoom(level)).expect("dispatch");
        }
        assert!(store.undo());
        assert!(store.undo());
        assert!(!store.undo());
        assert_eq!(store.state().map_state().zoom, 2.0);

        store.dispatch(zoom(7.0)).expect("dispatch");
        assert!(!store.can_redo());
    }

    #[test]
    fn noop_actions_do_not_enter_history() {
        let store = store_with_history(10);
        store.dispatch(zoom(4.0)).expect("dispatch");
        let reductions = store.dispatch(zoom(4.0)).expect("dispatch");
        assert!(reductions[0].is_noop());
        assert!(store.undo());
        assert!(!store.can_undo());
    }

    #[test]
    fn dispatchers_on_other_threads_queue_in_order() {
        let store = store_with_history(10);
        let dispatcher = store.dispatcher();
        let producer = thread::spawn(move || {
            for locale in ["de", "fr", "ja"] {
                dispatcher
                    .dispatch(Action::UiState(UiStateAction::SetLocale {
                        locale: locale.to_string(),
                    }))
                    .expect("queued");
            }
        });
        producer.join().expect("producer");

        let reductions = store.drain().expect("drain");
        assert_eq!(reductions.len(), 3);
        assert_eq!(store.state().ui_state().locale, "ja");
        assert!(store.drain().expect("drain").is_empty());
    }

    #[test]
    fn logged_store_records_every_dispatch() {
        let dir = tempdir().expect("tmpdir");
        let log = SessionLog::open(dir.path().join("session.jsonl")).expect("open");
        let store = store_with_history(10).with_log(log);
        store.dispatch(zoom(4.0)).expect("dispatch");
        store.dispatch(zoom(4.0)).expect("dispatch");

        let records = crate::persistence::load_records(&dir.path().join("session.jsonl"))
            .expect("load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].action, zoom(4.0));
    }

    #[test]
    fn action_survives_a_failed_log_write() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("session.jsonl");
        let log = SessionLog::open(&path).expect("open");
        let store = store_with_history(10).with_log(log);
        let before = store.state();

        // A directory in place of the log file makes every append fail.
        std::fs::create_dir(&path).expect("block log path");
        let err = store.dispatch(zoom(4.0)).expect_err("log write fails");
        assert!(matches!(err, StoreError::SessionLog(_)));
        store.dispatch(zoom(6.0)).expect_err("still blocked");
        assert!(store.state().same(&before));

        std::fs::remove_dir(&path).expect("unblock log path");
        let reductions = store.drain().expect("drain");
        assert_eq!(reductions.len(), 2);
        assert_eq!(store.state().map_state().zoom, 6.0);
        assert!(store.undo());
        assert_eq!(store.state().map_state().zoom, 4.0);

        let records = crate::persistence::load_records(&path).expect("load");
        assert_eq!(
            records.into_iter().map(|record| record.action).collect::<Vec<_>>(),
            vec![zoom(4.0), zoom(6.0)]
        );
    }
}
