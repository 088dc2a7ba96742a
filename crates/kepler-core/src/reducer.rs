use std::any::Any;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::actions::Action;
use super::combined::add_data_to_map;
use super::combined::receive_map_config;
use super::combined::replace_data_in_map;
use super::config::CoreConfig;
use super::diagnostics::Diagnostics;
use super::error::CombinedUpdaterError;
use super::error::CompositionError;
use super::lens::ExtensionLens;
use super::lens::Lens;
use super::lens::MapStateLens;
use super::lens::MapStyleLens;
use super::lens::ProviderStateLens;
use super::lens::UiStateLens;
use super::lens::VisStateLens;
use super::root::ExtensionSlice;
use super::root::RootState;
use super::root::SliceKey;
use super::slices::map_state;
use super::slices::map_style;
use super::slices::provider_state;
use super::slices::ui_state;
use super::slices::vis_state;

type ErasedReducer = Box<dyn Fn(&ExtensionSlice, &Action, &mut Diagnostics) -> ExtensionSlice + Send + Sync>;

struct ExtensionEntry {
    key: Arc<str>,
    type_id: TypeId,
    initial: ExtensionSlice,
    reduce: ErasedReducer,
}

/// The outcome of reducing one action.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub root: RootState,
    /// Slices whose allocation changed, in registry order.
    pub touched: Vec<SliceKey>,
    pub diagnostics: Diagnostics,
    /// Set when a combined updater rolled back.
    pub error: Option<CombinedUpdaterError>,
}

impl Reduction {
    pub fn is_noop(&self) -> bool {
        self.touched.is_empty()
    }
}

/// Collects externally registered slices before the key set is frozen.
pub struct CompositionBuilder {
    config: CoreConfig,
    extensions: Vec<ExtensionEntry>,
}

impl CompositionBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            extensions: Vec::new(),
        }
    }

    /// Adds slice `key` with its initial value and reducer. The reducer sees
    /// every action, including `Action::External`, and returns `state` itself
    /// when nothing changed.
    pub fn register_slice<S, F>(
        &mut self,
        key: &str,
        initial: S,
        reducer: F,
    ) -> Result<ExtensionLens<S>, CompositionError>
    where
        S: Send + Sync + 'static,
        F: Fn(&Arc<S>, &Action, &mut Diagnostics) -> Arc<S> + Send + Sync + 'static,
    {
        if SliceKey::is_reserved(key) {
            return Err(CompositionError::ReservedKey(Arc::from(key)));
        }
        if self.extensions.iter().any(|entry| &*entry.key == key) {
            return Err(CompositionError::DuplicateKey(Arc::from(key)));
        }

        let key: Arc<str> = Arc::from(key);
        let slice_key = SliceKey::Extension(key.clone());
        let reduce: ErasedReducer = Box::new(move |slot, action, diagnostics| {
            let typed = match Arc::clone(slot).downcast::<S>() {
                Ok(typed) => typed,
                Err(_) => {
                    tracing::error!(slice = %slice_key, "extension slice holds a foreign type");
                    return Arc::clone(slot);
                }
            };
            let next = reducer(&typed, action, diagnostics);
            if Arc::ptr_eq(&next, &typed) {
                Arc::clone(slot)
            } else {
                next as ExtensionSlice
            }
        });
        self.extensions.push(ExtensionEntry {
            key: key.clone(),
            type_id: TypeId::of::<S>(),
            initial: Arc::new(initial),
            reduce,
        });
        Ok(ExtensionLens::new(key))
    }

    pub fn build(self) -> CoreReducer {
        let extensions: BTreeMap<Arc<str>, ExtensionSlice> = self
            .extensions
            .iter()
            .map(|entry| (entry.key.clone(), Arc::clone(&entry.initial)))
            .collect();
        let initial = RootState::new(
            vis_state::VisState::new(&self.config.vis),
            map_state::MapState::new(&self.config.map),
            map_style::MapStyle::new(&self.config.style),
            ui_state::UiState::new(&self.config.ui),
            provider_state::ProviderState::default(),
            extensions,
        );
        tracing::debug!(
            extensions = self.extensions.len(),
            "composed core reducer"
        );
        CoreReducer {
            config: self.config,
            initial,
            extensions: self.extensions,
        }
    }
}

/// One function over the whole root state, fixed at `build` time.
pub struct CoreReducer {
    config: CoreConfig,
    initial: RootState,
    extensions: Vec<ExtensionEntry>,
}

impl CoreReducer {
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// A fresh root; its slices share allocations with the composer's
    /// initial values.
    pub fn initial_state(&self) -> RootState {
        self.initial.clone()
    }

    pub fn keys(&self) -> Vec<SliceKey> {
        self.initial.keys()
    }

    /// Lens for registered slice `key`, checked against the slice type.
    pub fn lens<S: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ExtensionLens<S>, CompositionError> {
        let entry = self
            .extensions
            .iter()
            .find(|entry| &*entry.key == key)
            .ok_or_else(|| CompositionError::MissingSlice(SliceKey::Extension(Arc::from(key))))?;
        if entry.type_id != TypeId::of::<S>() {
            return Err(CompositionError::SliceTypeMismatch(SliceKey::Extension(
                entry.key.clone(),
            )));
        }
        Ok(ExtensionLens::new(entry.key.clone()))
    }

    /// Checks that `root` carries exactly the registered slices with the
    /// registered types.
    pub fn validate(&self, root: &RootState) -> Result<(), CompositionError> {
        for entry in &self.extensions {
            let key = SliceKey::Extension(entry.key.clone());
            let slot = root
                .extension(&entry.key)
                .ok_or_else(|| CompositionError::MissingSlice(key.clone()))?;
            let held: &(dyn Any + Send + Sync) = &**slot;
            if held.type_id() != entry.type_id {
                return Err(CompositionError::SliceTypeMismatch(key));
            }
        }
        if let Some(unknown) = root
            .extension_keys()
            .find(|key| !self.extensions.iter().any(|entry| entry.key == **key))
        {
            return Err(CompositionError::UnknownSlice(unknown.clone()));
        }
        Ok(())
    }

    pub fn reduce(&self, root: &RootState, action: &Action) -> Reduction {
        let mut diagnostics = Diagnostics::new();
        let initial = &self.initial;

        let mut next = VisStateLens.set(
            root,
            vis_state::reduce(root.vis_state(), initial.vis_state(), action, &mut diagnostics),
        );
        next = MapStateLens.set(
            &next,
            map_state::reduce(root.map_state(), initial.map_state(), action, &mut diagnostics),
        );
        next = MapStyleLens.set(
            &next,
            map_style::reduce(root.map_style(), initial.map_style(), action, &mut diagnostics),
        );
        next = UiStateLens.set(
            &next,
            ui_state::reduce(root.ui_state(), initial.ui_state(), action, &mut diagnostics),
        );
        next = ProviderStateLens.set(
            &next,
            provider_state::reduce(
                root.provider_state(),
                initial.provider_state(),
                action,
                &mut diagnostics,
            ),
        );
        next = self.reduce_extensions(&next, action, &mut diagnostics);

        let mut error = None;
        let combined = match action {
            Action::AddDataToMap(payload) => Some(add_data_to_map(&next, payload, &mut diagnostics)),
            Action::ReplaceDataInMap(payload) => {
                Some(replace_data_in_map(&next, payload, &mut diagnostics))
            }
            Action::ReceiveMapConfig(payload) => {
                Some(receive_map_config(&next, payload, &mut diagnostics))
            }
            _ => None,
        };
        match combined {
            Some(Ok(combined)) => next = combined,
            // A failed combined updater rolls back the whole action,
            // slice and extension reducers included.
            Some(Err(err)) => {
                next = root.clone();
                error = Some(err);
            }
            None => {}
        }

        let touched = root.changed_slices(&next);
        tracing::debug!(
            action = action.label(),
            touched = ?touched.iter().map(SliceKey::label).collect::<Vec<_>>(),
            diagnostics = diagnostics.len(),
            "reduced action"
        );
        Reduction {
            root: next,
            touched,
            diagnostics,
            error,
        }
    }

    fn reduce_extensions(
        &self,
        root: &RootState,
        action: &Action,
        diagnostics: &mut Diagnostics,
    ) -> RootState {
        let mut next = root.clone();
        for entry in &self.extensions {
            let Some(slot) = root.extension(&entry.key) else {
                tracing::error!(slice = %entry.key, "registered slice missing from root");
                continue;
            };
            let reduced = (entry.reduce)(slot, action, diagnostics);
            if !Arc::ptr_eq(&reduced, slot) {
                Arc::make_mut(&mut next.extensions).insert(entry.key.clone(), reduced);
            }
        }
        next
    }
}

#[cfg(test)]
mod tests;
