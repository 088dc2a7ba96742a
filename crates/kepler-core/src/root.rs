use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::slices::map_state::MapState;
use super::slices::map_style::MapStyle;
use super::slices::provider_state::ProviderState;
use super::slices::ui_state::UiState;
use super::slices::vis_state::VisState;

pub type ExtensionSlice = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SliceKey {
    VisState,
    MapState,
    MapStyle,
    UiState,
    ProviderState,
    Extension(Arc<str>),
}

pub const BUILTIN_SLICES: [SliceKey; 5] = [
    SliceKey::VisState,
    SliceKey::MapState,
    SliceKey::MapStyle,
    SliceKey::UiState,
    SliceKey::ProviderState,
];

impl SliceKey {
    pub fn label(&self) -> &str {
        match self {
            Self::VisState => "visState",
            Self::MapState => "mapState",
            Self::MapStyle => "mapStyle",
            Self::UiState => "uiState",
            Self::ProviderState => "providerState",
            Self::Extension(key) => key,
        }
    }

    pub fn is_reserved(key: &str) -> bool {
        BUILTIN_SLICES.iter().any(|builtin| builtin.label() == key)
    }
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The whole application state.
///
/// Every slice sits behind its own `Arc`, so cloning a root is cheap and two
/// roots that share a slice share the allocation. Pointer identity of a slice
/// is the change signal downstream consumers rely on.
#[derive(Clone)]
pub struct RootState {
    pub(crate) vis_state: Arc<VisState>,
    pub(crate) map_state: Arc<MapState>,
    pub(crate) map_style: Arc<MapStyle>,
    pub(crate) ui_state: Arc<UiState>,
    pub(crate) provider_state: Arc<ProviderState>,
    pub(crate) extensions: Arc<BTreeMap<Arc<str>, ExtensionSlice>>,
}

impl RootState {
    pub(crate) fn new(
        vis_state: VisState,
        map_state: MapState,
        map_style: MapStyle,
        ui_state: UiState,
        provider_state: ProviderState,
        extensions: BTreeMap<Arc<str>, ExtensionSlice>,
    ) -> Self {
        Self {
            vis_state: Arc::new(vis_state),
            map_state: Arc::new(map_state),
            map_style: Arc::new(map_style),
            ui_state: Arc::new(ui_state),
            provider_state: Arc::new(provider_state),
            extensions: Arc::new(extensions),
        }
    }

    pub fn vis_state(&self) -> &Arc<VisState> {
        &self.vis_state
    }

    pub fn map_state(&self) -> &Arc<MapState> {
        &self.map_state
    }

    pub fn map_style(&self) -> &Arc<MapStyle> {
        &self.map_style
    }

    pub fn ui_state(&self) -> &Arc<UiState> {
        &self.ui_state
    }

    pub fn provider_state(&self) -> &Arc<ProviderState> {
        &self.provider_state
    }

    pub fn extension_keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.extensions.keys()
    }

    pub(crate) fn extension(&self, key: &str) -> Option<&ExtensionSlice> {
        self.extensions.get(key)
    }

    pub fn keys(&self) -> Vec<SliceKey> {
        BUILTIN_SLICES
            .iter()
            .cloned()
            .chain(
                self.extensions
                    .keys()
                    .map(|key| SliceKey::Extension(key.clone())),
            )
            .collect()
    }

    /// Same slice allocations everywhere; the cheap "nothing changed" check.
    pub fn same(&self, other: &RootState) -> bool {
        Arc::ptr_eq(&self.vis_state, &other.vis_state)
            && Arc::ptr_eq(&self.map_state, &other.map_state)
            && Arc::ptr_eq(&self.map_style, &other.map_style)
            && Arc::ptr_eq(&self.ui_state, &other.ui_state)
            && Arc::ptr_eq(&self.provider_state, &other.provider_state)
            && (Arc::ptr_eq(&self.extensions, &other.extensions)
                || (self.extensions.len() == other.extensions.len()
                    && self
                        .extensions
                        .iter()
                        .zip(other.extensions.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && Arc::ptr_eq(va, vb))))
    }

    /// Keys whose slice allocation differs between `self` and `next`, in
    /// registry order.
    pub fn changed_slices(&self, next: &RootState) -> Vec<SliceKey> {
        let mut changed = Vec::new();
        if !Arc::ptr_eq(&self.vis_state, &next.vis_state) {
            changed.push(SliceKey::VisState);
        }
        if !Arc::ptr_eq(&self.map_state, &next.map_state) {
            changed.push(SliceKey::MapState);
        }
        if !Arc::ptr_eq(&self.map_style, &next.map_style) {
            changed.push(SliceKey::MapStyle);
        }
        if !Arc::ptr_eq(&self.ui_state, &next.ui_state) {
            changed.push(SliceKey::UiState);
        }
        if !Arc::ptr_eq(&self.provider_state, &next.provider_state) {
            changed.push(SliceKey::ProviderState);
        }
        if !Arc::ptr_eq(&self.extensions, &next.extensions) {
            for (key, value) in next.extensions.iter() {
                let unchanged = self
                    .extensions
                    .get(key)
                    .is_some_and(|prev| Arc::ptr_eq(prev, value));
                if !unchanged {
                    changed.push(SliceKey::Extension(key.clone()));
                }
            }
        }
        changed
    }
}

impl fmt::Debug for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootState")
            .field("vis_state", &self.vis_state)
            .field("map_state", &self.map_state)
            .field("map_style", &self.map_style)
            .field("ui_state", &self.ui_state)
            .field("provider_state", &self.provider_state)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}
