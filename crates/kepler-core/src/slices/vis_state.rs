use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::changed;
use super::settle;
use super::vis_state_updaters as updaters;
use crate::actions::Action;
use crate::actions::VisStateAction;
use crate::config::VisConfig;
use crate::dataset::Dataset;
use crate::diagnostics::Diagnostics;
use crate::filter::filtered_index;
use crate::filter::Filter;
use crate::layer::Layer;
use crate::merger::MergeMode;
use crate::root::SliceKey;
use crate::saved::FilterIdentity;
use crate::saved::SavedFilter;
use crate::saved::SavedLayer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerBlending {
    #[default]
    Normal,
    Additive,
    Subtractive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverInfo {
    pub layer_id: String,
    pub index: usize,
    #[serde(default)]
    pub coordinate: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TooltipConfig {
    pub enabled: bool,
    pub compare_mode: bool,
    pub fields_to_show: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrushConfig {
    pub enabled: bool,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionConfig {
    pub tooltip: TooltipConfig,
    pub brush: BrushConfig,
    pub geocoder: bool,
    pub coordinate: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            tooltip: TooltipConfig {
                enabled: true,
                ..TooltipConfig::default()
            },
            brush: BrushConfig {
                enabled: false,
                size: 0.5,
            },
            geocoder: false,
            coordinate: false,
        }
    }
}

/// Layer visibility for one pane of a split map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitMap {
    pub layers: BTreeMap<String, bool>,
}

/// A merge-time entity waiting for dataset `data_id` to be loaded.
///
/// `batch` numbers the merge the entity arrived with; every entity of one
/// batch shares its `mode`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending<T> {
    pub data_id: String,
    pub mode: MergeMode,
    pub batch: u64,
    pub entity: T,
}

/// Split-map visibility for a layer that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSplitLayer {
    pub map_index: usize,
    pub layer_id: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingConfig {
    pub layers: Vec<Pending<SavedLayer>>,
    pub filters: Vec<Pending<SavedFilter>>,
    pub tooltips: Vec<Pending<Vec<String>>>,
    pub split_layers: Vec<PendingSplitLayer>,
    /// Batch number the next queued entity is tagged with.
    pub(crate) open_batch: u64,
}

impl PendingConfig {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
            && self.filters.is_empty()
            && self.tooltips.is_empty()
            && self.split_layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layers.len() + self.filters.len() + self.tooltips.len() + self.split_layers.len()
    }

    /// Closes the open batch if anything was queued under it.
    pub(crate) fn seal_batch(&mut self) {
        let open = self.open_batch;
        let used = self.layers.iter().any(|queued| queued.batch == open)
            || self.filters.iter().any(|queued| queued.batch == open)
            || self.tooltips.iter().any(|queued| queued.batch == open);
        if used {
            self.open_batch += 1;
        }
    }

    /// Batch numbers still queued, oldest first.
    pub(crate) fn batches(&self) -> BTreeSet<u64> {
        self.layers
            .iter()
            .map(|queued| queued.batch)
            .chain(self.filters.iter().map(|queued| queued.batch))
            .chain(self.tooltips.iter().map(|queued| queued.batch))
            .collect()
    }

    /// Queues a layer. A `Replace` entry supersedes earlier entries with the
    /// same id; a `Merge` entry patches them on replay, so they stay.
    pub(crate) fn push_layer(&mut self, pending: Pending<SavedLayer>) {
        if pending.mode == MergeMode::Replace {
            self.layers.retain(|queued| queued.entity.id != pending.entity.id);
        }
        self.layers.push(pending);
    }

    pub(crate) fn push_filter(&mut self, pending: Pending<SavedFilter>) {
        if pending.mode == MergeMode::Replace {
            let identity: FilterIdentity = pending.entity.identity();
            self.filters
                .retain(|queued| queued.entity.identity() != identity);
        }
        self.filters.push(pending);
    }

    pub(crate) fn push_tooltip(&mut self, pending: Pending<Vec<String>>) {
        if pending.mode == MergeMode::Replace {
            self.tooltips.retain(|queued| queued.data_id != pending.data_id);
        }
        self.tooltips.push(pending);
    }

    pub(crate) fn push_split_layer(&mut self, pending: PendingSplitLayer) {
        self.split_layers.retain(|queued| {
            queued.map_index != pending.map_index || queued.layer_id != pending.layer_id
        });
        self.split_layers.push(pending);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisState {
    pub map_info: MapInfo,
    pub datasets: BTreeMap<String, Arc<Dataset>>,
    pub layers: Vec<Layer>,
    /// Layer ids, top of the draw stack first.
    pub layer_order: Vec<String>,
    pub filters: Vec<Filter>,
    pub interaction_config: InteractionConfig,
    pub layer_blending: LayerBlending,
    /// Empty unless the map is split.
    pub split_maps: Vec<SplitMap>,
    pub hovered: Option<HoverInfo>,
    pub clicked: Option<HoverInfo>,
    pub pending: PendingConfig,
    pub auto_create_layers: bool,
    pub merge_mode: MergeMode,
    pub(crate) next_id: u64,
}

impl VisState {
    pub fn new(config: &VisConfig) -> Self {
        Self {
            map_info: MapInfo::default(),
            datasets: BTreeMap::new(),
            layers: Vec::new(),
            layer_order: Vec::new(),
            filters: Vec::new(),
            interaction_config: InteractionConfig::default(),
            layer_blending: LayerBlending::Normal,
            split_maps: Vec::new(),
            hovered: None,
            clicked: None,
            pending: PendingConfig::default(),
            auto_create_layers: config.auto_create_layers,
            merge_mode: config.merge_mode,
            next_id: 0,
        }
    }

    /// Empty map config with the same settings and map info.
    pub fn reset(&self) -> Self {
        Self {
            map_info: self.map_info.clone(),
            next_id: self.next_id,
            ..Self::new(&VisConfig {
                auto_create_layers: self.auto_create_layers,
                merge_mode: self.merge_mode,
            })
        }
    }

    pub fn dataset(&self, data_id: &str) -> Option<&Arc<Dataset>> {
        self.datasets.get(data_id)
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == id)
    }

    pub fn filter(&self, id: &str) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.id == id)
    }

    pub fn filter_index(&self, id: &str) -> Option<usize> {
        self.filters.iter().position(|filter| filter.id == id)
    }

    pub fn is_split(&self) -> bool {
        !self.split_maps.is_empty()
    }

    /// `base`, or `base-2`, `base-3`, ... when a layer or filter already uses it.
    pub(crate) fn derive_id(&self, base: &str) -> String {
        let taken = |id: &str| self.layer(id).is_some() || self.filter(id).is_some();
        if !taken(base) {
            return base.to_string();
        }
        (2_u32..)
            .map(|suffix| format!("{base}-{suffix}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Next free id of the form `{prefix}-{n}`.
    pub(crate) fn take_id(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{prefix}-{}", self.next_id);
            self.next_id += 1;
            let taken = self.layer(&candidate).is_some() || self.filter(&candidate).is_some();
            if !taken {
                return candidate;
            }
        }
    }

    /// Appends a layer to the list and the bottom of the draw order.
    pub(crate) fn push_layer(&mut self, layer: Layer) {
        self.layer_order.push(layer.id.clone());
        for split in &mut self.split_maps {
            split.layers.insert(layer.id.clone(), layer.config.is_visible);
        }
        self.layers.push(layer);
    }

    pub(crate) fn drop_layer(&mut self, id: &str) {
        self.layers.retain(|layer| layer.id != id);
        self.layer_order.retain(|layer_id| layer_id != id);
        for split in &mut self.split_maps {
            split.layers.remove(id);
        }
        if self.hovered.as_ref().is_some_and(|info| info.layer_id == id) {
            self.hovered = None;
        }
        if self.clicked.as_ref().is_some_and(|info| info.layer_id == id) {
            self.clicked = None;
        }
    }

    /// Recomputes the filtered rows of `data_id`; the dataset keeps its
    /// allocation when nothing changed.
    pub(crate) fn refilter(&mut self, data_id: &str) {
        let Some(dataset) = self.datasets.get(data_id) else {
            return;
        };
        let index = filtered_index(dataset, &self.filters);
        if index != dataset.filtered_index {
            let next = Arc::new(dataset.with_filtered_index(index));
            self.datasets.insert(data_id.to_string(), next);
        }
    }
}

pub fn reduce(
    state: &Arc<VisState>,
    initial: &Arc<VisState>,
    action: &Action,
    diagnostics: &mut Diagnostics,
) -> Arc<VisState> {
    let result = match action {
        Action::VisState(action) => match action {
            VisStateAction::UpdateVisData(payload) => updaters::update_vis_data(
                state,
                &payload.datasets,
                payload.config.as_ref(),
                &payload.options,
                diagnostics,
            ),
            VisStateAction::RemoveDataset { data_id } => {
                updaters::remove_dataset(state, data_id, diagnostics)
            }
            VisStateAction::AddLayer { data_id, config } => {
                updaters::add_layer(state, data_id.as_deref(), config.as_ref(), diagnostics)
            }
            VisStateAction::RemoveLayer { id } => updaters::remove_layer(state, id),
            VisStateAction::DuplicateLayer { id } => updaters::duplicate_layer(state, id),
            VisStateAction::ReorderLayer { order } => updaters::reorder_layer(state, order),
            VisStateAction::LayerConfigChange { id, patch } => {
                updaters::layer_config_change(state, id, patch)
            }
            VisStateAction::LayerTypeChange { id, layer_type } => {
                updaters::layer_type_change(state, id, *layer_type)
            }
            VisStateAction::LayerVisConfigChange { id, patch } => {
                updaters::layer_vis_config_change(state, id, patch)
            }
            VisStateAction::ToggleLayerForMap {
                map_index,
                layer_id,
            } => updaters::toggle_layer_for_map(state, *map_index, layer_id),
            VisStateAction::SetLayerBlending(blending) => {
                Ok(updaters::set_layer_blending(state, *blending))
            }
            VisStateAction::AddFilter { data_id } => updaters::add_filter(state, data_id),
            VisStateAction::RemoveFilter { id } => updaters::remove_filter(state, id),
            VisStateAction::SetFilterField { id, field } => {
                updaters::set_filter_field(state, id, field)
            }
            VisStateAction::SetFilterValue { id, value } => {
                updaters::set_filter_value(state, id, value)
            }
            VisStateAction::EnlargeFilter { id } => updaters::enlarge_filter(state, id),
            VisStateAction::ToggleFilterAnimation { id } => {
                updaters::toggle_filter_animation(state, id)
            }
            VisStateAction::UpdateAnimationSpeed { id, speed } => {
                updaters::update_animation_speed(state, id, *speed)
            }
            VisStateAction::InteractionConfigChange(config) => Ok(
                updaters::interaction_config_change(state, config, diagnostics),
            ),
            VisStateAction::SetMapInfo(info) => Ok(updaters::set_map_info(state, info)),
            VisStateAction::LayerHover(info) => Ok(updaters::layer_hover(state, info.as_ref())),
            VisStateAction::LayerClick(info) => Ok(updaters::layer_click(state, info.as_ref())),
            VisStateAction::MapClick => Ok(updaters::layer_click(state, None)),
        },
        Action::ResetMapConfig => {
            if Arc::ptr_eq(state, initial) {
                return Arc::clone(state);
            }
            Ok(changed(state, state.reset()))
        }
        Action::ToggleSplitMap { index } => Ok(updaters::toggle_split_map(state, *index)),
        _ => return Arc::clone(state),
    };
    settle(state, SliceKey::VisState, result, diagnostics)
}
