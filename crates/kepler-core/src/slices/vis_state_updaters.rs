use std::collections::BTreeSet;
use std::sync::Arc;

use super::vis_state::HoverInfo;
use super::vis_state::LayerBlending;
use super::vis_state::MapInfo;
use super::vis_state::SplitMap;
use super::vis_state::VisState;
use crate::actions::LoadOptions;
use crate::dataset::Dataset;
use crate::dataset::DatasetPayload;
use crate::diagnostics::DiagnosticKind;
use crate::diagnostics::Diagnostics;
use crate::error::PayloadError;
use crate::filter::Filter;
use crate::filter::FilterValue;
use crate::layer::empty_layer;
use crate::layer::find_default_layers;
use crate::layer::LayerConfigPatch;
use crate::layer::LayerType;
use crate::layer::LayerVisConfigPatch;
use crate::merger::drop_pending_for_dataset;
use crate::merger::layer_from_saved;
use crate::merger::merge_interaction_config;
use crate::merger::merge_into;
use crate::merger::resolve_pending;
use crate::root::SliceKey;
use crate::saved::SavedInteractionConfig;
use crate::saved::SavedLayer;
use crate::saved::SavedVisState;

fn unknown_layer(id: &str) -> PayloadError {
    PayloadError::UnknownLayer(id.to_string())
}

fn unknown_filter(id: &str) -> PayloadError {
    PayloadError::UnknownFilter(id.to_string())
}

fn dataset_of(state: &VisState, data_id: &str) -> Result<Arc<Dataset>, PayloadError> {
    state
        .datasets
        .get(data_id)
        .cloned()
        .ok_or_else(|| PayloadError::UnknownDataset(data_id.to_string()))
}

fn validation_dropped(diagnostics: &mut Diagnostics, message: String) {
    diagnostics.warn(SliceKey::VisState, DiagnosticKind::ValidationDropped, message);
}

/// Builds every dataset of the batch up front so a malformed one rejects the
/// whole batch. Repeated ids keep the last dataset.
fn build_datasets(
    state: &VisState,
    payloads: &[DatasetPayload],
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Dataset>, PayloadError> {
    let mut built: Vec<Dataset> = Vec::with_capacity(payloads.len());
    for (slot, payload) in payloads.iter().enumerate() {
        let dataset = Dataset::from_payload(payload.clone(), state.datasets.len() + slot)?;
        if let Some(pos) = built.iter().position(|seen| seen.id == dataset.id) {
            diagnostics.warn(
                SliceKey::VisState,
                DiagnosticKind::MergeConflict,
                format!("dataset '{}' appears more than once; keeping the last one", dataset.id),
            );
            built.remove(pos);
        }
        built.push(dataset);
    }
    Ok(built)
}

/// Loads datasets, folds in an optional config, resolves pending entities
/// and creates default layers for new datasets that end up with none.
pub fn update_vis_data(
    state: &Arc<VisState>,
    datasets: &[DatasetPayload],
    config: Option<&SavedVisState>,
    options: &LoadOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Arc<VisState>, PayloadError> {
    let built = build_datasets(state, datasets, diagnostics)?;

    let mut next = match config {
        Some(_) if !options.keep_existing_config => state.reset(),
        _ => (**state).clone(),
    };

    let mut added = Vec::new();
    for dataset in built {
        let data_id = dataset.id.clone();
        if next.datasets.contains_key(&data_id) {
            retarget_dataset(&mut next, &data_id, dataset, diagnostics)?;
        } else {
            next.datasets.insert(data_id.clone(), Arc::new(dataset));
            added.push(data_id);
        }
    }

    if let Some(config) = config {
        let mode = next.merge_mode;
        merge_into(&mut next, config, mode, diagnostics);
    }
    resolve_pending(&mut next, diagnostics);

    let auto_create = options.auto_create_layers.unwrap_or(next.auto_create_layers);
    if auto_create {
        for data_id in &added {
            if next.layers.iter().any(|layer| layer.data_id() == data_id) {
                continue;
            }
            let Some(dataset) = next.datasets.get(data_id).cloned() else {
                continue;
            };
            for layer in find_default_layers(&dataset, options.initial_layer_visibility, next.layers.len()) {
                if next.layer(&layer.id).is_none() {
                    next.push_layer(layer);
                }
            }
        }
    }

    for data_id in &added {
        next.refilter(data_id);
    }
    tracing::debug!(added = ?added, layers = next.layers.len(), "vis data updated");
    Ok(Arc::new(next))
}

/// Points every entity of dataset `old_id` at `dataset`, dropping the ones
/// whose fields no longer exist. Layer order is preserved.
pub(crate) fn retarget_dataset(
    next: &mut VisState,
    old_id: &str,
    dataset: Dataset,
    diagnostics: &mut Diagnostics,
) -> Result<(), PayloadError> {
    if !next.datasets.contains_key(old_id) {
        return Err(PayloadError::UnknownDataset(old_id.to_string()));
    }
    let new_id = dataset.id.clone();
    if new_id != old_id && next.datasets.contains_key(&new_id) {
        return Err(PayloadError::DatasetExists(new_id));
    }
    next.datasets.remove(old_id);
    let dataset = Arc::new(dataset);
    next.datasets.insert(new_id.clone(), Arc::clone(&dataset));

    let mut dropped_layers = Vec::new();
    for layer in next.layers.iter_mut().filter(|layer| layer.config.data_id == old_id) {
        layer.config.data_id = new_id.clone();
        if let Err(err) = layer.validate_columns(&dataset) {
            validation_dropped(diagnostics, format!("layer '{}' dropped: {err}", layer.id));
            dropped_layers.push(layer.id.clone());
        }
    }
    for id in dropped_layers {
        next.drop_layer(&id);
    }

    let mut kept_filters = Vec::with_capacity(next.filters.len());
    for filter in std::mem::take(&mut next.filters) {
        if filter.data_id != old_id {
            kept_filters.push(filter);
            continue;
        }
        let rebound = Filter::for_field(filter.id.clone(), &dataset, &filter.name).and_then(|fresh| {
            let fresh = Filter {
                enlarged: filter.enlarged,
                is_animating: filter.is_animating,
                speed: filter.speed,
                ..fresh
            };
            match filter.value.clone() {
                Some(value) => fresh.with_value(value),
                None => Ok(fresh),
            }
        });
        match rebound {
            Ok(filter) => kept_filters.push(filter),
            Err(err) => validation_dropped(diagnostics, format!("filter '{}' dropped: {err}", filter.id)),
        }
    }
    next.filters = kept_filters;

    if let Some(fields) = next.interaction_config.tooltip.fields_to_show.remove(old_id) {
        let (known, unknown): (Vec<String>, Vec<String>) =
            fields.into_iter().partition(|field| dataset.has_field(field));
        for field in unknown {
            validation_dropped(
                diagnostics,
                format!("tooltip field '{field}' does not exist in dataset '{new_id}'"),
            );
        }
        next.interaction_config
            .tooltip
            .fields_to_show
            .insert(new_id.clone(), known);
    }

    next.refilter(&new_id);
    Ok(())
}

/// Removes dataset `data_id` with everything bound to it. For a dataset that
/// never arrived, only its pending entities are discarded.
pub fn remove_dataset(
    state: &Arc<VisState>,
    data_id: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Arc<VisState>, PayloadError> {
    if let Err(err) = dataset_of(state, data_id) {
        let mut next = (**state).clone();
        drop_pending_for_dataset(&mut next, data_id, diagnostics);
        if next.pending == state.pending {
            return Err(err);
        }
        return Ok(Arc::new(next));
    }
    let mut next = (**state).clone();
    next.datasets.remove(data_id);
    let layer_ids: Vec<String> = next
        .layers
        .iter()
        .filter(|layer| layer.data_id() == data_id)
        .map(|layer| layer.id.clone())
        .collect();
    for id in layer_ids {
        next.drop_layer(&id);
    }
    next.filters.retain(|filter| filter.data_id != data_id);
    next.interaction_config.tooltip.fields_to_show.remove(data_id);
    drop_pending_for_dataset(&mut next, data_id, diagnostics);
    Ok(Arc::new(next))
}

/// Adds a layer, from a saved layer config or blank, on top of the stack.
pub fn add_layer(
    state: &Arc<VisState>,
    data_id: Option<&str>,
    config: Option<&SavedLayer>,
    diagnostics: &mut Diagnostics,
) -> Result<Arc<VisState>, PayloadError> {
    let mut next = (**state).clone();
    let data_id = match data_id.or_else(|| config.and_then(|saved| saved.config.data_id.as_deref())) {
        Some(data_id) => data_id.to_string(),
        None => next
            .datasets
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| PayloadError::UnknownDataset(String::new()))?,
    };
    let dataset = dataset_of(&next, &data_id)?;

    let id = match config {
        Some(saved) => {
            if next.layer(&saved.id).is_some() {
                return Err(PayloadError::LayerExists(saved.id.clone()));
            }
            let layer = layer_from_saved(saved, &data_id, next.layers.len())?;
            layer.validate_columns(&dataset)?;
            next.push_layer(layer);
            saved.id.clone()
        }
        None => {
            let id = next.take_id("layer");
            let layer = empty_layer(id.clone(), &dataset, next.layers.len());
            next.push_layer(layer);
            id
        }
    };

    next.layer_order.retain(|layer_id| *layer_id != id);
    next.layer_order.insert(0, id);
    resolve_pending(&mut next, diagnostics);
    Ok(Arc::new(next))
}

pub fn remove_layer(state: &Arc<VisState>, id: &str) -> Result<Arc<VisState>, PayloadError> {
    state.layer(id).ok_or_else(|| unknown_layer(id))?;
    let mut next = (**state).clone();
    next.drop_layer(id);
    Ok(Arc::new(next))
}

/// The copy is drawn directly above the original.
pub fn duplicate_layer(state: &Arc<VisState>, id: &str) -> Result<Arc<VisState>, PayloadError> {
    let original = state.layer(id).ok_or_else(|| unknown_layer(id))?.clone();
    let mut next = (**state).clone();
    let copy_id = next.take_id(&format!("{id}-copy"));
    let mut copy = original.clone();
    copy.id = copy_id.clone();
    copy.config.label = format!("Copy of {}", original.config.label);
    next.push_layer(copy);

    next.layer_order.retain(|layer_id| *layer_id != copy_id);
    let at = next
        .layer_order
        .iter()
        .position(|layer_id| layer_id == id)
        .unwrap_or(0);
    next.layer_order.insert(at, copy_id);
    Ok(Arc::new(next))
}

pub fn reorder_layer(state: &Arc<VisState>, order: &[String]) -> Result<Arc<VisState>, PayloadError> {
    let wanted: BTreeSet<&String> = order.iter().collect();
    let current: BTreeSet<&String> = state.layer_order.iter().collect();
    if wanted.len() != order.len() || wanted != current {
        return Err(PayloadError::InvalidLayerOrder);
    }
    if state.layer_order == order {
        return Ok(Arc::clone(state));
    }
    let mut next = (**state).clone();
    next.layer_order = order.to_vec();
    Ok(Arc::new(next))
}

pub fn layer_config_change(
    state: &Arc<VisState>,
    id: &str,
    patch: &LayerConfigPatch,
) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.layer_index(id).ok_or_else(|| unknown_layer(id))?;
    let current = &state.layers[idx];
    let config = current.config.patched(patch);
    if config == current.config {
        return Ok(Arc::clone(state));
    }

    let remaps_data = patch.data_id.is_some()
        || patch.columns.is_some()
        || patch.color_field.is_some()
        || patch.size_field.is_some();
    let mut layer = current.clone();
    layer.config = config;
    if remaps_data {
        let dataset = dataset_of(state, layer.data_id())?;
        layer.validate_columns(&dataset)?;
    }

    let mut next = (**state).clone();
    next.layers[idx] = layer;
    Ok(Arc::new(next))
}

pub fn layer_type_change(
    state: &Arc<VisState>,
    id: &str,
    layer_type: LayerType,
) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.layer_index(id).ok_or_else(|| unknown_layer(id))?;
    if state.layers[idx].layer_type == layer_type {
        return Ok(Arc::clone(state));
    }
    let layer = state.layers[idx].with_type(layer_type)?;
    let mut next = (**state).clone();
    next.layers[idx] = layer;
    Ok(Arc::new(next))
}

pub fn layer_vis_config_change(
    state: &Arc<VisState>,
    id: &str,
    patch: &LayerVisConfigPatch,
) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.layer_index(id).ok_or_else(|| unknown_layer(id))?;
    let vis_config = state.layers[idx].config.vis_config.patched(patch);
    if vis_config == state.layers[idx].config.vis_config {
        return Ok(Arc::clone(state));
    }
    let mut next = (**state).clone();
    next.layers[idx].config.vis_config = vis_config;
    Ok(Arc::new(next))
}

pub fn toggle_layer_for_map(
    state: &Arc<VisState>,
    map_index: usize,
    layer_id: &str,
) -> Result<Arc<VisState>, PayloadError> {
    let layer = state.layer(layer_id).ok_or_else(|| unknown_layer(layer_id))?;
    let split = state
        .split_maps
        .get(map_index)
        .ok_or(PayloadError::SplitMapIndex(map_index))?;
    let visible = split
        .layers
        .get(layer_id)
        .copied()
        .unwrap_or(layer.config.is_visible);
    let mut next = (**state).clone();
    next.split_maps[map_index]
        .layers
        .insert(layer_id.to_string(), !visible);
    Ok(Arc::new(next))
}

pub fn set_layer_blending(state: &Arc<VisState>, blending: LayerBlending) -> Arc<VisState> {
    if state.layer_blending == blending {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.layer_blending = blending;
    Arc::new(next)
}

pub fn add_filter(state: &Arc<VisState>, data_id: &str) -> Result<Arc<VisState>, PayloadError> {
    dataset_of(state, data_id)?;
    let mut next = (**state).clone();
    let id = next.take_id("filter");
    next.filters.push(Filter::unbound(id, data_id));
    Ok(Arc::new(next))
}

pub fn remove_filter(state: &Arc<VisState>, id: &str) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.filter_index(id).ok_or_else(|| unknown_filter(id))?;
    let mut next = (**state).clone();
    let removed = next.filters.remove(idx);
    next.refilter(&removed.data_id);
    Ok(Arc::new(next))
}

pub fn set_filter_field(
    state: &Arc<VisState>,
    id: &str,
    field: &str,
) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.filter_index(id).ok_or_else(|| unknown_filter(id))?;
    let current = &state.filters[idx];
    if current.name == field {
        return Ok(Arc::clone(state));
    }
    let dataset = dataset_of(state, &current.data_id)?;
    let rebound = Filter::for_field(id.to_string(), &dataset, field)?;
    let mut next = (**state).clone();
    next.filters[idx] = Filter {
        enlarged: current.enlarged,
        is_animating: current.is_animating,
        speed: current.speed,
        ..rebound
    };
    next.refilter(&dataset.id);
    Ok(Arc::new(next))
}

pub fn set_filter_value(
    state: &Arc<VisState>,
    id: &str,
    value: &FilterValue,
) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.filter_index(id).ok_or_else(|| unknown_filter(id))?;
    let updated = state.filters[idx].with_value(value.clone())?;
    if updated == state.filters[idx] {
        return Ok(Arc::clone(state));
    }
    let mut next = (**state).clone();
    let data_id = updated.data_id.clone();
    next.filters[idx] = updated;
    next.refilter(&data_id);
    Ok(Arc::new(next))
}

fn update_filter(
    state: &Arc<VisState>,
    id: &str,
    update: impl FnOnce(&mut Filter),
) -> Result<Arc<VisState>, PayloadError> {
    let idx = state.filter_index(id).ok_or_else(|| unknown_filter(id))?;
    let mut next = (**state).clone();
    update(&mut next.filters[idx]);
    Ok(Arc::new(next))
}

pub fn enlarge_filter(state: &Arc<VisState>, id: &str) -> Result<Arc<VisState>, PayloadError> {
    update_filter(state, id, |filter| filter.enlarged = !filter.enlarged)
}

pub fn toggle_filter_animation(state: &Arc<VisState>, id: &str) -> Result<Arc<VisState>, PayloadError> {
    update_filter(state, id, |filter| filter.is_animating = !filter.is_animating)
}

pub fn update_animation_speed(
    state: &Arc<VisState>,
    id: &str,
    speed: f64,
) -> Result<Arc<VisState>, PayloadError> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(PayloadError::InvalidFilterValue(id.to_string()));
    }
    update_filter(state, id, |filter| filter.speed = speed)
}

pub fn interaction_config_change(
    state: &Arc<VisState>,
    config: &SavedInteractionConfig,
    diagnostics: &mut Diagnostics,
) -> Arc<VisState> {
    let mut next = (**state).clone();
    let mode = next.merge_mode;
    merge_interaction_config(&mut next, config, mode, diagnostics);
    next.pending.seal_batch();
    if next.interaction_config == state.interaction_config && next.pending == state.pending {
        return Arc::clone(state);
    }
    Arc::new(next)
}

pub fn set_map_info(state: &Arc<VisState>, info: &MapInfo) -> Arc<VisState> {
    if state.map_info == *info {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.map_info = info.clone();
    Arc::new(next)
}

pub fn layer_hover(state: &Arc<VisState>, info: Option<&HoverInfo>) -> Arc<VisState> {
    if state.hovered.as_ref() == info {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.hovered = info.cloned();
    Arc::new(next)
}

/// Clicking the same object again clears the selection.
pub fn layer_click(state: &Arc<VisState>, info: Option<&HoverInfo>) -> Arc<VisState> {
    let clicked = match info {
        Some(info) if state.clicked.as_ref() == Some(info) => None,
        other => other.cloned(),
    };
    if state.clicked == clicked {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.clicked = clicked;
    Arc::new(next)
}

/// Splitting gives each of the two panes every layer at its current
/// visibility. Merging back adopts the visibility of pane `index` when given.
pub fn toggle_split_map(state: &Arc<VisState>, index: Option<usize>) -> Arc<VisState> {
    let mut next = (**state).clone();
    if next.is_split() {
        if let Some(kept) = index.and_then(|index| next.split_maps.get(index).cloned()) {
            for layer in &mut next.layers {
                if let Some(visible) = kept.layers.get(&layer.id) {
                    layer.config.is_visible = *visible;
                }
            }
        }
        next.split_maps.clear();
    } else {
        let pane = SplitMap {
            layers: next
                .layers
                .iter()
                .map(|layer| (layer.id.clone(), layer.config.is_visible))
                .collect(),
        };
        next.split_maps = vec![pane.clone(), pane];
    }
    Arc::new(next)
}
