//! Folding a saved configuration into vis-state.
//!
//! Incoming entities are partitioned by the dataset they reference. Entities
//! whose dataset is loaded are matched by identity and merged; the rest wait
//! in `VisState::pending` together with the mode they arrived with, and are
//! merged when their dataset shows up.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::dataset::Dataset;
use super::diagnostics::DiagnosticKind;
use super::diagnostics::Diagnostics;
use super::error::PayloadError;
use super::filter::Filter;
use super::layer::layer_color;
use super::layer::Layer;
use super::layer::LayerConfig;
use super::layer::LayerVisConfig;
use super::root::SliceKey;
use super::saved::FilterIdentity;
use super::saved::SavedFilter;
use super::saved::SavedInteractionConfig;
use super::saved::SavedLayer;
use super::saved::SavedSplitMap;
use super::saved::SavedTooltip;
use super::saved::SavedVisState;
use super::slices::vis_state::Pending;
use super::slices::vis_state::PendingConfig;
use super::slices::vis_state::PendingSplitLayer;
use super::slices::vis_state::SplitMap;
use super::slices::vis_state::VisState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Matched entities are merged field by field; unmatched existing ones stay.
    #[default]
    Merge,
    /// Matched entities are superseded; unmatched existing entities of the
    /// same dataset are removed.
    Replace,
}

impl MergeMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Replace => "replace",
        }
    }
}

/// Merges `saved` into `state`. An empty config returns `state` itself.
pub fn merge_vis_config(
    state: &Arc<VisState>,
    saved: &SavedVisState,
    mode: MergeMode,
    diagnostics: &mut Diagnostics,
) -> Arc<VisState> {
    if saved.is_empty() {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    merge_into(&mut next, saved, mode, diagnostics);
    Arc::new(next)
}

pub(crate) fn merge_into(
    next: &mut VisState,
    saved: &SavedVisState,
    mode: MergeMode,
    diagnostics: &mut Diagnostics,
) {
    tracing::debug!(
        mode = mode.label(),
        layers = saved.layers.len(),
        filters = saved.filters.len(),
        "merging vis config"
    );
    merge_layers(next, &saved.layers, mode, diagnostics);
    merge_filters(next, &saved.filters, mode, diagnostics);
    if let Some(config) = &saved.interaction_config {
        merge_interaction_config(next, config, mode, diagnostics);
    }
    if let Some(blending) = saved.layer_blending {
        next.layer_blending = blending;
    }
    if let Some(split_maps) = &saved.split_maps {
        merge_split_maps(next, split_maps, mode);
    }
    resolve_split_layers(next);
    next.pending.seal_batch();
}

fn conflict(diagnostics: &mut Diagnostics, what: &str, identity: impl std::fmt::Display) {
    diagnostics.warn(
        SliceKey::VisState,
        DiagnosticKind::MergeConflict,
        format!("{what} '{identity}' appears more than once; keeping the last one"),
    );
}

/// Keeps the last entity per identity, in the order the survivors arrived.
fn last_writer_wins<'a, T, K: Ord + Clone + std::fmt::Display>(
    incoming: &'a [T],
    identity: impl Fn(&T) -> K,
    what: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<&'a T> {
    let mut kept: Vec<(K, &T)> = Vec::new();
    for entity in incoming {
        let key = identity(entity);
        if let Some(pos) = kept.iter().position(|(seen, _)| *seen == key) {
            conflict(diagnostics, what, &key);
            kept.remove(pos);
        }
        kept.push((key, entity));
    }
    kept.into_iter().map(|(_, entity)| entity).collect()
}

impl std::fmt::Display for FilterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::Field { data_id, name } => write!(f, "{data_id}.{name}"),
        }
    }
}

pub(crate) fn layer_from_saved(
    saved: &SavedLayer,
    data_id: &str,
    color_slot: usize,
) -> Result<Layer, PayloadError> {
    let layer_type = saved.layer_type.ok_or_else(|| PayloadError::IncompatibleLayerType {
        layer_id: saved.id.clone(),
        layer_type: "unspecified".to_string(),
    })?;
    let base = LayerConfig {
        data_id: data_id.to_string(),
        label: saved.id.clone(),
        color: layer_color(color_slot),
        columns: BTreeMap::new(),
        is_visible: true,
        vis_config: LayerVisConfig::default(),
        color_field: None,
        size_field: None,
    };
    let mut config = base.patched(&saved.config);
    config.data_id = data_id.to_string();
    Ok(Layer {
        id: saved.id.clone(),
        layer_type,
        config,
    })
}

fn merge_layers(
    next: &mut VisState,
    incoming: &[SavedLayer],
    mode: MergeMode,
    diagnostics: &mut Diagnostics,
) {
    let batch = last_writer_wins(incoming, |layer| layer.id.clone(), "layer", diagnostics);
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for saved in batch {
        let existing = next.layer_index(&saved.id);
        let data_id = saved
            .config
            .data_id
            .clone()
            .or_else(|| existing.map(|idx| next.layers[idx].config.data_id.clone()));
        let Some(data_id) = data_id else {
            diagnostics.warn(
                SliceKey::VisState,
                DiagnosticKind::InvalidPayload,
                format!("layer '{}' names no dataset", saved.id),
            );
            continue;
        };
        let Some(dataset) = next.datasets.get(&data_id).cloned() else {
            next.pending.push_layer(Pending {
                data_id,
                mode,
                batch: next.pending.open_batch,
                entity: saved.clone(),
            });
            continue;
        };
        groups
            .entry(data_id.clone())
            .or_default()
            .insert(saved.id.clone());

        let candidate = match (existing, mode) {
            (Some(idx), MergeMode::Merge) => {
                let current = &next.layers[idx];
                Ok(Layer {
                    id: current.id.clone(),
                    layer_type: saved.layer_type.unwrap_or(current.layer_type),
                    config: current.config.patched(&saved.config),
                })
            }
            _ => layer_from_saved(saved, &data_id, next.layers.len()),
        };
        match candidate.and_then(|layer| layer.validate_columns(&dataset).map(|()| layer)) {
            Ok(layer) => match existing {
                Some(idx) => next.layers[idx] = layer,
                None => next.push_layer(layer),
            },
            Err(err) => diagnostics.warn(
                SliceKey::VisState,
                DiagnosticKind::ValidationDropped,
                format!("layer '{}' dropped: {err}", saved.id),
            ),
        }
    }

    if mode == MergeMode::Replace {
        let stale: Vec<String> = next
            .layers
            .iter()
            .filter(|layer| {
                groups
                    .get(layer.data_id())
                    .is_some_and(|kept| !kept.contains(&layer.id))
            })
            .map(|layer| layer.id.clone())
            .collect();
        for id in stale {
            next.drop_layer(&id);
        }
    }
}

fn apply_saved_filter(
    mut filter: Filter,
    saved: &SavedFilter,
    dataset: &Dataset,
) -> Result<Filter, PayloadError> {
    if let Some(name) = saved.name.as_deref().filter(|name| *name != filter.name) {
        let rebound = Filter::for_field(filter.id.clone(), dataset, name)?;
        filter = Filter {
            enlarged: filter.enlarged,
            is_animating: filter.is_animating,
            speed: filter.speed,
            ..rebound
        };
    }
    if let Some(value) = &saved.value {
        filter = filter.with_value(value.clone())?;
    }
    if let Some(enlarged) = saved.enlarged {
        filter.enlarged = enlarged;
    }
    if let Some(is_animating) = saved.is_animating {
        filter.is_animating = is_animating;
    }
    if let Some(speed) = saved.speed.filter(|speed| speed.is_finite() && *speed > 0.0) {
        filter.speed = speed;
    }
    Ok(filter)
}

fn merge_filters(
    next: &mut VisState,
    incoming: &[SavedFilter],
    mode: MergeMode,
    diagnostics: &mut Diagnostics,
) {
    let batch = last_writer_wins(incoming, SavedFilter::identity, "filter", diagnostics);
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for saved in batch {
        let Some(dataset) = next.datasets.get(&saved.data_id).cloned() else {
            next.pending.push_filter(Pending {
                data_id: saved.data_id.clone(),
                mode,
                batch: next.pending.open_batch,
                entity: saved.clone(),
            });
            continue;
        };
        let existing = match saved.identity() {
            FilterIdentity::Id(id) => next.filter_index(&id),
            FilterIdentity::Field { data_id, name } => next
                .filters
                .iter()
                .position(|filter| filter.data_id == data_id && filter.name == name),
        };

        let candidate = match (existing, mode) {
            (Some(idx), MergeMode::Merge) => apply_saved_filter(next.filters[idx].clone(), saved, &dataset),
            _ => {
                let id = match (&saved.id, existing) {
                    (Some(id), _) => id.clone(),
                    (None, Some(idx)) => next.filters[idx].id.clone(),
                    (None, None) => next.derive_id(&format!(
                        "{}-{}",
                        saved.data_id,
                        saved.name.as_deref().unwrap_or("filter")
                    )),
                };
                match saved.name.as_deref() {
                    Some(name) => Filter::for_field(id, &dataset, name)
                        .and_then(|filter| apply_saved_filter(filter, saved, &dataset)),
                    None => Err(PayloadError::UnknownField {
                        data_id: saved.data_id.clone(),
                        field: String::new(),
                    }),
                }
            }
        };

        match candidate {
            Ok(filter) => {
                groups
                    .entry(filter.data_id.clone())
                    .or_default()
                    .insert(filter.id.clone());
                match existing {
                    Some(idx) => next.filters[idx] = filter,
                    None => next.filters.push(filter),
                }
            }
            Err(err) => {
                if let Some(idx) = existing {
                    groups
                        .entry(saved.data_id.clone())
                        .or_default()
                        .insert(next.filters[idx].id.clone());
                }
                diagnostics.warn(
                    SliceKey::VisState,
                    DiagnosticKind::ValidationDropped,
                    format!("filter '{}' dropped: {err}", saved.identity()),
                );
            }
        }
        groups.entry(saved.data_id.clone()).or_default();
    }

    if mode == MergeMode::Replace {
        next.filters.retain(|filter| {
            groups
                .get(&filter.data_id)
                .map_or(true, |kept| kept.contains(&filter.id))
        });
    }
    for data_id in groups.keys() {
        next.refilter(data_id);
    }
}

fn merge_tooltip(
    next: &mut VisState,
    tooltip: &SavedTooltip,
    mode: MergeMode,
    diagnostics: &mut Diagnostics,
) {
    if let Some(enabled) = tooltip.enabled {
        next.interaction_config.tooltip.enabled = enabled;
    }
    if let Some(compare_mode) = tooltip.compare_mode {
        next.interaction_config.tooltip.compare_mode = compare_mode;
    }
    for (data_id, fields) in &tooltip.fields_to_show {
        let Some(dataset) = next.datasets.get(data_id).cloned() else {
            next.pending.push_tooltip(Pending {
                data_id: data_id.clone(),
                mode,
                batch: next.pending.open_batch,
                entity: fields.clone(),
            });
            continue;
        };
        let (known, unknown): (Vec<&String>, Vec<&String>) =
            fields.iter().partition(|field| dataset.has_field(field));
        for field in unknown {
            diagnostics.warn(
                SliceKey::VisState,
                DiagnosticKind::ValidationDropped,
                format!("tooltip field '{field}' does not exist in dataset '{data_id}'"),
            );
        }
        let shown = next
            .interaction_config
            .tooltip
            .fields_to_show
            .entry(data_id.clone())
            .or_default();
        match mode {
            MergeMode::Merge => {
                for field in known {
                    if !shown.contains(field) {
                        shown.push(field.clone());
                    }
                }
            }
            MergeMode::Replace => *shown = known.into_iter().cloned().collect(),
        }
    }
}

pub(crate) fn merge_interaction_config(
    next: &mut VisState,
    saved: &SavedInteractionConfig,
    mode: MergeMode,
    diagnostics: &mut Diagnostics,
) {
    if let Some(tooltip) = &saved.tooltip {
        merge_tooltip(next, tooltip, mode, diagnostics);
    }
    if let Some(brush) = &saved.brush {
        if let Some(enabled) = brush.enabled {
            next.interaction_config.brush.enabled = enabled;
        }
        if let Some(size) = brush.size.filter(|size| size.is_finite() && *size > 0.0) {
            next.interaction_config.brush.size = size;
        }
    }
    if let Some(enabled) = saved.geocoder.as_ref().and_then(|toggle| toggle.enabled) {
        next.interaction_config.geocoder = enabled;
    }
    if let Some(enabled) = saved.coordinate.as_ref().and_then(|toggle| toggle.enabled) {
        next.interaction_config.coordinate = enabled;
    }
}

fn default_split_map(next: &VisState) -> SplitMap {
    SplitMap {
        layers: next
            .layers
            .iter()
            .map(|layer| (layer.id.clone(), layer.config.is_visible))
            .collect(),
    }
}

fn merge_split_maps(next: &mut VisState, saved: &[SavedSplitMap], mode: MergeMode) {
    let template = default_split_map(next);
    next.split_maps.resize(saved.len(), template.clone());
    for (map_index, saved_map) in saved.iter().enumerate() {
        if mode == MergeMode::Replace {
            next.split_maps[map_index] = template.clone();
        }
        for (layer_id, visible) in &saved_map.layers {
            if next.layer(layer_id).is_some() {
                next.split_maps[map_index]
                    .layers
                    .insert(layer_id.clone(), *visible);
            } else {
                next.pending.push_split_layer(PendingSplitLayer {
                    map_index,
                    layer_id: layer_id.clone(),
                    visible: *visible,
                });
            }
        }
    }
}

fn resolve_split_layers(next: &mut VisState) {
    if next.pending.split_layers.is_empty() {
        return;
    }
    let queued = std::mem::take(&mut next.pending.split_layers);
    for pending in queued {
        let ready = next.layer(&pending.layer_id).is_some()
            && pending.map_index < next.split_maps.len();
        if ready {
            next.split_maps[pending.map_index]
                .layers
                .insert(pending.layer_id, pending.visible);
        } else {
            next.pending.split_layers.push(pending);
        }
    }
}

/// Merges every pending entity whose dataset is now loaded.
///
/// Batches replay oldest first, each with the mode it arrived in, so the
/// result matches merging the same configs after the data was loaded.
pub(crate) fn resolve_pending(next: &mut VisState, diagnostics: &mut Diagnostics) {
    let datasets = &next.datasets;
    let (layers, waiting_layers): (Vec<_>, Vec<_>) = next
        .pending
        .layers
        .drain(..)
        .partition(|pending| datasets.contains_key(&pending.data_id));
    let (filters, waiting_filters): (Vec<_>, Vec<_>) = next
        .pending
        .filters
        .drain(..)
        .partition(|pending| datasets.contains_key(&pending.data_id));
    let (tooltips, waiting_tooltips): (Vec<_>, Vec<_>) = next
        .pending
        .tooltips
        .drain(..)
        .partition(|pending| datasets.contains_key(&pending.data_id));
    next.pending.layers = waiting_layers;
    next.pending.filters = waiting_filters;
    next.pending.tooltips = waiting_tooltips;

    let ready = PendingConfig {
        layers,
        filters,
        tooltips,
        ..PendingConfig::default()
    };
    for batch in ready.batches() {
        let mode = ready
            .layers
            .iter()
            .map(|pending| (pending.batch, pending.mode))
            .chain(ready.filters.iter().map(|pending| (pending.batch, pending.mode)))
            .chain(ready.tooltips.iter().map(|pending| (pending.batch, pending.mode)))
            .find_map(|(seen, mode)| (seen == batch).then_some(mode))
            .unwrap_or_default();
        let saved = SavedVisState {
            layers: ready
                .layers
                .iter()
                .filter(|pending| pending.batch == batch)
                .map(|pending| {
                    let mut layer = pending.entity.clone();
                    layer.config.data_id = Some(pending.data_id.clone());
                    layer
                })
                .collect(),
            filters: ready
                .filters
                .iter()
                .filter(|pending| pending.batch == batch)
                .map(|pending| pending.entity.clone())
                .collect(),
            interaction_config: {
                let fields_to_show: BTreeMap<String, Vec<String>> = ready
                    .tooltips
                    .iter()
                    .filter(|pending| pending.batch == batch)
                    .map(|pending| (pending.data_id.clone(), pending.entity.clone()))
                    .collect();
                (!fields_to_show.is_empty()).then(|| SavedInteractionConfig {
                    tooltip: Some(SavedTooltip {
                        fields_to_show,
                        ..SavedTooltip::default()
                    }),
                    ..SavedInteractionConfig::default()
                })
            },
            layer_blending: None,
            split_maps: None,
        };
        tracing::debug!(batch, mode = mode.label(), "resolving pending entities");
        merge_into(next, &saved, mode, diagnostics);
    }
    resolve_split_layers(next);
}

/// Discards pending entities that reference `data_id`.
pub(crate) fn drop_pending_for_dataset(
    next: &mut VisState,
    data_id: &str,
    diagnostics: &mut Diagnostics,
) {
    let before = next.pending.len();
    next.pending.layers.retain(|pending| pending.data_id != data_id);
    next.pending.filters.retain(|pending| pending.data_id != data_id);
    next.pending.tooltips.retain(|pending| pending.data_id != data_id);
    let dropped = before - next.pending.len();
    if dropped > 0 {
        diagnostics.warn(
            SliceKey::VisState,
            DiagnosticKind::PendingDropped,
            format!("dropped {dropped} pending entities for removed dataset '{data_id}'"),
        );
    }
}
