use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::dataset::Bounds;
use super::dataset::Dataset;
use super::filter::Filter;
use super::layer::Layer;
use super::root::RootState;
use super::slices::map_state::MapState;
use super::slices::vis_state::VisState;

/// Memo inputs compared by identity rather than by value.
pub trait MemoInputs: Clone {
    fn same(&self, other: &Self) -> bool;
}

impl<T: ?Sized> MemoInputs for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl MemoInputs for String {
    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

impl<A: MemoInputs, B: MemoInputs> MemoInputs for (A, B) {
    fn same(&self, other: &Self) -> bool {
        self.0.same(&other.0) && self.1.same(&other.1)
    }
}

struct MemoCache<I, T> {
    last: Option<(I, Arc<T>)>,
    recomputations: usize,
}

/// Single-entry cache for a derived value.
///
/// The cached value is reused while every input is pointer-identical to the
/// one it was computed from. The inputs are retained, so a freed slice can
/// never alias a later one.
pub struct Memo<I, T> {
    cache: Mutex<MemoCache<I, T>>,
}

impl<I, T> Default for Memo<I, T> {
    fn default() -> Self {
        Self {
            cache: Mutex::new(MemoCache {
                last: None,
                recomputations: 0,
            }),
        }
    }
}

impl<I: MemoInputs, T> Memo<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, inputs: I, compute: impl FnOnce(&I) -> T) -> Arc<T> {
        {
            let cache = self.cache.lock();
            if let Some((last, value)) = cache.last.as_ref() {
                if last.same(&inputs) {
                    return Arc::clone(value);
                }
            }
        }

        let value = Arc::new(compute(&inputs));
        let mut cache = self.cache.lock();
        cache.recomputations += 1;
        cache.last = Some((inputs, Arc::clone(&value)));
        value
    }

    pub fn recomputations(&self) -> usize {
        self.cache.lock().recomputations
    }
}

/// Memoized views over a root, meant to be kept alongside a store and asked
/// again after every dispatch.
#[derive(Default)]
pub struct Selectors {
    layer_order: Memo<Arc<VisState>, Vec<Layer>>,
    visible_layers: Memo<Arc<VisState>, Vec<Layer>>,
    visible_layers_in_viewport: Memo<(Arc<VisState>, Arc<MapState>), Vec<Layer>>,
    active_filters: Memo<(Arc<VisState>, String), Vec<Filter>>,
    dataset_bounds: Memo<Arc<VisState>, BTreeMap<String, Bounds>>,
    filtered_row_count: Memo<(Arc<VisState>, String), usize>,
}

impl Selectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers in draw order, top first.
    pub fn layer_order(&self, root: &RootState) -> Arc<Vec<Layer>> {
        self.layer_order
            .get(Arc::clone(root.vis_state()), |vis| ordered_layers(vis).cloned().collect())
    }

    pub fn visible_layers(&self, root: &RootState) -> Arc<Vec<Layer>> {
        self.visible_layers.get(Arc::clone(root.vis_state()), |vis| {
            ordered_layers(vis)
                .filter(|layer| layer.is_visible())
                .cloned()
                .collect()
        })
    }

    /// Visible layers whose data overlaps the part of the map on screen.
    pub fn visible_layers_in_viewport(&self, root: &RootState) -> Arc<Vec<Layer>> {
        let inputs = (Arc::clone(root.vis_state()), Arc::clone(root.map_state()));
        self.visible_layers_in_viewport.get(inputs, |(vis, map)| {
            let viewport = map.visible_bounds();
            ordered_layers(vis)
                .filter(|layer| layer.is_visible())
                .filter(|layer| {
                    vis.datasets
                        .get(layer.data_id())
                        .and_then(|dataset| layer.bounds(dataset))
                        .is_some_and(|bounds| bounds.intersects(viewport))
                })
                .cloned()
                .collect()
        })
    }

    pub fn active_filters(&self, root: &RootState, data_id: &str) -> Arc<Vec<Filter>> {
        let inputs = (Arc::clone(root.vis_state()), data_id.to_string());
        self.active_filters.get(inputs, |(vis, data_id)| {
            vis.filters
                .iter()
                .filter(|filter| filter.data_id == *data_id && filter.is_active())
                .cloned()
                .collect()
        })
    }

    /// Bounds of every dataset that has at least one layer placing its rows.
    pub fn dataset_bounds(&self, root: &RootState) -> Arc<BTreeMap<String, Bounds>> {
        self.dataset_bounds.get(Arc::clone(root.vis_state()), |vis| {
            let mut bounds: BTreeMap<String, Bounds> = BTreeMap::new();
            for layer in &vis.layers {
                let Some(dataset) = vis.datasets.get(layer.data_id()) else {
                    continue;
                };
                let Some(layer_bounds) = layer.bounds(dataset) else {
                    continue;
                };
                bounds
                    .entry(dataset.id.clone())
                    .and_modify(|known| *known = known.union(layer_bounds))
                    .or_insert(layer_bounds);
            }
            bounds
        })
    }

    /// Rows of `data_id` passing its filters; zero when it is not loaded.
    pub fn filtered_row_count(&self, root: &RootState, data_id: &str) -> usize {
        let inputs = (Arc::clone(root.vis_state()), data_id.to_string());
        *self.filtered_row_count.get(inputs, |(vis, data_id)| {
            vis.dataset(data_id)
                .map_or(0, |dataset| dataset.filtered_index.len())
        })
    }
}

fn ordered_layers(vis: &VisState) -> impl Iterator<Item = &Layer> {
    vis.layer_order.iter().filter_map(|id| vis.layer(id))
}

pub fn dataset<'a>(root: &'a RootState, data_id: &str) -> Option<&'a Arc<Dataset>> {
    root.vis_state().dataset(data_id)
}

pub fn layers_for_dataset<'a>(root: &'a RootState, data_id: &str) -> Vec<&'a Layer> {
    root.vis_state()
        .layers
        .iter()
        .filter(|layer| layer.data_id() == data_id)
        .collect()
}

pub fn pending_filter_count(root: &RootState) -> usize {
    root.vis_state().pending.filters.len()
}

pub fn is_split(root: &RootState) -> bool {
    root.map_state().is_split
}

pub fn is_read_only(root: &RootState) -> bool {
    root.ui_state().read_only
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::actions::Action;
    use crate::actions::AddDataToMapPayload;
    use crate::actions::MapStateAction;
    use crate::actions::ViewportPatch;
    use crate::actions::VisStateAction;
    use crate::config::CoreConfig;
    use crate::dataset::DatasetPayload;
    use crate::dataset::FieldPayload;
    use crate::dataset::FieldType;
    use crate::reducer::CompositionBuilder;
    use crate::reducer::CoreReducer;

    fn core() -> CoreReducer {
        CompositionBuilder::new(CoreConfig::default()).build()
    }

    fn stations(id: &str) -> DatasetPayload {
        DatasetPayload {
            id: id.to_string(),
            label: None,
            color: None,
            fields: vec![
                FieldPayload::new("lat", FieldType::Real),
                FieldPayload::new("lng", FieldType::Real),
                FieldPayload::new("docks", FieldType::Integer),
            ],
            rows: vec![
                vec![json!(37.77), json!(-122.42), json!(12)],
                vec![json!(37.79), json!(-122.40), json!(20)],
            ],
        }
    }

    fn loaded(core: &CoreReducer) -> RootState {
        let action = Action::AddDataToMap(AddDataToMapPayload {
            datasets: vec![stations("bikes")],
            ..AddDataToMapPayload::default()
        });
        core.reduce(&core.initial_state(), &action).root
    }

    fn pan_to(latitude: f64, longitude: f64) -> Action {
        Action::MapState(MapStateAction::UpdateMap {
            viewport: ViewportPatch {
                latitude: Some(latitude),
                longitude: Some(longitude),
                ..ViewportPatch::default()
            },
            map_index: None,
        })
    }

    #[test]
    fn unchanged_inputs_reuse_the_cached_value() {
        let core = core();
        let root = loaded(&core);
        let selectors = Selectors::new();

        let first = selectors.layer_order(&root);
        let second = selectors.layer_order(&root);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(selectors.layer_order.recomputations(), 1);

        let panned = core.reduce(&root, &pan_to(37.78, -122.41)).root;
        selectors.layer_order(&panned);
        selectors.visible_layers_in_viewport(&root);
        selectors.visible_layers_in_viewport(&panned);
        assert_eq!(selectors.layer_order.recomputations(), 1);
        assert_eq!(selectors.visible_layers_in_viewport.recomputations(), 2);
    }

    #[test]
    fn viewport_selection_follows_the_map() {
        let core = core();
        let root = loaded(&core);
        let selectors = Selectors::new();
        assert_eq!(selectors.visible_layers_in_viewport(&root).len(), 1);

        let london = core.reduce(&root, &pan_to(51.5, -0.12)).root;
        assert!(selectors.visible_layers_in_viewport(&london).is_empty());
        assert_eq!(selectors.visible_layers(&london).len(), 1);
    }

    #[test]
    fn hidden_layers_are_not_visible() {
        let core = core();
        let root = loaded(&core);
        let hidden = core
            .reduce(
                &root,
                &Action::VisState(VisStateAction::LayerConfigChange {
                    id: "bikes-point".to_string(),
                    patch: crate::layer::LayerConfigPatch {
                        is_visible: Some(false),
                        ..Default::default()
                    },
                }),
            )
            .root;
        let selectors = Selectors::new();
        assert_eq!(selectors.layer_order(&hidden).len(), 1);
        assert!(selectors.visible_layers(&hidden).is_empty());
    }

    #[test]
    fn per_dataset_selectors_recompute_when_the_id_changes() {
        let core = core();
        let root = loaded(&core);
        let selectors = Selectors::new();

        assert_eq!(selectors.filtered_row_count(&root, "bikes"), 2);
        assert_eq!(selectors.filtered_row_count(&root, "bikes"), 2);
        assert_eq!(selectors.filtered_row_count(&root, "scooters"), 0);
        assert_eq!(selectors.filtered_row_count.recomputations(), 2);
        assert!(selectors.active_filters(&root, "bikes").is_empty());

        let bounds = selectors.dataset_bounds(&root);
        let bikes = bounds.get("bikes").expect("bounded");
        assert_eq!(bikes.min_lat, 37.77);
        assert_eq!(bikes.max_lng, -122.40);
    }

    #[test]
    fn plain_readers() {
        let core = core();
        let root = loaded(&core);
        assert!(dataset(&root, "bikes").is_some());
        assert_eq!(layers_for_dataset(&root, "bikes").len(), 1);
        assert_eq!(pending_filter_count(&root), 0);
        assert!(!is_split(&root));
        assert!(!is_read_only(&root));
    }
}
