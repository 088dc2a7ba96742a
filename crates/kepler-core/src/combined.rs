//! Updaters that touch several slices at once.
//!
//! Each one is an ordered list of named steps. A step reads the root, may
//! replace one slice through its lens, and hands the new root to the next
//! step. The first failing step aborts the whole run and the caller keeps
//! the root it started from.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::actions::AddDataToMapPayload;
use super::actions::ReceiveMapConfigPayload;
use super::actions::ReplaceDataInMapPayload;
use super::dataset::Bounds;
use super::dataset::Dataset;
use super::diagnostics::DiagnosticKind;
use super::diagnostics::Diagnostics;
use super::error::CombinedUpdaterError;
use super::error::StepError;
use super::layer::find_default_layers;
use super::lens::Lens;
use super::lens::MapStateLens;
use super::lens::MapStyleLens;
use super::lens::UiStateLens;
use super::lens::VisStateLens;
use super::merger::merge_into;
use super::merger::resolve_pending;
use super::root::RootState;
use super::root::SliceKey;
use super::slices::changed;
use super::slices::map_state::fit_bounds;
use super::slices::map_state::receive_map_state;
use super::slices::map_style::receive_map_style;
use super::slices::ui_state::finish_loading;
use super::slices::ui_state::receive_read_only;
use super::slices::vis_state::VisState;
use super::slices::vis_state_updaters::retarget_dataset;
use super::slices::vis_state_updaters::update_vis_data;

type StepFn<'a> = dyn Fn(&RootState, &mut Diagnostics) -> Result<RootState, StepError> + 'a;

pub struct Step<'a> {
    name: &'static str,
    slice: SliceKey,
    run: Box<StepFn<'a>>,
}

impl<'a> Step<'a> {
    pub fn new(
        name: &'static str,
        slice: SliceKey,
        run: impl Fn(&RootState, &mut Diagnostics) -> Result<RootState, StepError> + 'a,
    ) -> Self {
        Self {
            name,
            slice,
            run: Box::new(run),
        }
    }

    /// A step that replaces the slice `lens` focuses on. `update` also sees
    /// the root as left by the previous steps.
    pub fn lensed<L>(
        name: &'static str,
        lens: L,
        update: impl Fn(&Arc<L::Slice>, &RootState, &mut Diagnostics) -> Result<Arc<L::Slice>, StepError>
            + 'a,
    ) -> Self
    where
        L: Lens + 'a,
    {
        let slice = lens.key();
        Self::new(name, slice, move |root, diagnostics| {
            lens.over(root, |current| update(current, root, diagnostics))
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn slice(&self) -> &SliceKey {
        &self.slice
    }
}

/// Runs `steps` in order against `root`.
///
/// Diagnostics of the run are handed to the caller only when every step
/// succeeds; a failure leaves a single `StepFailed` entry instead.
pub fn apply_steps(
    root: &RootState,
    steps: &[Step<'_>],
    diagnostics: &mut Diagnostics,
) -> Result<RootState, CombinedUpdaterError> {
    let mut local = Diagnostics::new();
    let mut current = root.clone();
    for step in steps {
        match (step.run)(&current, &mut local) {
            Ok(next) => current = next,
            Err(source) => {
                let err = CombinedUpdaterError {
                    step: step.name,
                    slice: step.slice.clone(),
                    source,
                };
                diagnostics.error(step.slice.clone(), DiagnosticKind::StepFailed, err.to_string());
                return Err(err);
            }
        }
    }
    diagnostics.append(local);
    Ok(current)
}

fn layer_ids(vis: &VisState) -> BTreeSet<String> {
    vis.layers.iter().map(|layer| layer.id.clone()).collect()
}

/// Data bounds of the layers in `vis` that `include` selects.
fn layer_bounds(vis: &VisState, include: impl Fn(&str, &str) -> bool) -> Option<Bounds> {
    Bounds::union_all(vis.layers.iter().filter_map(|layer| {
        if !include(&layer.id, layer.data_id()) {
            return None;
        }
        let dataset = vis.datasets.get(layer.data_id())?;
        layer.bounds(dataset)
    }))
}

pub fn add_data_to_map(
    root: &RootState,
    payload: &AddDataToMapPayload,
    diagnostics: &mut Diagnostics,
) -> Result<RootState, CombinedUpdaterError> {
    let options = &payload.options;
    let config = payload.config.as_ref();
    let before = layer_ids(root.vis_state());

    let steps = [
        Step::lensed("updateVisData", VisStateLens, |vis, _, diagnostics| {
            let vis_config = config.and_then(|config| config.vis_state.as_ref());
            Ok(update_vis_data(vis, &payload.datasets, vis_config, options, diagnostics)?)
        }),
        Step::lensed("fitMapBounds", MapStateLens, |map, root, _| {
            let mut next = Arc::clone(map);
            if let Some(saved) = config.and_then(|config| config.map_state.as_ref()) {
                next = receive_map_state(&next, saved);
            }
            if options.center_map {
                let fresh = layer_bounds(root.vis_state(), |id, _| !before.contains(id));
                if let Some(bounds) = fresh {
                    next = changed(&next, fit_bounds(&next, bounds));
                }
            }
            Ok(next)
        }),
        Step::lensed("receiveMapStyle", MapStyleLens, |style, _, _| {
            match config.and_then(|config| config.map_style.as_ref()) {
                Some(saved) => Ok(receive_map_style(style, saved)?),
                None => Ok(Arc::clone(style)),
            }
        }),
        Step::lensed("finishLoading", UiStateLens, |ui, _, _| {
            Ok(finish_loading(ui, options.read_only))
        }),
    ];
    apply_steps(root, &steps, diagnostics)
}

/// Swaps dataset `dataset_to_replace_id` for a new one, keeping the layers,
/// filters and tooltips that still fit it.
pub fn replace_data_in_map(
    root: &RootState,
    payload: &ReplaceDataInMapPayload,
    diagnostics: &mut Diagnostics,
) -> Result<RootState, CombinedUpdaterError> {
    let options = &payload.options;
    let new_id = payload.dataset_to_use.id.clone();

    let steps = [
        Step::lensed("replaceDataset", VisStateLens, |vis, _, diagnostics| {
            let color_slot = vis.datasets.len();
            let mut dataset = Dataset::from_payload(payload.dataset_to_use.clone(), color_slot)?;
            if payload.dataset_to_use.color.is_none() {
                if let Some(old) = vis.datasets.get(&payload.dataset_to_replace_id) {
                    dataset.color = old.color;
                }
            }
            let mut next = (**vis).clone();
            retarget_dataset(&mut next, &payload.dataset_to_replace_id, dataset, diagnostics)?;
            resolve_pending(&mut next, diagnostics);

            let auto_create = options.auto_create_layers.unwrap_or(next.auto_create_layers);
            let has_layers = next.layers.iter().any(|layer| layer.data_id() == new_id);
            if auto_create && !has_layers {
                if let Some(dataset) = next.datasets.get(&new_id).cloned() {
                    let color_offset = next.layers.len();
                    for layer in find_default_layers(&dataset, options.initial_layer_visibility, color_offset) {
                        next.push_layer(layer);
                    }
                }
            }
            next.refilter(&new_id);
            Ok(Arc::new(next))
        }),
        Step::lensed("fitMapBounds", MapStateLens, |map, root, _| {
            if !options.center_map {
                return Ok(Arc::clone(map));
            }
            match layer_bounds(root.vis_state(), |_, data_id| data_id == new_id) {
                Some(bounds) => Ok(changed(map, fit_bounds(map, bounds))),
                None => Ok(Arc::clone(map)),
            }
        }),
        Step::lensed("keepMapStyle", MapStyleLens, |style, _, _| Ok(Arc::clone(style))),
        Step::lensed("finishLoading", UiStateLens, |ui, _, _| {
            Ok(finish_loading(ui, options.read_only))
        }),
    ];
    apply_steps(root, &steps, diagnostics)
}

/// Applies a saved map. With `keep_existing_config` off, vis-state is reset
/// first and every entity of the config waits for its dataset.
pub fn receive_map_config(
    root: &RootState,
    payload: &ReceiveMapConfigPayload,
    diagnostics: &mut Diagnostics,
) -> Result<RootState, CombinedUpdaterError> {
    let options = &payload.options;
    let config = &payload.config;

    let steps = [
        Step::lensed("mergeVisConfig", VisStateLens, |vis, _, diagnostics| {
            let mut next = if options.keep_existing_config {
                (**vis).clone()
            } else {
                vis.reset()
            };
            let mode = payload.mode.unwrap_or(next.merge_mode);
            if let Some(saved) = &config.vis_state {
                merge_into(&mut next, saved, mode, diagnostics);
            }
            Ok(changed(vis, next))
        }),
        Step::lensed("receiveMapState", MapStateLens, |map, root, _| {
            match &config.map_state {
                Some(saved) => Ok(receive_map_state(map, saved)),
                None if options.center_map => {
                    match layer_bounds(root.vis_state(), |_, _| true) {
                        Some(bounds) => Ok(changed(map, fit_bounds(map, bounds))),
                        None => Ok(Arc::clone(map)),
                    }
                }
                None => Ok(Arc::clone(map)),
            }
        }),
        Step::lensed("receiveMapStyle", MapStyleLens, |style, _, _| match &config.map_style {
            Some(saved) => Ok(receive_map_style(style, saved)?),
            None => Ok(Arc::clone(style)),
        }),
        Step::lensed("receiveUiState", UiStateLens, |ui, _, _| {
            Ok(receive_read_only(ui, options.read_only))
        }),
    ];
    apply_steps(root, &steps, diagnostics)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::CoreConfig;
    use crate::reducer::CompositionBuilder;

    fn root() -> RootState {
        CompositionBuilder::new(CoreConfig::default())
            .build()
            .initial_state()
    }

    #[test]
    fn failing_step_rolls_back_to_the_input_root() {
        let root = root();
        let steps = [
            Step::lensed("zoomOut", MapStateLens, |map, _, _| {
                let mut next = (**map).clone();
                next.zoom = 1.0;
                Ok(Arc::new(next))
            }),
            Step::lensed("reject", MapStyleLens, |_, _, _| {
                Err(StepError::Rejected(Arc::from("style service unavailable")))
            }),
            Step::lensed("closeModal", UiStateLens, |ui, _, _| Ok(finish_loading(ui, false))),
        ];
        let mut diagnostics = Diagnostics::new();
        let err = apply_steps(&root, &steps, &mut diagnostics).expect_err("second step fails");
        assert_eq!(err.step, "reject");
        assert_eq!(err.slice, SliceKey::MapStyle);
        assert!(diagnostics.has_kind(DiagnosticKind::StepFailed));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn steps_see_the_root_left_by_earlier_steps() {
        let root = root();
        let steps = [
            Step::lensed("zoomOut", MapStateLens, |map, _, _| {
                let mut next = (**map).clone();
                next.zoom = 1.0;
                Ok(Arc::new(next))
            }),
            Step::new("checkZoom", SliceKey::UiState, |root, _| {
                if root.map_state().zoom == 1.0 {
                    Ok(root.clone())
                } else {
                    Err(StepError::Rejected(Arc::from("zoom not applied")))
                }
            }),
        ];
        let next = apply_steps(&root, &steps, &mut Diagnostics::new()).expect("ordered");
        assert_eq!(root.changed_slices(&next), vec![SliceKey::MapState]);
    }
}
