use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use serde_json::Value;

pub(super) use super::CompositionBuilder;
pub(super) use super::CoreReducer;
pub(super) use super::Reduction;
pub(super) use crate::actions::Action;
pub(super) use crate::actions::AddDataToMapPayload;
pub(super) use crate::actions::LoadOptions;
pub(super) use crate::actions::MapStateAction;
pub(super) use crate::actions::ReceiveMapConfigPayload;
pub(super) use crate::actions::ReplaceDataInMapPayload;
pub(super) use crate::actions::ViewportPatch;
pub(super) use crate::actions::VisStateAction;
pub(super) use crate::config::CoreConfig;
pub(super) use crate::dataset::Bounds;
pub(super) use crate::dataset::DatasetPayload;
pub(super) use crate::dataset::FieldPayload;
pub(super) use crate::dataset::FieldType;
pub(super) use crate::diagnostics::DiagnosticKind;
pub(super) use crate::error::CompositionError;
pub(super) use crate::merger::MergeMode;
pub(super) use crate::root::RootState;
pub(super) use crate::root::SliceKey;
pub(super) use crate::saved::SavedMapConfig;

mod composition;

fn core() -> CoreReducer {
    CompositionBuilder::new(CoreConfig::default()).build()
}

/// Three trips around the bay: lat 37.7..37.9, lng -122.4..-122.2, fares
/// 12.5, 30 and 5.
fn trips(id: &str) -> DatasetPayload {
    DatasetPayload {
        id: id.to_string(),
        label: None,
        color: None,
        fields: vec![
            FieldPayload::new("lat", FieldType::Real),
            FieldPayload::new("lng", FieldType::Real),
            FieldPayload::new("fare", FieldType::Real),
        ],
        rows: vec![
            vec![json!(37.7), json!(-122.4), json!(12.5)],
            vec![json!(37.8), json!(-122.3), json!(30.0)],
            vec![json!(37.9), json!(-122.2), json!(5.0)],
        ],
    }
}

fn add_data(datasets: Vec<DatasetPayload>) -> Action {
    Action::AddDataToMap(AddDataToMapPayload {
        datasets,
        ..AddDataToMapPayload::default()
    })
}

fn saved(config: Value) -> SavedMapConfig {
    serde_json::from_value(config).expect("saved config")
}

fn receive(config: Value) -> Action {
    Action::ReceiveMapConfig(ReceiveMapConfigPayload {
        config: saved(config),
        ..ReceiveMapConfigPayload::default()
    })
}

/// Reduces `action` and insists it did not roll back.
fn run(core: &CoreReducer, root: &RootState, action: Action) -> Reduction {
    let reduction = core.reduce(root, &action);
    assert!(
        reduction.error.is_none(),
        "{} rolled back: {:?}",
        action.label(),
        reduction.error
    );
    reduction
}

fn loaded(core: &CoreReducer, ids: &[&str]) -> RootState {
    let datasets = ids.iter().map(|id| trips(id)).collect();
    run(core, &core.initial_state(), add_data(datasets)).root
}

fn assert_only_touched(before: &RootState, after: &RootState, key: SliceKey) {
    assert_eq!(before.changed_slices(after), vec![key]);
    let shared = [
        Arc::ptr_eq(before.vis_state(), after.vis_state()),
        Arc::ptr_eq(before.map_state(), after.map_state()),
        Arc::ptr_eq(before.map_style(), after.map_style()),
        Arc::ptr_eq(before.ui_state(), after.ui_state()),
        Arc::ptr_eq(before.provider_state(), after.provider_state()),
    ];
    assert_eq!(shared.iter().filter(|same| !**same).count(), 1);
}
