use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::actions::MapStyleAction;
use crate::actions::ProviderAction;
use crate::actions::UiStateAction;
use crate::diagnostics::Diagnostics;
use crate::lens::Lens;

#[derive(Debug, Clone, PartialEq)]
struct Clicks {
    total: u32,
}

fn count_clicks(state: &Arc<Clicks>, action: &Action, _diagnostics: &mut Diagnostics) -> Arc<Clicks> {
    match action {
        Action::External { kind, .. } if kind == "click" => Arc::new(Clicks {
            total: state.total + 1,
        }),
        _ => Arc::clone(state),
    }
}

#[test]
fn reserved_and_duplicate_keys_are_rejected() {
    let mut builder = CompositionBuilder::new(CoreConfig::default());
    let err = builder
        .register_slice("visState", Clicks { total: 0 }, count_clicks)
        .expect_err("reserved");
    assert_eq!(err, CompositionError::ReservedKey(Arc::from("visState")));

    builder
        .register_slice("clicks", Clicks { total: 0 }, count_clicks)
        .expect("first");
    let err = builder
        .register_slice("clicks", 0_u8, |state, _, _| Arc::clone(state))
        .expect_err("duplicate");
    assert_eq!(err, CompositionError::DuplicateKey(Arc::from("clicks")));
}

#[test]
fn external_actions_reach_registered_slices_only() {
    let mut builder = CompositionBuilder::new(CoreConfig::default());
    let clicks = builder
        .register_slice("clicks", Clicks { total: 0 }, count_clicks)
        .expect("register");
    let core = builder.build();
    let root = core.initial_state();

    let action = Action::External {
        kind: "click".to_string(),
        payload: json!({}),
    };
    let reduction = core.reduce(&root, &action);
    assert_eq!(
        reduction.touched,
        vec![SliceKey::Extension(Arc::from("clicks"))]
    );
    assert_eq!(clicks.get(&reduction.root).expect("present").total, 1);
    assert!(Arc::ptr_eq(root.vis_state(), reduction.root.vis_state()));

    let ignored = Action::External {
        kind: "scroll".to_string(),
        payload: json!(null),
    };
    let reduction = core.reduce(&reduction.root, &ignored);
    assert!(reduction.is_noop());
}

#[test]
fn keys_list_builtins_then_extensions() {
    let mut builder = CompositionBuilder::new(CoreConfig::default());
    builder
        .register_slice("clicks", Clicks { total: 0 }, count_clicks)
        .expect("register");
    let core = builder.build();
    assert_eq!(
        core.keys(),
        vec![
            SliceKey::VisState,
            SliceKey::MapState,
            SliceKey::MapStyle,
            SliceKey::UiState,
            SliceKey::ProviderState,
            SliceKey::Extension(Arc::from("clicks")),
        ]
    );
}

#[test]
fn lens_lookup_checks_the_slice_type() {
    let mut builder = CompositionBuilder::new(CoreConfig::default());
    builder
        .register_slice("clicks", Clicks { total: 0 }, count_clicks)
        .expect("register");
    let core = builder.build();

    assert!(core.lens::<Clicks>("clicks").is_ok());
    assert_eq!(
        core.lens::<u64>("clicks").expect_err("wrong type"),
        CompositionError::SliceTypeMismatch(SliceKey::Extension(Arc::from("clicks")))
    );
    assert_eq!(
        core.lens::<Clicks>("hovers").expect_err("unregistered"),
        CompositionError::MissingSlice(SliceKey::Extension(Arc::from("hovers")))
    );
}

#[test]
fn validate_flags_roots_from_another_composition() {
    let mut builder = CompositionBuilder::new(CoreConfig::default());
    builder
        .register_slice("clicks", Clicks { total: 0 }, count_clicks)
        .expect("register");
    let with_clicks = builder.build();
    let plain = core();

    assert_eq!(with_clicks.validate(&with_clicks.initial_state()), Ok(()));
    assert_eq!(
        with_clicks.validate(&plain.initial_state()),
        Err(CompositionError::MissingSlice(SliceKey::Extension(
            Arc::from("clicks")
        )))
    );
    assert_eq!(
        plain.validate(&with_clicks.initial_state()),
        Err(CompositionError::UnknownSlice(Arc::from("clicks")))
    );
}

#[test]
fn single_slice_actions_share_every_other_slice() {
    let core = core();
    let root = loaded(&core, &["ds1"]);

    let cases = [
        (
            Action::MapState(MapStateAction::UpdateMap {
                viewport: ViewportPatch {
                    zoom: Some(4.0),
                    ..ViewportPatch::default()
                },
                map_index: None,
            }),
            SliceKey::MapState,
        ),
        (
            Action::MapStyle(MapStyleAction::MapStyleChange {
                style_type: "light".to_string(),
            }),
            SliceKey::MapStyle,
        ),
        (
            Action::UiState(UiStateAction::SetLocale {
                locale: "fi".to_string(),
            }),
            SliceKey::UiState,
        ),
        (
            Action::Provider(ProviderAction::SetCloudProvider {
                provider: Some("dropbox".to_string()),
            }),
            SliceKey::ProviderState,
        ),
        (
            Action::VisState(VisStateAction::RemoveLayer {
                id: "ds1-point".to_string(),
            }),
            SliceKey::VisState,
        ),
    ];
    for (action, key) in cases {
        let reduction = run(&core, &root, action);
        assert_only_touched(&root, &reduction.root, key);
        assert_eq!(reduction.touched.len(), 1);
    }
}

#[test]
fn invalid_payload_leaves_the_slice_and_reports() {
    let core = core();
    let root = core.initial_state();
    let reduction = core.reduce(
        &root,
        &Action::MapStyle(MapStyleAction::MapStyleChange {
            style_type: "neon".to_string(),
        }),
    );
    assert!(reduction.root.same(&root));
    assert!(reduction.error.is_none());
    assert!(reduction.diagnostics.has_kind(DiagnosticKind::InvalidPayload));
}

#[test]
fn reset_returns_every_builtin_to_its_initial_value() {
    let core = core();
    let initial = core.initial_state();
    let root = loaded(&core, &["ds1"]);
    let reduction = run(&core, &root, Action::ResetMapConfig);
    let reset = &reduction.root;

    assert!(reset.vis_state().datasets.is_empty());
    assert!(reset.vis_state().layers.is_empty());
    assert_eq!(reset.map_state().zoom, initial.map_state().zoom);
    assert_eq!(reset.ui_state().current_modal, initial.ui_state().current_modal);
    assert_eq!(core.keys(), reset.keys());

    let again = run(&core, reset, Action::ResetMapConfig);
    assert!(Arc::ptr_eq(reset.vis_state(), again.root.vis_state()));
    assert!(Arc::ptr_eq(reset.map_state(), again.root.map_state()));
    assert!(Arc::ptr_eq(reset.map_style(), again.root.map_style()));
    assert!(again.is_noop());
}

#[test]
fn lens_laws_hold_for_builtin_slices() {
    let core = core();
    let root = loaded(&core, &["ds1"]);
    let vis = crate::lens::VisStateLens.get(&root).expect("builtin");
    let same = crate::lens::VisStateLens.set(&root, Arc::clone(&vis));
    assert!(same.same(&root));

    let replaced = crate::lens::MapStateLens.set(&root, Arc::clone(core.initial_state().map_state()));
    let read = crate::lens::MapStateLens.get(&replaced).expect("builtin");
    assert!(Arc::ptr_eq(&read, core.initial_state().map_state()));
}
