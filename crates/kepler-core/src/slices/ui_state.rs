use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::changed;
use super::settle;
use crate::actions::Action;
use crate::actions::UiStateAction;
use crate::config::UiConfig;
use crate::diagnostics::Diagnostics;
use crate::error::PayloadError;
use crate::root::SliceKey;

pub const ADD_DATA_MODAL: &str = "addData";
pub const DELETE_DATA_MODAL: &str = "deleteData";
pub const DEFAULT_SIDE_PANEL: &str = "layer";
pub const SPLIT_MAP_CONTROL: &str = "splitMap";

const MAP_CONTROLS: &[&str] = &[
    "visibleLayers",
    "mapLegend",
    "toggle3d",
    SPLIT_MAP_CONTROL,
    "mapDraw",
    "mapLocale",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapControl {
    pub show: bool,
    pub active: bool,
    pub active_map_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportImageSettings {
    pub ratio: String,
    pub resolution: String,
    pub legend: bool,
}

impl Default for ExportImageSettings {
    fn default() -> Self {
        Self {
            ratio: "screen".to_string(),
            resolution: "one_x".to_string(),
            legend: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportDataSettings {
    pub selected_dataset: Option<String>,
    pub data_type: String,
    pub filtered: bool,
}

impl Default for ExportDataSettings {
    fn default() -> Self {
        Self {
            selected_dataset: None,
            data_type: "csv".to_string(),
            filtered: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub level: NotificationLevel,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLoading {
    pub file_name: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub read_only: bool,
    pub active_side_panel: Option<String>,
    pub current_modal: Option<String>,
    pub dataset_key_to_remove: Option<String>,
    pub map_controls: BTreeMap<String, MapControl>,
    pub export_image: ExportImageSettings,
    pub export_data: ExportDataSettings,
    pub notifications: Vec<Notification>,
    pub notification_cap: usize,
    pub locale: String,
    pub file_loading: Option<FileLoading>,
}

impl UiState {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            read_only: config.read_only,
            active_side_panel: Some(DEFAULT_SIDE_PANEL.to_string()),
            current_modal: Some(ADD_DATA_MODAL.to_string()),
            dataset_key_to_remove: None,
            map_controls: MAP_CONTROLS
                .iter()
                .map(|control| {
                    (
                        (*control).to_string(),
                        MapControl {
                            show: true,
                            ..MapControl::default()
                        },
                    )
                })
                .collect(),
            export_image: ExportImageSettings::default(),
            export_data: ExportDataSettings::default(),
            notifications: Vec::new(),
            notification_cap: config.notification_cap,
            locale: config.locale.clone(),
            file_loading: None,
        }
    }
}

pub fn reduce(
    state: &Arc<UiState>,
    initial: &Arc<UiState>,
    action: &Action,
    diagnostics: &mut Diagnostics,
) -> Arc<UiState> {
    let result = match action {
        Action::UiState(action) => match action {
            UiStateAction::ToggleSidePanel { panel } => Ok(changed(
                state,
                UiState {
                    active_side_panel: panel.clone(),
                    ..(**state).clone()
                },
            )),
            UiStateAction::ToggleModal { modal } => Ok(changed(
                state,
                UiState {
                    current_modal: modal.clone(),
                    ..(**state).clone()
                },
            )),
            UiStateAction::OpenDeleteModal { data_id } => Ok(changed(
                state,
                UiState {
                    current_modal: Some(DELETE_DATA_MODAL.to_string()),
                    dataset_key_to_remove: Some(data_id.clone()),
                    ..(**state).clone()
                },
            )),
            UiStateAction::ToggleMapControl { control, map_index } => {
                toggle_map_control(state, control, map_index.unwrap_or(0))
            }
            UiStateAction::SetMapControlVisibility { control, show } => {
                set_map_control_visibility(state, control, *show)
            }
            UiStateAction::SetExportImageSetting(settings) => Ok(changed(
                state,
                UiState {
                    export_image: settings.clone(),
                    ..(**state).clone()
                },
            )),
            UiStateAction::SetExportDataSettings(settings) => Ok(changed(
                state,
                UiState {
                    export_data: settings.clone(),
                    ..(**state).clone()
                },
            )),
            UiStateAction::AddNotification(notification) => {
                Ok(add_notification(state, notification.clone()))
            }
            UiStateAction::RemoveNotification { id } => Ok(remove_notification(state, id)),
            UiStateAction::SetLocale { locale } => Ok(changed(
                state,
                UiState {
                    locale: locale.clone(),
                    ..(**state).clone()
                },
            )),
            UiStateAction::LoadFilesProgress { file_name, percent } => Ok(changed(
                state,
                UiState {
                    file_loading: Some(FileLoading {
                        file_name: file_name.clone(),
                        percent: percent.clamp(0.0, 100.0),
                    }),
                    ..(**state).clone()
                },
            )),
        },
        Action::ResetMapConfig => Ok(changed(
            state,
            UiState {
                locale: state.locale.clone(),
                ..(**initial).clone()
            },
        )),
        Action::ToggleSplitMap { .. } => {
            let mut next = (**state).clone();
            if let Some(control) = next.map_controls.get_mut(SPLIT_MAP_CONTROL) {
                control.active = !control.active;
            }
            Ok(Arc::new(next))
        }
        _ => return Arc::clone(state),
    };
    settle(state, SliceKey::UiState, result, diagnostics)
}

pub fn toggle_map_control(
    state: &Arc<UiState>,
    control: &str,
    map_index: usize,
) -> Result<Arc<UiState>, PayloadError> {
    let mut next = (**state).clone();
    let entry = next
        .map_controls
        .get_mut(control)
        .ok_or_else(|| PayloadError::UnknownMapControl(control.to_string()))?;
    entry.active = !entry.active;
    entry.active_map_index = map_index;
    Ok(Arc::new(next))
}

pub fn set_map_control_visibility(
    state: &Arc<UiState>,
    control: &str,
    show: bool,
) -> Result<Arc<UiState>, PayloadError> {
    let mut next = (**state).clone();
    let entry = next
        .map_controls
        .get_mut(control)
        .ok_or_else(|| PayloadError::UnknownMapControl(control.to_string()))?;
    entry.show = show;
    Ok(changed(state, next))
}

/// Oldest notifications are evicted past the cap; re-adding an id replaces it.
pub fn add_notification(state: &Arc<UiState>, notification: Notification) -> Arc<UiState> {
    let mut next = (**state).clone();
    next.notifications.retain(|existing| existing.id != notification.id);
    next.notifications.push(notification);
    let overflow = next.notifications.len().saturating_sub(next.notification_cap);
    next.notifications.drain(..overflow);
    changed(state, next)
}

pub fn remove_notification(state: &Arc<UiState>, id: &str) -> Arc<UiState> {
    if !state.notifications.iter().any(|n| n.id == id) {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.notifications.retain(|n| n.id != id);
    Arc::new(next)
}

/// Closes out a data load: progress cleared, any open modal closed.
/// `read_only` can switch read-only mode on but never off.
pub fn finish_loading(state: &Arc<UiState>, read_only: bool) -> Arc<UiState> {
    let mut next = (**state).clone();
    next.file_loading = None;
    next.current_modal = None;
    next.read_only = state.read_only || read_only;
    changed(state, next)
}

pub fn receive_read_only(state: &Arc<UiState>, read_only: bool) -> Arc<UiState> {
    changed(
        state,
        UiState {
            read_only: state.read_only || read_only,
            ..(**state).clone()
        },
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn state() -> Arc<UiState> {
        Arc::new(UiState::new(&UiConfig {
            notification_cap: 2,
            ..UiConfig::default()
        }))
    }

    fn note(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            message: format!("message {id}"),
            level: NotificationLevel::Info,
            topic: None,
        }
    }

    #[test]
    fn notifications_are_capped_oldest_first() {
        let start = state();
        let next = add_notification(&start, note("a"));
        let next = add_notification(&next, note("b"));
        let next = add_notification(&next, note("c"));
        let ids: Vec<&str> = next.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn toggling_a_control_twice_restores_it() {
        let start = state();
        let once = toggle_map_control(&start, "mapLegend", 0).expect("known");
        assert!(once.map_controls["mapLegend"].active);
        let twice = toggle_map_control(&once, "mapLegend", 0).expect("known");
        assert_eq!(*twice, *start);
    }

    #[test]
    fn unknown_control_leaves_state_alone() {
        let start = state();
        let mut diagnostics = Diagnostics::new();
        let action = Action::UiState(UiStateAction::ToggleMapControl {
            control: "compass".to_string(),
            map_index: None,
        });
        let next = reduce(&start, &start, &action, &mut diagnostics);
        assert!(Arc::ptr_eq(&start, &next));
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn finish_loading_closes_the_add_data_modal() {
        let start = state();
        assert_eq!(start.current_modal.as_deref(), Some(ADD_DATA_MODAL));
        let done = finish_loading(&start, true);
        assert_eq!(done.current_modal, None);
        assert!(done.read_only);
    }
}
