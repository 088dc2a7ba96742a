use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::changed;
use crate::actions::Action;
use crate::actions::ProviderAction;
use crate::diagnostics::Diagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMapEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSuccess {
    pub provider: String,
    pub map_url: String,
}

/// Status of the cloud storage round trips. Tokens and the requests
/// themselves live outside the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    pub is_provider_loading: bool,
    pub is_cloud_map_loading: bool,
    pub provider_error: Option<String>,
    pub current_provider: Option<String>,
    pub success_info: Option<ExportSuccess>,
    pub map_saved: Option<String>,
    pub visualizations: Vec<SavedMapEntry>,
    pub loaded_map_id: Option<String>,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn reduce(
    state: &Arc<ProviderState>,
    initial: &Arc<ProviderState>,
    action: &Action,
    _diagnostics: &mut Diagnostics,
) -> Arc<ProviderState> {
    let next = match action {
        Action::Provider(action) => provider_update(state, action),
        Action::ResetMapConfig => (**initial).clone(),
        _ => return Arc::clone(state),
    };
    changed(state, next)
}

fn provider_update(state: &ProviderState, action: &ProviderAction) -> ProviderState {
    let mut next = state.clone();
    match action {
        ProviderAction::ExportFileToCloud { provider, map_id } => {
            next.is_provider_loading = true;
            next.current_provider = Some(provider.clone());
            next.provider_error = None;
            next.success_info = None;
            next.map_saved = map_id.clone();
        }
        ProviderAction::ExportFileSuccess { provider, map_url } => {
            next.is_provider_loading = false;
            next.success_info = Some(ExportSuccess {
                provider: provider.clone(),
                map_url: map_url.clone(),
            });
            next.map_saved = Some(provider.clone());
        }
        ProviderAction::ExportFileError { error, .. }
        | ProviderAction::GetSavedMapsError { error, .. } => {
            next.is_provider_loading = false;
            next.provider_error = Some(error.clone());
        }
        ProviderAction::ResetProviderStatus => {
            next.is_provider_loading = false;
            next.is_cloud_map_loading = false;
            next.provider_error = None;
            next.success_info = None;
        }
        ProviderAction::SetCloudProvider { provider } => {
            next.current_provider = provider.clone();
        }
        ProviderAction::GetSavedMaps { provider } => {
            next.is_provider_loading = true;
            next.current_provider = Some(provider.clone());
            next.provider_error = None;
        }
        ProviderAction::GetSavedMapsSuccess { maps, .. } => {
            next.is_provider_loading = false;
            next.visualizations = maps.clone();
        }
        ProviderAction::LoadCloudMap { provider, .. } => {
            next.is_cloud_map_loading = true;
            next.current_provider = Some(provider.clone());
            next.provider_error = None;
        }
        ProviderAction::LoadCloudMapSuccess { map_id, .. } => {
            next.is_cloud_map_loading = false;
            next.loaded_map_id = Some(map_id.clone());
        }
        ProviderAction::LoadCloudMapError { error, .. } => {
            next.is_cloud_map_loading = false;
            next.provider_error = Some(error.clone());
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn dispatch(state: &Arc<ProviderState>, action: ProviderAction) -> Arc<ProviderState> {
        let initial = Arc::new(ProviderState::new());
        reduce(state, &initial, &Action::Provider(action), &mut Diagnostics::new())
    }

    #[test]
    fn export_round_trip_clears_loading() {
        let start = Arc::new(ProviderState::new());
        let loading = dispatch(
            &start,
            ProviderAction::ExportFileToCloud {
                provider: "dropbox".to_string(),
                map_id: None,
            },
        );
        assert!(loading.is_provider_loading);
        let done = dispatch(
            &loading,
            ProviderAction::ExportFileSuccess {
                provider: "dropbox".to_string(),
                map_url: "https://example.test/map".to_string(),
            },
        );
        assert!(!done.is_provider_loading);
        assert_eq!(
            done.success_info.as_ref().map(|info| info.map_url.as_str()),
            Some("https://example.test/map")
        );
    }

    #[test]
    fn reset_status_twice_is_a_no_op() {
        let start = Arc::new(ProviderState {
            provider_error: Some("boom".to_string()),
            ..ProviderState::default()
        });
        let once = dispatch(&start, ProviderAction::ResetProviderStatus);
        let twice = dispatch(&once, ProviderAction::ResetProviderStatus);
        assert!(Arc::ptr_eq(&once, &twice));
        assert_eq!(once.provider_error, None);
    }
}
