use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::dataset::DatasetPayload;
use super::filter::FilterValue;
use super::layer::LayerConfigPatch;
use super::layer::LayerType;
use super::layer::LayerVisConfigPatch;
use super::merger::MergeMode;
use super::saved::SavedInteractionConfig;
use super::saved::SavedLayer;
use super::saved::SavedMapConfig;
use super::saved::SavedVisState;
use super::slices::map_style::MapStyleEntry;
use super::slices::ui_state::ExportDataSettings;
use super::slices::ui_state::ExportImageSettings;
use super::slices::ui_state::Notification;
use super::slices::vis_state::HoverInfo;
use super::slices::vis_state::LayerBlending;
use super::slices::vis_state::MapInfo;

/// Everything that can be dispatched at a composed core.
///
/// Serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Action {
    VisState(VisStateAction),
    MapState(MapStateAction),
    MapStyle(MapStyleAction),
    UiState(UiStateAction),
    Provider(ProviderAction),
    /// Seen by every built-in slice; each returns to its initial value.
    ResetMapConfig,
    /// Seen by vis-state, map-state and ui-state.
    ToggleSplitMap {
        #[serde(default)]
        index: Option<usize>,
    },
    AddDataToMap(AddDataToMapPayload),
    ReplaceDataInMap(ReplaceDataInMapPayload),
    ReceiveMapConfig(ReceiveMapConfigPayload),
    /// Action types no built-in slice knows; only registered slices see them.
    External {
        kind: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Action {
    pub fn label(&self) -> &str {
        match self {
            Self::VisState(action) => action.label(),
            Self::MapState(action) => action.label(),
            Self::MapStyle(action) => action.label(),
            Self::UiState(action) => action.label(),
            Self::Provider(action) => action.label(),
            Self::ResetMapConfig => "resetMapConfig",
            Self::ToggleSplitMap { .. } => "toggleSplitMap",
            Self::AddDataToMap(_) => "addDataToMap",
            Self::ReplaceDataInMap(_) => "replaceDataInMap",
            Self::ReceiveMapConfig(_) => "receiveMapConfig",
            Self::External { kind, .. } => kind,
        }
    }

    /// Cross-slice actions handled by a combined updater.
    pub fn is_combined(&self) -> bool {
        matches!(
            self,
            Self::AddDataToMap(_) | Self::ReplaceDataInMap(_) | Self::ReceiveMapConfig(_)
        )
    }
}

/// Options shared by the data-loading entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadOptions {
    pub center_map: bool,
    pub read_only: bool,
    pub keep_existing_config: bool,
    /// `None` falls back to the core's configured default.
    pub auto_create_layers: Option<bool>,
    pub initial_layer_visibility: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            center_map: true,
            read_only: false,
            keep_existing_config: true,
            auto_create_layers: None,
            initial_layer_visibility: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDataToMapPayload {
    #[serde(default)]
    pub datasets: Vec<DatasetPayload>,
    #[serde(default)]
    pub options: LoadOptions,
    #[serde(default)]
    pub config: Option<SavedMapConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceDataInMapPayload {
    pub dataset_to_replace_id: String,
    pub dataset_to_use: DatasetPayload,
    #[serde(default)]
    pub options: LoadOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMapConfigPayload {
    pub config: SavedMapConfig,
    #[serde(default)]
    pub options: LoadOptions,
    /// `None` uses the core's configured merge mode.
    #[serde(default)]
    pub mode: Option<MergeMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVisDataPayload {
    pub datasets: Vec<DatasetPayload>,
    #[serde(default)]
    pub config: Option<SavedVisState>,
    #[serde(default)]
    pub options: LoadOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum VisStateAction {
    UpdateVisData(UpdateVisDataPayload),
    RemoveDataset {
        data_id: String,
    },
    AddLayer {
        #[serde(default)]
        data_id: Option<String>,
        #[serde(default)]
        config: Option<SavedLayer>,
    },
    RemoveLayer {
        id: String,
    },
    DuplicateLayer {
        id: String,
    },
    ReorderLayer {
        order: Vec<String>,
    },
    LayerConfigChange {
        id: String,
        patch: LayerConfigPatch,
    },
    LayerTypeChange {
        id: String,
        layer_type: LayerType,
    },
    LayerVisConfigChange {
        id: String,
        patch: LayerVisConfigPatch,
    },
    ToggleLayerForMap {
        map_index: usize,
        layer_id: String,
    },
    SetLayerBlending(LayerBlending),
    AddFilter {
        data_id: String,
    },
    RemoveFilter {
        id: String,
    },
    SetFilterField {
        id: String,
        field: String,
    },
    SetFilterValue {
        id: String,
        value: FilterValue,
    },
    EnlargeFilter {
        id: String,
    },
    ToggleFilterAnimation {
        id: String,
    },
    UpdateAnimationSpeed {
        id: String,
        speed: f64,
    },
    InteractionConfigChange(SavedInteractionConfig),
    SetMapInfo(MapInfo),
    LayerHover(Option<HoverInfo>),
    LayerClick(Option<HoverInfo>),
    MapClick,
}

impl VisStateAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpdateVisData(_) => "updateVisData",
            Self::RemoveDataset { .. } => "removeDataset",
            Self::AddLayer { .. } => "addLayer",
            Self::RemoveLayer { .. } => "removeLayer",
            Self::DuplicateLayer { .. } => "duplicateLayer",
            Self::ReorderLayer { .. } => "reorderLayer",
            Self::LayerConfigChange { .. } => "layerConfigChange",
            Self::LayerTypeChange { .. } => "layerTypeChange",
            Self::LayerVisConfigChange { .. } => "layerVisConfigChange",
            Self::ToggleLayerForMap { .. } => "toggleLayerForMap",
            Self::SetLayerBlending(_) => "setLayerBlending",
            Self::AddFilter { .. } => "addFilter",
            Self::RemoveFilter { .. } => "removeFilter",
            Self::SetFilterField { .. } => "setFilterField",
            Self::SetFilterValue { .. } => "setFilterValue",
            Self::EnlargeFilter { .. } => "enlargeFilter",
            Self::ToggleFilterAnimation { .. } => "toggleFilterAnimation",
            Self::UpdateAnimationSpeed { .. } => "updateAnimationSpeed",
            Self::InteractionConfigChange(_) => "interactionConfigChange",
            Self::SetMapInfo(_) => "setMapInfo",
            Self::LayerHover(_) => "layerHover",
            Self::LayerClick(_) => "layerClick",
            Self::MapClick => "mapClick",
        }
    }
}

/// Partial viewport; omitted fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportPatch {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zoom: Option<f64>,
    pub pitch: Option<f64>,
    pub bearing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum MapStateAction {
    UpdateMap {
        viewport: ViewportPatch,
        #[serde(default)]
        map_index: Option<usize>,
    },
    FitBounds(super::dataset::Bounds),
    TogglePerspective,
    UpdateMapSize {
        width: f64,
        height: f64,
    },
    ToggleViewportSync,
}

impl MapStateAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpdateMap { .. } => "updateMap",
            Self::FitBounds(_) => "fitBounds",
            Self::TogglePerspective => "togglePerspective",
            Self::UpdateMapSize { .. } => "updateMapSize",
            Self::ToggleViewportSync => "toggleViewportSync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum MapStyleAction {
    MapStyleChange {
        style_type: String,
    },
    MapConfigChange {
        #[serde(default)]
        visible_layer_groups: Option<BTreeMap<String, bool>>,
        #[serde(default)]
        top_layer_groups: Option<BTreeMap<String, bool>>,
    },
    LoadMapStyles {
        styles: BTreeMap<String, MapStyleEntry>,
    },
    AddCustomMapStyle {
        id: String,
        style: MapStyleEntry,
    },
    Set3dBuildingColor {
        color: [u8; 3],
    },
    SetBackgroundColor {
        color: [u8; 3],
    },
}

impl MapStyleAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MapStyleChange { .. } => "mapStyleChange",
            Self::MapConfigChange { .. } => "mapConfigChange",
            Self::LoadMapStyles { .. } => "loadMapStyles",
            Self::AddCustomMapStyle { .. } => "addCustomMapStyle",
            Self::Set3dBuildingColor { .. } => "set3dBuildingColor",
            Self::SetBackgroundColor { .. } => "setBackgroundColor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UiStateAction {
    ToggleSidePanel {
        #[serde(default)]
        panel: Option<String>,
    },
    ToggleModal {
        #[serde(default)]
        modal: Option<String>,
    },
    OpenDeleteModal {
        data_id: String,
    },
    ToggleMapControl {
        control: String,
        #[serde(default)]
        map_index: Option<usize>,
    },
    SetMapControlVisibility {
        control: String,
        show: bool,
    },
    SetExportImageSetting(ExportImageSettings),
    SetExportDataSettings(ExportDataSettings),
    AddNotification(Notification),
    RemoveNotification {
        id: String,
    },
    SetLocale {
        locale: String,
    },
    LoadFilesProgress {
        file_name: String,
        percent: f64,
    },
}

impl UiStateAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ToggleSidePanel { .. } => "toggleSidePanel",
            Self::ToggleModal { .. } => "toggleModal",
            Self::OpenDeleteModal { .. } => "openDeleteModal",
            Self::ToggleMapControl { .. } => "toggleMapControl",
            Self::SetMapControlVisibility { .. } => "setMapControlVisibility",
            Self::SetExportImageSetting(_) => "setExportImageSetting",
            Self::SetExportDataSettings(_) => "setExportDataSettings",
            Self::AddNotification(_) => "addNotification",
            Self::RemoveNotification { .. } => "removeNotification",
            Self::SetLocale { .. } => "setLocale",
            Self::LoadFilesProgress { .. } => "loadFilesProgress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ProviderAction {
    ExportFileToCloud {
        provider: String,
        map_id: Option<String>,
    },
    ExportFileSuccess {
        provider: String,
        map_url: String,
    },
    ExportFileError {
        provider: String,
        error: String,
    },
    ResetProviderStatus,
    SetCloudProvider {
        provider: Option<String>,
    },
    GetSavedMaps {
        provider: String,
    },
    GetSavedMapsSuccess {
        provider: String,
        maps: Vec<super::slices::provider_state::SavedMapEntry>,
    },
    GetSavedMapsError {
        provider: String,
        error: String,
    },
    LoadCloudMap {
        provider: String,
        map_id: String,
    },
    LoadCloudMapSuccess {
        provider: String,
        map_id: String,
    },
    LoadCloudMapError {
        provider: String,
        error: String,
    },
}

impl ProviderAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExportFileToCloud { .. } => "exportFileToCloud",
            Self::ExportFileSuccess { .. } => "exportFileSuccess",
            Self::ExportFileError { .. } => "exportFileError",
            Self::ResetProviderStatus => "resetProviderStatus",
            Self::SetCloudProvider { .. } => "setCloudProvider",
            Self::GetSavedMaps { .. } => "getSavedMaps",
            Self::GetSavedMapsSuccess { .. } => "getSavedMapsSuccess",
            Self::GetSavedMapsError { .. } => "getSavedMapsError",
            Self::LoadCloudMap { .. } => "loadCloudMap",
            Self::LoadCloudMapSuccess { .. } => "loadCloudMapSuccess",
            Self::LoadCloudMapError { .. } => "loadCloudMapError",
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn actions_use_type_and_payload_envelope() {
        let action = Action::MapState(MapStateAction::UpdateMapSize {
            width: 400.0,
            height: 300.0,
        });
        let encoded = serde_json::to_value(&action).expect("encode");
        assert_eq!(
            encoded,
            json!({
                "type": "mapState",
                "payload": {"type": "updateMapSize", "payload": {"width": 400.0, "height": 300.0}}
            })
        );
        let decoded: Action = serde_json::from_value(encoded).expect("decode");
        assert_eq!(decoded, action);
    }

    #[test]
    fn unit_variants_need_no_payload() {
        let action: Action = serde_json::from_value(json!({"type": "resetMapConfig"})).expect("decode");
        assert_eq!(action, Action::ResetMapConfig);
        assert_eq!(action.label(), "resetMapConfig");
    }

    #[test]
    fn load_options_default_to_centering() {
        let payload: AddDataToMapPayload =
            serde_json::from_value(json!({"datasets": []})).expect("decode");
        assert!(payload.options.center_map);
        assert!(payload.options.keep_existing_config);
        assert_eq!(payload.options.auto_create_layers, None);
    }
}
