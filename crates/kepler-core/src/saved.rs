//! The save-file shape of a map: what `ReceiveMapConfig` and
//! `AddDataToMap { config }` carry.
//!
//! Every entity field is optional. An omitted field means "leave as is",
//! never "reset to default".

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::error::SavedConfigError;
use super::filter::FilterType;
use super::filter::FilterValue;
use super::layer::LayerConfigPatch;
use super::layer::LayerType;
use super::slices::vis_state::LayerBlending;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMapConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vis_state: Option<SavedVisState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_state: Option<SavedMapState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_style: Option<SavedMapStyle>,
}

impl SavedMapConfig {
    pub fn from_json_str(content: &str) -> Result<Self, SavedConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SavedConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedVisState {
    #[serde(default)]
    pub layers: Vec<SavedLayer>,
    #[serde(default)]
    pub filters: Vec<SavedFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_config: Option<SavedInteractionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_blending: Option<LayerBlending>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_maps: Option<Vec<SavedSplitMap>>,
}

impl SavedVisState {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
            && self.filters.is_empty()
            && self.interaction_config.is_none()
            && self.layer_blending.is_none()
            && self.split_maps.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLayer {
    pub id: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<LayerType>,
    #[serde(default)]
    pub config: LayerConfigPatch,
}

/// A saved filter. Without an `id` it is matched by dataset and field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data_id: String,
    #[serde(default, alias = "field", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<FilterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enlarged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_animating: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl SavedFilter {
    pub fn identity(&self) -> FilterIdentity {
        match &self.id {
            Some(id) => FilterIdentity::Id(id.clone()),
            None => FilterIdentity::Field {
                data_id: self.data_id.clone(),
                name: self.name.clone().unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterIdentity {
    Id(String),
    Field { data_id: String, name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedInteractionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<SavedTooltip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brush: Option<SavedBrush>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocoder: Option<SavedToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<SavedToggle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTooltip {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_mode: Option<bool>,
    #[serde(default)]
    pub fields_to_show: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBrush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedToggle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSplitMap {
    #[serde(default)]
    pub layers: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMapState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_rotate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_split: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMapStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_layer_groups: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_layer_groups: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub three_d_building_color: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_styles: Option<BTreeMap<String, SavedStyleEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStyleEntry {
    pub label: String,
    pub url: String,
}
