use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use super::dataset::Bounds;
use super::dataset::Dataset;
use super::dataset::FieldType;
use super::error::PayloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Point,
    Arc,
    Line,
    Hexagon,
    Grid,
    Heatmap,
    Cluster,
    Geojson,
}

const POINT_COLUMNS: &[&str] = &["lat", "lng"];
const PAIR_COLUMNS: &[&str] = &["lat0", "lng0", "lat1", "lng1"];
const GEOJSON_COLUMNS: &[&str] = &["geojson"];

impl LayerType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Arc => "arc",
            Self::Line => "line",
            Self::Hexagon => "hexagon",
            Self::Grid => "grid",
            Self::Heatmap => "heatmap",
            Self::Cluster => "cluster",
            Self::Geojson => "geojson",
        }
    }

    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Point | Self::Hexagon | Self::Grid | Self::Heatmap | Self::Cluster => POINT_COLUMNS,
            Self::Arc | Self::Line => PAIR_COLUMNS,
            Self::Geojson => GEOJSON_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerVisConfig {
    pub opacity: f64,
    pub radius: f64,
    pub thickness: f64,
    pub elevation_scale: f64,
    pub enable_3d: bool,
    pub filled: bool,
    pub stroked: bool,
}

impl Default for LayerVisConfig {
    fn default() -> Self {
        Self {
            opacity: 0.8,
            radius: 10.0,
            thickness: 2.0,
            elevation_scale: 5.0,
            enable_3d: false,
            filled: true,
            stroked: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerVisConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_3d: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroked: Option<bool>,
}

impl LayerVisConfig {
    pub fn patched(&self, patch: &LayerVisConfigPatch) -> Self {
        Self {
            opacity: patch.opacity.unwrap_or(self.opacity).clamp(0.0, 1.0),
            radius: patch.radius.unwrap_or(self.radius),
            thickness: patch.thickness.unwrap_or(self.thickness),
            elevation_scale: patch.elevation_scale.unwrap_or(self.elevation_scale),
            enable_3d: patch.enable_3d.unwrap_or(self.enable_3d),
            filled: patch.filled.unwrap_or(self.filled),
            stroked: patch.stroked.unwrap_or(self.stroked),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub data_id: String,
    pub label: String,
    pub color: [u8; 3],
    pub columns: BTreeMap<String, String>,
    pub is_visible: bool,
    pub vis_config: LayerVisConfig,
    pub color_field: Option<String>,
    pub size_field: Option<String>,
}

/// Field-wise patch of a layer config; `None` leaves the field alone.
///
/// `color_field`/`size_field` use a nested option so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vis_config: Option<LayerVisConfigPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_field: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_field: Option<Option<String>>,
}

impl LayerConfig {
    pub fn patched(&self, patch: &LayerConfigPatch) -> Self {
        Self {
            data_id: patch.data_id.clone().unwrap_or_else(|| self.data_id.clone()),
            label: patch.label.clone().unwrap_or_else(|| self.label.clone()),
            color: patch.color.unwrap_or(self.color),
            columns: match &patch.columns {
                Some(columns) => {
                    let mut merged = self.columns.clone();
                    merged.extend(columns.iter().map(|(k, v)| (k.clone(), v.clone())));
                    merged
                }
                None => self.columns.clone(),
            },
            is_visible: patch.is_visible.unwrap_or(self.is_visible),
            vis_config: match &patch.vis_config {
                Some(vis) => self.vis_config.patched(vis),
                None => self.vis_config.clone(),
            },
            color_field: patch
                .color_field
                .clone()
                .unwrap_or_else(|| self.color_field.clone()),
            size_field: patch
                .size_field
                .clone()
                .unwrap_or_else(|| self.size_field.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub config: LayerConfig,
}

impl Layer {
    pub fn data_id(&self) -> &str {
        &self.config.data_id
    }

    pub fn is_visible(&self) -> bool {
        self.config.is_visible
    }

    /// Every required column is mapped to a field that exists in `dataset`.
    pub fn validate_columns(&self, dataset: &Dataset) -> Result<(), PayloadError> {
        for column in self.layer_type.required_columns() {
            let mapped = self.config.columns.get(*column).filter(|field| dataset.has_field(field));
            if mapped.is_none() {
                return Err(PayloadError::MissingColumn {
                    layer_id: self.id.clone(),
                    column: (*column).to_string(),
                });
            }
        }
        for field in [&self.config.color_field, &self.config.size_field]
            .into_iter()
            .flatten()
        {
            if !dataset.has_field(field) {
                return Err(PayloadError::UnknownField {
                    data_id: dataset.id.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Axis-aligned data bounds of the rows this layer draws.
    pub fn bounds(&self, dataset: &Dataset) -> Option<Bounds> {
        let column = |name: &str| self.config.columns.get(name).map(String::as_str);
        match self.layer_type {
            LayerType::Point
            | LayerType::Hexagon
            | LayerType::Grid
            | LayerType::Heatmap
            | LayerType::Cluster => dataset.point_bounds(column("lat")?, column("lng")?),
            LayerType::Arc | LayerType::Line => {
                let source = dataset.point_bounds(column("lat0")?, column("lng0")?);
                let target = dataset.point_bounds(column("lat1")?, column("lng1")?);
                Bounds::union_all(source.into_iter().chain(target))
            }
            LayerType::Geojson => dataset.geojson_bounds(column("geojson")?),
        }
    }

    /// Re-map this layer onto another layer type, keeping its columns when
    /// the new type can use them.
    pub fn with_type(&self, layer_type: LayerType) -> Result<Self, PayloadError> {
        let compatible = layer_type
            .required_columns()
            .iter()
            .all(|column| self.config.columns.contains_key(*column));
        if !compatible {
            return Err(PayloadError::IncompatibleLayerType {
                layer_id: self.id.clone(),
                layer_type: layer_type.label().to_string(),
            });
        }
        Ok(Self {
            layer_type,
            ..self.clone()
        })
    }
}

const LAYER_COLORS: [[u8; 3]; 8] = [
    [18, 147, 154],
    [221, 178, 124],
    [136, 87, 44],
    [231, 89, 82],
    [77, 193, 156],
    [246, 209, 138],
    [183, 136, 94],
    [255, 153, 31],
];

pub fn layer_color(slot: usize) -> [u8; 3] {
    LAYER_COLORS[slot % LAYER_COLORS.len()]
}

struct PointPair {
    prefix: String,
    lat: String,
    lng: String,
}

static LAT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*?)[_\s.-]?(lat|latitude)$").expect("LAT_FIELD pattern")
});

static LNG_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*?)[_\s.-]?(lng|lon|long|longitude)$").expect("LNG_FIELD pattern")
});

fn point_pairs(dataset: &Dataset) -> Vec<PointPair> {
    let numeric = |field_type: FieldType| field_type.is_numeric();
    let mut pairs = Vec::new();
    for lat_field in dataset.fields.iter().filter(|f| numeric(f.field_type)) {
        let Some(lat_caps) = LAT_FIELD.captures(&lat_field.name) else {
            continue;
        };
        let prefix = lat_caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let lng_field = dataset.fields.iter().find(|f| {
            numeric(f.field_type)
                && LNG_FIELD
                    .captures(&f.name)
                    .is_some_and(|caps| caps.get(1).map_or("", |m| m.as_str()).to_lowercase() == prefix)
        });
        if let Some(lng_field) = lng_field {
            pairs.push(PointPair {
                prefix,
                lat: lat_field.name.clone(),
                lng: lng_field.name.clone(),
            });
        }
    }
    pairs
}

fn columns(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(column, field)| ((*column).to_string(), (*field).to_string()))
        .collect()
}

fn new_layer(
    id: String,
    layer_type: LayerType,
    dataset: &Dataset,
    label: String,
    columns: BTreeMap<String, String>,
    visible: bool,
    color_slot: usize,
) -> Layer {
    Layer {
        id,
        layer_type,
        config: LayerConfig {
            data_id: dataset.id.clone(),
            label,
            color: layer_color(color_slot),
            columns,
            is_visible: visible,
            vis_config: LayerVisConfig::default(),
            color_field: None,
            size_field: None,
        },
    }
}

/// Layers a freshly loaded dataset gets when nothing else is configured.
///
/// One point layer per lat/lng column pair, an arc layer joining the first
/// two pairs, and one geojson layer per geojson field. Ids derive from the
/// dataset id and the columns so the same dataset always yields the same
/// layers.
pub fn find_default_layers(dataset: &Dataset, visible: bool, color_offset: usize) -> Vec<Layer> {
    let mut layers = Vec::new();
    let pairs = point_pairs(dataset);

    for pair in &pairs {
        let suffix = if pair.prefix.is_empty() {
            "point".to_string()
        } else {
            format!("point-{}", pair.prefix.trim_matches(|c: char| !c.is_alphanumeric()))
        };
        let label = if pair.prefix.is_empty() {
            "Point".to_string()
        } else {
            pair.prefix.clone()
        };
        layers.push(new_layer(
            format!("{}-{}", dataset.id, suffix),
            LayerType::Point,
            dataset,
            label,
            columns(&[("lat", &pair.lat), ("lng", &pair.lng)]),
            visible,
            color_offset + layers.len(),
        ));
    }

    if let [source, target, ..] = pairs.as_slice() {
        layers.push(new_layer(
            format!("{}-arc", dataset.id),
            LayerType::Arc,
            dataset,
            format!("{} -> {}", source.prefix, target.prefix),
            columns(&[
                ("lat0", &source.lat),
                ("lng0", &source.lng),
                ("lat1", &target.lat),
                ("lng1", &target.lng),
            ]),
            visible,
            color_offset + layers.len(),
        ));
    }

    for field in dataset
        .fields
        .iter()
        .filter(|field| field.field_type == FieldType::Geojson)
    {
        layers.push(new_layer(
            format!("{}-geojson-{}", dataset.id, field.name),
            LayerType::Geojson,
            dataset,
            field.name.clone(),
            columns(&[("geojson", &field.name)]),
            visible,
            color_offset + layers.len(),
        ));
    }

    layers
}

/// A blank layer for "add layer" without a saved config; columns are filled
/// from the first detected point pair when there is one.
pub fn empty_layer(id: String, dataset: &Dataset, color_slot: usize) -> Layer {
    let columns = point_pairs(dataset)
        .first()
        .map(|pair| columns(&[("lat", &pair.lat), ("lng", &pair.lng)]))
        .unwrap_or_default();
    new_layer(
        id,
        LayerType::Point,
        dataset,
        "new layer".to_string(),
        columns,
        true,
        color_slot,
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::dataset::DatasetPayload;
    use crate::dataset::FieldPayload;

    fn trips() -> Dataset {
        Dataset::from_payload(
            DatasetPayload {
                id: "trips".to_string(),
                label: None,
                color: None,
                fields: vec![
                    FieldPayload::new("pickup_lat", FieldType::Real),
                    FieldPayload::new("pickup_lng", FieldType::Real),
                    FieldPayload::new("dropoff_latitude", FieldType::Real),
                    FieldPayload::new("dropoff_longitude", FieldType::Real),
                    FieldPayload::new("fare", FieldType::Real),
                ],
                rows: vec![
                    vec![json!(37.7), json!(-122.4), json!(37.8), json!(-122.3), json!(12.0)],
                    vec![json!(37.6), json!(-122.5), json!(37.9), json!(-122.2), json!(7.5)],
                ],
            },
            0,
        )
        .expect("dataset")
    }

    #[test]
    fn default_layers_pair_lat_lng_columns_by_prefix() {
        let layers = find_default_layers(&trips(), true, 0);
        let ids: Vec<&str> = layers.iter().map(|layer| layer.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["trips-point-pickup", "trips-point-dropoff", "trips-arc"]
        );
        assert_eq!(
            layers[0].config.columns.get("lat").map(String::as_str),
            Some("pickup_lat")
        );
        assert_eq!(
            layers[1].config.columns.get("lng").map(String::as_str),
            Some("dropoff_longitude")
        );
    }

    #[test]
    fn coordinate_field_names_match_with_any_separator() {
        for name in ["lat", "Pickup_Lat", "dropoff.latitude", "start-lat", "endLAT"] {
            assert!(LAT_FIELD.is_match(name), "{name}");
        }
        for name in ["lng", "pickup_lon", "dropoff longitude", "endLong"] {
            assert!(LNG_FIELD.is_match(name), "{name}");
        }
        assert!(!LAT_FIELD.is_match("latency"));
        let caps = LNG_FIELD.captures("pickup_lng").expect("captures");
        assert_eq!(caps.get(1).map(|m| m.as_str()), Some("pickup"));
    }

    #[test]
    fn arc_bounds_cover_both_ends() {
        let ds = trips();
        let layers = find_default_layers(&ds, true, 0);
        let arc = layers.iter().find(|l| l.layer_type == LayerType::Arc).expect("arc");
        let bounds = arc.bounds(&ds).expect("bounds");
        assert_eq!(bounds.min_lat, 37.6);
        assert_eq!(bounds.max_lat, 37.9);
        assert_eq!(bounds.min_lng, -122.5);
        assert_eq!(bounds.max_lng, -122.2);
    }

    #[test]
    fn validate_columns_flags_unknown_fields() {
        let ds = trips();
        let mut layer = find_default_layers(&ds, true, 0).remove(0);
        layer.config.columns.insert("lat".to_string(), "missing".to_string());
        assert_eq!(
            layer.validate_columns(&ds),
            Err(PayloadError::MissingColumn {
                layer_id: "trips-point-pickup".to_string(),
                column: "lat".to_string(),
            })
        );
    }

    #[test]
    fn type_change_requires_compatible_columns() {
        let ds = trips();
        let point = find_default_layers(&ds, true, 0).remove(0);
        assert_eq!(
            point.with_type(LayerType::Hexagon).expect("same columns").layer_type,
            LayerType::Hexagon
        );
        assert!(point.with_type(LayerType::Arc).is_err());
    }

    #[test]
    fn config_patch_keeps_omitted_fields() {
        let ds = trips();
        let layer = find_default_layers(&ds, true, 0).remove(0);
        let patched = layer.config.patched(&LayerConfigPatch {
            is_visible: Some(false),
            vis_config: Some(LayerVisConfigPatch {
                opacity: Some(3.0),
                ..LayerVisConfigPatch::default()
            }),
            ..LayerConfigPatch::default()
        });
        assert!(!patched.is_visible);
        assert_eq!(patched.vis_config.opacity, 1.0);
        assert_eq!(patched.vis_config.radius, layer.config.vis_config.radius);
        assert_eq!(patched.label, layer.config.label);
    }
}
