use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::DateTime;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::error::PayloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Real,
    String,
    Boolean,
    Timestamp,
    Geojson,
    Array,
    Object,
}

impl FieldType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Geojson => "geojson",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }

    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(number) => {
                if number.is_i64() || number.is_u64() {
                    Some(Self::Integer)
                } else {
                    Some(Self::Real)
                }
            }
            Value::String(text) => {
                if DateTime::parse_from_rfc3339(text).is_ok() {
                    Some(Self::Timestamp)
                } else if serde_json::from_str::<Value>(text)
                    .ok()
                    .is_some_and(|parsed| looks_like_geojson(&parsed))
                {
                    Some(Self::Geojson)
                } else {
                    Some(Self::String)
                }
            }
            Value::Array(_) => Some(Self::Array),
            Value::Object(_) => {
                if looks_like_geojson(value) {
                    Some(Self::Geojson)
                } else {
                    Some(Self::Object)
                }
            }
        }
    }
}

fn looks_like_geojson(value: &Value) -> bool {
    value.get("type").is_some_and(Value::is_string)
        && (value.get("coordinates").is_some()
            || value.get("geometry").is_some()
            || value.get("features").is_some())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPayload {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub format: Option<String>,
}

impl FieldPayload {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type: Some(field_type),
            format: None,
        }
    }
}

/// A dataset as handed over by the import layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPayload {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<[u8; 3]>,
    pub fields: Vec<FieldPayload>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn point(lng: f64, lat: f64) -> Self {
        Self {
            min_lng: lng,
            min_lat: lat,
            max_lng: lng,
            max_lat: lat,
        }
    }

    pub fn extend(self, lng: f64, lat: f64) -> Self {
        Self {
            min_lng: self.min_lng.min(lng),
            min_lat: self.min_lat.min(lat),
            max_lng: self.max_lng.max(lng),
            max_lat: self.max_lat.max(lat),
        }
    }

    pub fn union(self, other: Bounds) -> Self {
        self.extend(other.min_lng, other.min_lat)
            .extend(other.max_lng, other.max_lat)
    }

    pub fn center(self) -> (f64, f64) {
        (
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    pub fn intersects(self, other: Bounds) -> bool {
        self.min_lng <= other.max_lng
            && other.min_lng <= self.max_lng
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn union_all(bounds: impl IntoIterator<Item = Bounds>) -> Option<Bounds> {
        bounds.into_iter().reduce(Bounds::union)
    }
}

fn valid_coordinate(lng: f64, lat: f64) -> bool {
    lng.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

const DATASET_COLORS: [[u8; 3]; 6] = [
    [143, 47, 191],
    [18, 147, 154],
    [241, 92, 23],
    [255, 203, 5],
    [130, 154, 227],
    [26, 83, 255],
];

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub label: String,
    pub color: [u8; 3],
    pub fields: Vec<Field>,
    pub rows: Arc<Vec<Vec<Value>>>,
    pub filtered_index: Vec<usize>,
}

impl Dataset {
    /// Validates an incoming payload and fills in missing field types.
    ///
    /// `color_slot` picks the fallback color when the payload has none.
    pub fn from_payload(payload: DatasetPayload, color_slot: usize) -> Result<Self, PayloadError> {
        let DatasetPayload {
            id,
            label,
            color,
            fields,
            rows,
        } = payload;

        if id.trim().is_empty() {
            return Err(PayloadError::EmptyDatasetId);
        }

        let mut seen = BTreeSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(PayloadError::DuplicateField(id.clone(), field.name.clone()));
            }
        }

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != fields.len() {
                return Err(PayloadError::RowWidthMismatch {
                    data_id: id.clone(),
                    row: row_idx,
                    expected: fields.len(),
                    actual: row.len(),
                });
            }
        }

        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(col, field)| {
                let field_type = field.field_type.unwrap_or_else(|| {
                    rows.iter()
                        .find_map(|row| FieldType::infer(&row[col]))
                        .unwrap_or(FieldType::String)
                });
                Field {
                    name: field.name,
                    field_type,
                    format: field.format,
                }
            })
            .collect();

        let all_rows = (0..rows.len()).collect();
        Ok(Self {
            label: label.unwrap_or_else(|| id.clone()),
            color: color.unwrap_or(DATASET_COLORS[color_slot % DATASET_COLORS.len()]),
            id,
            fields,
            rows: Arc::new(rows),
            filtered_index: all_rows,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.field_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Min/max over the numeric values of `name`, ignoring nulls.
    pub fn numeric_domain(&self, name: &str) -> Option<[f64; 2]> {
        let values = self.column(name)?.filter_map(value_as_f64);
        values.fold(None, |acc, value| match acc {
            None => Some([value, value]),
            Some([lo, hi]) => Some([lo.min(value), hi.max(value)]),
        })
    }

    pub fn point_bounds(&self, lat: &str, lng: &str) -> Option<Bounds> {
        let lat_idx = self.field_index(lat)?;
        let lng_idx = self.field_index(lng)?;
        let points = self.rows.iter().filter_map(|row| {
            let lat = value_as_f64(&row[lat_idx])?;
            let lng = value_as_f64(&row[lng_idx])?;
            valid_coordinate(lng, lat).then(|| Bounds::point(lng, lat))
        });
        Bounds::union_all(points)
    }

    pub fn geojson_bounds(&self, column: &str) -> Option<Bounds> {
        let idx = self.field_index(column)?;
        let per_row = self.rows.iter().filter_map(|row| match &row[idx] {
            Value::String(text) => serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|parsed| geometry_bounds(&parsed)),
            other => geometry_bounds(other),
        });
        Bounds::union_all(per_row)
    }

    pub fn with_filtered_index(&self, filtered_index: Vec<usize>) -> Self {
        Self {
            filtered_index,
            ..self.clone()
        }
    }
}

fn geometry_bounds(value: &Value) -> Option<Bounds> {
    match value {
        Value::Array(items) => {
            if let [Value::Number(lng), Value::Number(lat), ..] = items.as_slice() {
                let (lng, lat) = (lng.as_f64()?, lat.as_f64()?);
                return valid_coordinate(lng, lat).then(|| Bounds::point(lng, lat));
            }
            Bounds::union_all(items.iter().filter_map(geometry_bounds))
        }
        Value::Object(map) => {
            let nested = ["coordinates", "geometry", "geometries", "features"]
                .iter()
                .filter_map(|key| map.get(*key))
                .filter_map(geometry_bounds);
            Bounds::union_all(nested)
        }
        _ => None,
    }
}

/// Numeric view of a cell; RFC 3339 strings become epoch milliseconds.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|ts| ts.timestamp_millis() as f64)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn payload() -> DatasetPayload {
        DatasetPayload {
            id: "trips".to_string(),
            label: None,
            color: None,
            fields: vec![
                FieldPayload::new("lat", FieldType::Real),
                FieldPayload {
                    name: "lng".to_string(),
                    field_type: None,
                    format: None,
                },
                FieldPayload {
                    name: "when".to_string(),
                    field_type: None,
                    format: None,
                },
            ],
            rows: vec![
                vec![json!(37.7), json!(-122.4), json!("2024-01-01T00:00:00Z")],
                vec![json!(37.9), json!(-122.1), json!("2024-01-02T00:00:00Z")],
            ],
        }
    }

    #[test]
    fn missing_field_types_are_inferred_from_rows() {
        let dataset = Dataset::from_payload(payload(), 0).expect("valid");
        let types: Vec<FieldType> = dataset.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(
            types,
            vec![FieldType::Real, FieldType::Real, FieldType::Timestamp]
        );
        assert_eq!(dataset.label, "trips");
        assert_eq!(dataset.filtered_index, vec![0, 1]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut bad = payload();
        bad.rows.push(vec![json!(1.0)]);
        let err = Dataset::from_payload(bad, 0).expect_err("ragged");
        assert_eq!(
            err,
            PayloadError::RowWidthMismatch {
                data_id: "trips".to_string(),
                row: 2,
                expected: 3,
                actual: 1,
            }
        );
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let mut bad = payload();
        bad.fields[1].name = "lat".to_string();
        assert!(matches!(
            Dataset::from_payload(bad, 0),
            Err(PayloadError::DuplicateField(_, _))
        ));
    }

    #[test]
    fn point_bounds_cover_every_row() {
        let dataset = Dataset::from_payload(payload(), 0).expect("valid");
        let bounds = dataset.point_bounds("lat", "lng").expect("bounds");
        assert_eq!(
            bounds,
            Bounds {
                min_lng: -122.4,
                min_lat: 37.7,
                max_lng: -122.1,
                max_lat: 37.9,
            }
        );
    }

    #[test]
    fn geojson_bounds_walk_nested_coordinates() {
        let dataset = Dataset::from_payload(
            DatasetPayload {
                id: "zones".to_string(),
                label: None,
                color: None,
                fields: vec![FieldPayload {
                    name: "geometry".to_string(),
                    field_type: None,
                    format: None,
                }],
                rows: vec![vec![json!({
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 3.0], [0.0, 0.0]]]
                })]],
            },
            0,
        )
        .expect("valid");
        assert_eq!(dataset.fields[0].field_type, FieldType::Geojson);
        let bounds = dataset.geojson_bounds("geometry").expect("bounds");
        assert_eq!(bounds, Bounds { min_lng: 0.0, min_lat: 0.0, max_lng: 2.0, max_lat: 3.0 });
    }

    #[test]
    fn timestamps_read_as_epoch_millis() {
        assert_eq!(
            value_as_f64(&json!("1970-01-01T00:00:01Z")),
            Some(1000.0)
        );
        assert_eq!(value_as_f64(&json!("2.5")), Some(2.5));
        assert_eq!(value_as_f64(&json!(true)), None);
    }
}
