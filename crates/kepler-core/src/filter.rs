use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::dataset::value_as_f64;
use super::dataset::Dataset;
use super::dataset::FieldType;
use super::error::PayloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    Range,
    TimeRange,
    Select,
    MultiSelect,
    Input,
}

impl FilterType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::TimeRange => "timeRange",
            Self::Select => "select",
            Self::MultiSelect => "multiSelect",
            Self::Input => "input",
        }
    }

    pub fn for_field(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer | FieldType::Real => Self::Range,
            FieldType::Timestamp => Self::TimeRange,
            FieldType::Boolean => Self::Select,
            FieldType::String => Self::MultiSelect,
            FieldType::Geojson | FieldType::Array | FieldType::Object => Self::Input,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Range([f64; 2]),
    Select(bool),
    Multi(Vec<Value>),
    Text(String),
}

impl FilterValue {
    /// Coerces `self` into the shape `filter_type` expects.
    pub fn coerce(self, filter_type: FilterType) -> Option<Self> {
        match (filter_type, self) {
            (FilterType::Range | FilterType::TimeRange, Self::Range([lo, hi])) => {
                Some(Self::Range([lo.min(hi), lo.max(hi)]))
            }
            (FilterType::Select, Self::Select(selected)) => Some(Self::Select(selected)),
            (FilterType::MultiSelect, Self::Multi(values)) => Some(Self::Multi(values)),
            (FilterType::MultiSelect, Self::Range([a, b])) => {
                Some(Self::Multi(vec![Value::from(a), Value::from(b)]))
            }
            (FilterType::MultiSelect, Self::Text(text)) => {
                Some(Self::Multi(vec![Value::String(text)]))
            }
            (FilterType::Input, Self::Text(text)) => Some(Self::Text(text)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub id: String,
    pub data_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub value: Option<FilterValue>,
    pub domain: Option<[f64; 2]>,
    pub enlarged: bool,
    pub is_animating: bool,
    pub speed: f64,
}

pub const DEFAULT_ANIMATION_SPEED: f64 = 1.0;

impl Filter {
    /// A filter on `field` of `dataset` with no value yet.
    pub fn for_field(id: String, dataset: &Dataset, field: &str) -> Result<Self, PayloadError> {
        let spec = dataset.field(field).ok_or_else(|| PayloadError::UnknownField {
            data_id: dataset.id.clone(),
            field: field.to_string(),
        })?;
        let filter_type = FilterType::for_field(spec.field_type);
        Ok(Self {
            id,
            data_id: dataset.id.clone(),
            name: field.to_string(),
            filter_type,
            value: None,
            domain: domain_for(dataset, field, filter_type),
            enlarged: false,
            is_animating: false,
            speed: DEFAULT_ANIMATION_SPEED,
        })
    }

    /// A filter with no field picked yet, as created by an "add filter" click.
    pub fn unbound(id: String, data_id: &str) -> Self {
        Self {
            id,
            data_id: data_id.to_string(),
            name: String::new(),
            filter_type: FilterType::Input,
            value: None,
            domain: None,
            enlarged: false,
            is_animating: false,
            speed: DEFAULT_ANIMATION_SPEED,
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.is_bound() && self.value.is_some()
    }

    pub fn with_value(&self, value: FilterValue) -> Result<Self, PayloadError> {
        let value = value
            .coerce(self.filter_type)
            .ok_or_else(|| PayloadError::InvalidFilterValue(self.id.clone()))?;
        Ok(Self {
            value: Some(value),
            ..self.clone()
        })
    }

    pub fn matches(&self, cell: &Value) -> bool {
        let Some(value) = self.value.as_ref() else {
            return true;
        };
        match value {
            FilterValue::Range([lo, hi]) => {
                value_as_f64(cell).is_some_and(|number| *lo <= number && number <= *hi)
            }
            FilterValue::Select(selected) => cell.as_bool() == Some(*selected),
            FilterValue::Multi(options) => options.iter().any(|option| loosely_equal(option, cell)),
            FilterValue::Text(needle) => {
                let needle = needle.to_lowercase();
                match cell {
                    Value::String(text) => text.to_lowercase().contains(&needle),
                    Value::Null => false,
                    other => other.to_string().to_lowercase().contains(&needle),
                }
            }
        }
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (value_as_f64(a), value_as_f64(b)) {
        (Some(x), Some(y)) if a.is_number() || b.is_number() => x == y,
        _ => a == b,
    }
}

pub fn domain_for(dataset: &Dataset, field: &str, filter_type: FilterType) -> Option<[f64; 2]> {
    match filter_type {
        FilterType::Range | FilterType::TimeRange => dataset.numeric_domain(field),
        FilterType::Select | FilterType::MultiSelect | FilterType::Input => None,
    }
}

/// Row indices of `dataset` passing every active filter that targets it.
pub fn filtered_index<'a>(dataset: &Dataset, filters: impl IntoIterator<Item = &'a Filter>) -> Vec<usize> {
    let active: Vec<(usize, &Filter)> = filters
        .into_iter()
        .filter(|filter| filter.data_id == dataset.id && filter.is_active())
        .filter_map(|filter| dataset.field_index(&filter.name).map(|idx| (idx, filter)))
        .collect();

    if active.is_empty() {
        return (0..dataset.row_count()).collect();
    }

    dataset
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| active.iter().all(|(idx, filter)| filter.matches(&row[*idx])))
        .map(|(row_idx, _)| row_idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::dataset::DatasetPayload;
    use crate::dataset::FieldPayload;

    fn dataset() -> Dataset {
        Dataset::from_payload(
            DatasetPayload {
                id: "ds".to_string(),
                label: None,
                color: None,
                fields: vec![
                    FieldPayload::new("x", FieldType::Real),
                    FieldPayload::new("kind", FieldType::String),
                    FieldPayload::new("ok", FieldType::Boolean),
                ],
                rows: vec![
                    vec![json!(1.0), json!("a"), json!(true)],
                    vec![json!(5.0), json!("b"), json!(false)],
                    vec![json!(12.0), json!("a"), json!(true)],
                ],
            },
            0,
        )
        .expect("dataset")
    }

    #[test]
    fn range_filter_keeps_rows_inside_bounds() {
        let ds = dataset();
        let filter = Filter::for_field("f1".to_string(), &ds, "x")
            .expect("field")
            .with_value(FilterValue::Range([10.0, 0.0]))
            .expect("range");
        assert_eq!(filter.value, Some(FilterValue::Range([0.0, 10.0])));
        assert_eq!(filter.domain, Some([1.0, 12.0]));
        assert_eq!(filtered_index(&ds, [&filter]), vec![0, 1]);
    }

    #[test]
    fn filters_compose_with_and() {
        let ds = dataset();
        let kind = Filter::for_field("f1".to_string(), &ds, "kind")
            .expect("field")
            .with_value(FilterValue::Multi(vec![json!("a")]))
            .expect("multi");
        let ok = Filter::for_field("f2".to_string(), &ds, "ok")
            .expect("field")
            .with_value(FilterValue::Select(true))
            .expect("select");
        assert_eq!(kind.filter_type, FilterType::MultiSelect);
        assert_eq!(filtered_index(&ds, [&kind, &ok]), vec![0, 2]);
    }

    #[test]
    fn filters_without_value_pass_everything() {
        let ds = dataset();
        let filter = Filter::for_field("f1".to_string(), &ds, "x").expect("field");
        assert!(!filter.is_active());
        assert_eq!(filtered_index(&ds, [&filter]), vec![0, 1, 2]);
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let ds = dataset();
        let filter = Filter::for_field("f1".to_string(), &ds, "ok").expect("field");
        let err = filter
            .with_value(FilterValue::Range([0.0, 1.0]))
            .expect_err("select needs bool");
        assert_eq!(err, PayloadError::InvalidFilterValue("f1".to_string()));
    }

    #[test]
    fn untagged_value_reads_saved_shapes() {
        let range: FilterValue = serde_json::from_value(json!([0, 10])).expect("range");
        assert_eq!(range, FilterValue::Range([0.0, 10.0]));
        let multi: FilterValue = serde_json::from_value(json!(["a", "b"])).expect("multi");
        assert_eq!(multi, FilterValue::Multi(vec![json!("a"), json!("b")]));
    }
}
