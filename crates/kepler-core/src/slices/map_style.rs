use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::changed;
use super::settle;
use crate::actions::Action;
use crate::actions::MapStyleAction;
use crate::config::StyleConfig;
use crate::diagnostics::Diagnostics;
use crate::error::PayloadError;
use crate::root::SliceKey;
use crate::saved::SavedMapStyle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStyleEntry {
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub custom: bool,
}

const DEFAULT_STYLES: &[(&str, &str, &str)] = &[
    ("dark", "Dark", "mapbox://styles/uberdata/cjoqbbf6l9k302sl96tyvka09"),
    ("light", "Light", "mapbox://styles/uberdata/cjoqb9j339k1f2sl9t5ic5bn4"),
    ("muted", "Muted Light", "mapbox://styles/uberdata/cjfyl03kp1tul2smf5v2tbdd4"),
    ("muted_night", "Muted Night", "mapbox://styles/uberdata/cjfxhlikmaj1b2soyzevnywgs"),
    ("satellite", "Satellite", "mapbox://styles/mapbox/satellite-v9"),
];

const LAYER_GROUPS: &[&str] = &["label", "road", "border", "building", "water", "land"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStyle {
    pub style_type: String,
    pub visible_layer_groups: BTreeMap<String, bool>,
    pub top_layer_groups: BTreeMap<String, bool>,
    pub map_styles: BTreeMap<String, MapStyleEntry>,
    pub three_d_building_color: [u8; 3],
    pub background_color: [u8; 3],
}

impl MapStyle {
    pub fn new(config: &StyleConfig) -> Self {
        let map_styles = DEFAULT_STYLES
            .iter()
            .map(|(id, label, url)| {
                (
                    (*id).to_string(),
                    MapStyleEntry {
                        label: (*label).to_string(),
                        url: (*url).to_string(),
                        custom: false,
                    },
                )
            })
            .collect();
        Self {
            style_type: config.default_style.clone(),
            visible_layer_groups: LAYER_GROUPS
                .iter()
                .map(|group| ((*group).to_string(), true))
                .collect(),
            top_layer_groups: BTreeMap::new(),
            map_styles,
            three_d_building_color: config.three_d_building_color,
            background_color: config.background_color,
        }
    }

    pub fn current(&self) -> Option<&MapStyleEntry> {
        self.map_styles.get(&self.style_type)
    }
}

pub fn reduce(
    state: &Arc<MapStyle>,
    initial: &Arc<MapStyle>,
    action: &Action,
    diagnostics: &mut Diagnostics,
) -> Arc<MapStyle> {
    let result = match action {
        Action::MapStyle(action) => match action {
            MapStyleAction::MapStyleChange { style_type } => map_style_change(state, style_type),
            MapStyleAction::MapConfigChange {
                visible_layer_groups,
                top_layer_groups,
            } => Ok(map_config_change(
                state,
                visible_layer_groups.as_ref(),
                top_layer_groups.as_ref(),
            )),
            MapStyleAction::LoadMapStyles { styles } => Ok(load_map_styles(state, styles)),
            MapStyleAction::AddCustomMapStyle { id, style } => {
                Ok(add_custom_map_style(state, id, style))
            }
            MapStyleAction::Set3dBuildingColor { color } => Ok(changed(
                state,
                MapStyle {
                    three_d_building_color: *color,
                    ..(**state).clone()
                },
            )),
            MapStyleAction::SetBackgroundColor { color } => Ok(changed(
                state,
                MapStyle {
                    background_color: *color,
                    ..(**state).clone()
                },
            )),
        },
        // Custom styles survive a reset.
        Action::ResetMapConfig => {
            let mut next = (**initial).clone();
            next.map_styles.extend(
                state
                    .map_styles
                    .iter()
                    .filter(|(_, entry)| entry.custom)
                    .map(|(id, entry)| (id.clone(), entry.clone())),
            );
            Ok(changed(state, next))
        }
        _ => return Arc::clone(state),
    };
    settle(state, SliceKey::MapStyle, result, diagnostics)
}

pub fn map_style_change(
    state: &Arc<MapStyle>,
    style_type: &str,
) -> Result<Arc<MapStyle>, PayloadError> {
    if !state.map_styles.contains_key(style_type) {
        return Err(PayloadError::UnknownMapStyle(style_type.to_string()));
    }
    Ok(changed(
        state,
        MapStyle {
            style_type: style_type.to_string(),
            ..(**state).clone()
        },
    ))
}

pub fn map_config_change(
    state: &Arc<MapStyle>,
    visible_layer_groups: Option<&BTreeMap<String, bool>>,
    top_layer_groups: Option<&BTreeMap<String, bool>>,
) -> Arc<MapStyle> {
    let mut next = (**state).clone();
    if let Some(groups) = visible_layer_groups {
        next.visible_layer_groups
            .extend(groups.iter().map(|(k, v)| (k.clone(), *v)));
    }
    if let Some(groups) = top_layer_groups {
        next.top_layer_groups
            .extend(groups.iter().map(|(k, v)| (k.clone(), *v)));
    }
    changed(state, next)
}

pub fn load_map_styles(
    state: &Arc<MapStyle>,
    styles: &BTreeMap<String, MapStyleEntry>,
) -> Arc<MapStyle> {
    let mut next = (**state).clone();
    next.map_styles
        .extend(styles.iter().map(|(id, entry)| (id.clone(), entry.clone())));
    changed(state, next)
}

pub fn add_custom_map_style(state: &Arc<MapStyle>, id: &str, style: &MapStyleEntry) -> Arc<MapStyle> {
    let mut next = (**state).clone();
    next.map_styles.insert(
        id.to_string(),
        MapStyleEntry {
            custom: true,
            ..style.clone()
        },
    );
    next.style_type = id.to_string();
    changed(state, next)
}

/// Applies a saved style section. Styles carried by the config are loaded
/// before the selected style is checked against the catalog.
pub fn receive_map_style(
    state: &Arc<MapStyle>,
    saved: &SavedMapStyle,
) -> Result<Arc<MapStyle>, PayloadError> {
    let mut next = (**state).clone();
    if let Some(styles) = &saved.map_styles {
        for (id, entry) in styles {
            next.map_styles.insert(
                id.clone(),
                MapStyleEntry {
                    label: entry.label.clone(),
                    url: entry.url.clone(),
                    custom: true,
                },
            );
        }
    }
    if let Some(style_type) = &saved.style_type {
        if !next.map_styles.contains_key(style_type) {
            return Err(PayloadError::UnknownMapStyle(style_type.clone()));
        }
        next.style_type = style_type.clone();
    }
    if let Some(groups) = &saved.visible_layer_groups {
        next.visible_layer_groups = groups.clone();
    }
    if let Some(groups) = &saved.top_layer_groups {
        next.top_layer_groups = groups.clone();
    }
    if let Some(color) = saved.three_d_building_color {
        next.three_d_building_color = color;
    }
    if let Some(color) = saved.background_color {
        next.background_color = color;
    }
    Ok(changed(state, next))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn state() -> Arc<MapStyle> {
        Arc::new(MapStyle::new(&StyleConfig::default()))
    }

    #[test]
    fn unknown_style_is_rejected_without_touching_state() {
        let start = state();
        let mut diagnostics = Diagnostics::new();
        let action = Action::MapStyle(MapStyleAction::MapStyleChange {
            style_type: "neon".to_string(),
        });
        let next = reduce(&start, &start, &action, &mut diagnostics);
        assert!(Arc::ptr_eq(&start, &next));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn selecting_the_current_style_keeps_the_allocation() {
        let start = state();
        let next = map_style_change(&start, "dark").expect("known");
        assert!(Arc::ptr_eq(&start, &next));
    }

    #[test]
    fn custom_styles_survive_reset() {
        let initial = state();
        let custom = add_custom_map_style(
            &initial,
            "mine",
            &MapStyleEntry {
                label: "Mine".to_string(),
                url: "mapbox://styles/me/mine".to_string(),
                custom: false,
            },
        );
        assert_eq!(custom.style_type, "mine");
        let mut diagnostics = Diagnostics::new();
        let reset = reduce(&custom, &initial, &Action::ResetMapConfig, &mut diagnostics);
        assert_eq!(reset.style_type, "dark");
        assert!(reset.map_styles.get("mine").is_some_and(|entry| entry.custom));
    }

    #[test]
    fn saved_style_may_bring_its_own_catalog_entry() {
        let saved = SavedMapStyle {
            style_type: Some("night".to_string()),
            map_styles: Some(BTreeMap::from([(
                "night".to_string(),
                crate::saved::SavedStyleEntry {
                    label: "Night".to_string(),
                    url: "mapbox://styles/me/night".to_string(),
                },
            )])),
            ..SavedMapStyle::default()
        };
        let next = receive_map_style(&state(), &saved).expect("style");
        assert_eq!(next.current().map(|entry| entry.label.as_str()), Some("Night"));
    }
}
