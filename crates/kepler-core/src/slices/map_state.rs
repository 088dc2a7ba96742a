use std::f64::consts::PI;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::changed;
use super::settle;
use crate::actions::Action;
use crate::actions::MapStateAction;
use crate::actions::ViewportPatch;
use crate::config::MapConfig;
use crate::dataset::Bounds;
use crate::diagnostics::Diagnostics;
use crate::error::PayloadError;
use crate::root::SliceKey;
use crate::saved::SavedMapState;

const MAX_LATITUDE: f64 = 85.051129;
const MAX_ZOOM: f64 = 20.0;
const MAX_PITCH: f64 = 60.0;
const PERSPECTIVE_PITCH: f64 = 50.0;
const PERSPECTIVE_BEARING: f64 = 24.0;
const TILE_SIZE: f64 = 512.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Viewport {
    fn patched(self, patch: &ViewportPatch) -> Self {
        Self {
            latitude: patch
                .latitude
                .unwrap_or(self.latitude)
                .clamp(-MAX_LATITUDE, MAX_LATITUDE),
            longitude: patch.longitude.unwrap_or(self.longitude),
            zoom: patch.zoom.unwrap_or(self.zoom).clamp(0.0, MAX_ZOOM),
            pitch: patch.pitch.unwrap_or(self.pitch).clamp(0.0, MAX_PITCH),
            bearing: patch.bearing.unwrap_or(self.bearing),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
    pub width: f64,
    pub height: f64,
    pub drag_rotate: bool,
    /// Data bounds the viewport was last fitted to.
    pub bounds: Option<Bounds>,
    pub is_split: bool,
    pub is_viewport_synced: bool,
    pub split_map_viewports: Vec<Viewport>,
    /// Pitch and bearing to restore when perspective is switched off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) saved_perspective: Option<(f64, f64)>,
}

impl MapState {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            latitude: config.latitude,
            longitude: config.longitude,
            zoom: config.zoom,
            pitch: config.pitch,
            bearing: config.bearing,
            width: config.width,
            height: config.height,
            drag_rotate: config.drag_rotate,
            bounds: None,
            is_split: false,
            is_viewport_synced: true,
            split_map_viewports: Vec::new(),
            saved_perspective: None,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            latitude: self.latitude,
            longitude: self.longitude,
            zoom: self.zoom,
            pitch: self.pitch,
            bearing: self.bearing,
        }
    }

    fn with_viewport(&self, viewport: Viewport) -> Self {
        Self {
            latitude: viewport.latitude,
            longitude: viewport.longitude,
            zoom: viewport.zoom,
            pitch: viewport.pitch,
            bearing: viewport.bearing,
            ..self.clone()
        }
    }

    /// Geographic extent currently on screen, ignoring pitch and bearing.
    pub fn visible_bounds(&self) -> Bounds {
        let world = TILE_SIZE * self.zoom.exp2();
        let half_lng = self.width / world * 180.0;
        let center_y = mercator_y(self.latitude);
        let half_y = self.height / world * PI;
        Bounds {
            min_lng: (self.longitude - half_lng).max(-180.0),
            max_lng: (self.longitude + half_lng).min(180.0),
            min_lat: inverse_mercator_y(center_y - half_y),
            max_lat: inverse_mercator_y(center_y + half_y),
        }
    }
}

fn mercator_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    (PI / 4.0 + lat / 2.0).tan().ln()
}

fn inverse_mercator_y(y: f64) -> f64 {
    (2.0 * y.exp().atan() - PI / 2.0)
        .to_degrees()
        .clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

pub fn reduce(
    state: &Arc<MapState>,
    initial: &Arc<MapState>,
    action: &Action,
    diagnostics: &mut Diagnostics,
) -> Arc<MapState> {
    let result = match action {
        Action::MapState(action) => match action {
            MapStateAction::UpdateMap {
                viewport,
                map_index,
            } => update_map(state, viewport, *map_index),
            MapStateAction::FitBounds(bounds) => Ok(changed(state, fit_bounds(state, *bounds))),
            MapStateAction::TogglePerspective => Ok(Arc::new(toggle_perspective(state))),
            MapStateAction::UpdateMapSize { width, height } => update_map_size(state, *width, *height),
            MapStateAction::ToggleViewportSync => Ok(Arc::new(toggle_viewport_sync(state))),
        },
        Action::ResetMapConfig => Ok(changed(
            state,
            MapState {
                width: state.width,
                height: state.height,
                ..(**initial).clone()
            },
        )),
        Action::ToggleSplitMap { index } => Ok(Arc::new(toggle_split_map(state, *index))),
        _ => return Arc::clone(state),
    };
    settle(state, SliceKey::MapState, result, diagnostics)
}

pub fn update_map(
    state: &Arc<MapState>,
    patch: &ViewportPatch,
    map_index: Option<usize>,
) -> Result<Arc<MapState>, PayloadError> {
    let split_target = map_index.filter(|_| state.is_split && !state.is_viewport_synced);
    let next = match split_target {
        Some(index) => {
            let current = state
                .split_map_viewports
                .get(index)
                .ok_or(PayloadError::SplitMapIndex(index))?;
            let mut viewports = state.split_map_viewports.clone();
            viewports[index] = current.patched(patch);
            MapState {
                split_map_viewports: viewports,
                ..(**state).clone()
            }
        }
        None => {
            let viewport = state.viewport().patched(patch);
            let mut next = state.with_viewport(viewport);
            if next.is_split {
                next.split_map_viewports = vec![viewport; next.split_map_viewports.len()];
            }
            next
        }
    };
    Ok(changed(state, next))
}

/// Centers on `bounds` and picks the largest zoom that shows all of it.
pub fn fit_bounds(state: &MapState, bounds: Bounds) -> MapState {
    let (longitude, latitude) = bounds.center();
    let lng_span = (bounds.max_lng - bounds.min_lng).abs();
    let y_span = (mercator_y(bounds.max_lat) - mercator_y(bounds.min_lat)).abs();

    let zoom_for = |pixels: f64, world_span: f64, span: f64| {
        if span <= f64::EPSILON {
            MAX_ZOOM
        } else {
            (pixels / TILE_SIZE * world_span / span).log2()
        }
    };
    let zoom = zoom_for(state.width, 360.0, lng_span)
        .min(zoom_for(state.height, 2.0 * PI, y_span))
        .clamp(0.0, MAX_ZOOM);

    let viewport = Viewport {
        latitude: latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE),
        longitude,
        zoom,
        pitch: state.pitch,
        bearing: state.bearing,
    };
    let mut next = state.with_viewport(viewport);
    next.bounds = Some(bounds);
    if next.is_split {
        next.split_map_viewports = vec![viewport; next.split_map_viewports.len()];
    }
    next
}

pub fn toggle_perspective(state: &MapState) -> MapState {
    let mut next = state.clone();
    if state.drag_rotate {
        let (pitch, bearing) = state.saved_perspective.unwrap_or((0.0, 0.0));
        next.pitch = pitch;
        next.bearing = bearing;
        next.saved_perspective = None;
    } else {
        next.saved_perspective = Some((state.pitch, state.bearing));
        next.pitch = PERSPECTIVE_PITCH;
        next.bearing = PERSPECTIVE_BEARING;
    }
    next.drag_rotate = !state.drag_rotate;
    next
}

pub fn update_map_size(
    state: &Arc<MapState>,
    width: f64,
    height: f64,
) -> Result<Arc<MapState>, PayloadError> {
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(PayloadError::InvalidMapSize(format!("{width}x{height}")));
    }
    Ok(changed(
        state,
        MapState {
            width,
            height,
            ..(**state).clone()
        },
    ))
}

pub fn toggle_viewport_sync(state: &MapState) -> MapState {
    let mut next = state.clone();
    next.is_viewport_synced = !state.is_viewport_synced;
    if next.is_viewport_synced && next.is_split {
        next.split_map_viewports = vec![state.viewport(); state.split_map_viewports.len()];
    }
    next
}

/// Entering split mode clones the main viewport into two panes; leaving it
/// keeps the viewport of pane `index` when one is given.
pub fn toggle_split_map(state: &MapState, index: Option<usize>) -> MapState {
    if state.is_split {
        let kept = index
            .and_then(|index| state.split_map_viewports.get(index).copied())
            .unwrap_or_else(|| state.viewport());
        MapState {
            is_split: false,
            split_map_viewports: Vec::new(),
            ..state.with_viewport(kept)
        }
    } else {
        MapState {
            is_split: true,
            split_map_viewports: vec![state.viewport(); 2],
            ..state.clone()
        }
    }
}

pub fn receive_map_state(state: &Arc<MapState>, saved: &SavedMapState) -> Arc<MapState> {
    let patch = ViewportPatch {
        latitude: saved.latitude,
        longitude: saved.longitude,
        zoom: saved.zoom,
        pitch: saved.pitch,
        bearing: saved.bearing,
    };
    let mut next = state.with_viewport(state.viewport().patched(&patch));
    if let Some(drag_rotate) = saved.drag_rotate {
        next.drag_rotate = drag_rotate;
    }
    if let Some(is_split) = saved.is_split {
        if is_split != next.is_split {
            next = toggle_split_map(&next, None);
        }
    }
    changed(state, next)
}
