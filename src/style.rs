use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Paint properties whose zero value means a style layer draws nothing.
pub const DEFAULT_PAINT_PROPERTIES: &[&str] = &[
    "fill-opacity",
    "fill-outline-color",
    "line-opacity",
    "line-width",
    "icon-size",
    "text-size",
    "text-max-width",
    "text-opacity",
    "raster-opacity",
    "circle-radius",
    "circle-opacity",
    "fill-extrusion-opacity",
    "heatmap-opacity",
];

/// A paint value as far as zero checks go.
#[derive(Debug, Clone)]
enum ZoomedNumber {
    Constant(f64),
    /// Stop function values keyed by integral zoom.
    Stepped(BTreeMap<u8, f64>),
}

impl ZoomedNumber {
    /// Value known to apply at `zoom`. Stop functions only answer for a stop
    /// placed exactly on `zoom`; there is no interpolation.
    fn at(&self, zoom: u8) -> Option<f64> {
        match self {
            ZoomedNumber::Constant(value) => Some(*value),
            ZoomedNumber::Stepped(stops) => stops.get(&zoom).copied(),
        }
    }
}

/// The parts of one style layer that decide whether it draws at a zoom.
#[derive(Debug, Clone)]
struct StyleRule {
    minzoom: Option<f64>,
    /// Exclusive.
    maxzoom: Option<f64>,
    hidden: bool,
    paint: HashMap<String, ZoomedNumber>,
}

impl StyleRule {
    fn parse(layer: &Value) -> Self {
        let zoom_bound = |name: &str| layer.get(name).and_then(Value::as_f64);
        let hidden = layer
            .pointer("/layout/visibility")
            .and_then(Value::as_str)
            == Some("none");
        let paint = layer
            .get("paint")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, value)| Some((name.clone(), parse_zoomed_number(value)?)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            minzoom: zoom_bound("minzoom"),
            maxzoom: zoom_bound("maxzoom"),
            hidden,
            paint,
        }
    }

    fn in_zoom_range(&self, zoom: u8) -> bool {
        let zoom = f64::from(zoom);
        self.minzoom.is_none_or(|min| zoom >= min) && self.maxzoom.is_none_or(|max| zoom < max)
    }

    fn draws_at(&self, zoom: u8, zero_properties: &[String]) -> bool {
        if self.hidden || !self.in_zoom_range(zoom) {
            return false;
        }
        zero_properties.iter().all(|name| {
            self.paint
                .get(name)
                .and_then(|value| value.at(zoom))
                .is_none_or(|value| value != 0.0)
        })
    }
}

/// Style document reduced to what decides whether a data layer is drawn.
#[derive(Debug, Clone)]
pub struct MapboxStyle {
    rules_by_source_layer: HashMap<String, Vec<StyleRule>>,
    layer_ids_by_source: BTreeMap<String, Vec<String>>,
    paint_properties: Vec<String>,
}

impl MapboxStyle {
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_value_with_properties(
            value,
            DEFAULT_PAINT_PROPERTIES.iter().map(|prop| prop.to_string()),
        )
    }

    /// Build a style that checks `paint_properties` instead of [`DEFAULT_PAINT_PROPERTIES`].
    pub fn from_value_with_properties(
        value: &Value,
        paint_properties: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        parse_style(value, paint_properties.into_iter().collect())
            .map_err(|reason| Error::StyleLoad {
                origin: "inline document".to_string(),
                reason,
            })
    }

    pub fn source_layers(&self) -> HashSet<String> {
        self.rules_by_source_layer.keys().cloned().collect()
    }

    /// Style layer ids grouped by their `source`; layers without one are left out.
    pub fn layer_ids_by_source(&self) -> &BTreeMap<String, Vec<String>> {
        &self.layer_ids_by_source
    }

    pub fn layer_names_from_source(&self, source: &str) -> Option<&[String]> {
        self.layer_ids_by_source.get(source).map(Vec::as_slice)
    }

    /// A data layer is visible when any style layer drawing from it is visible and rendered.
    ///
    /// Data layers no style layer draws from are never visible.
    pub fn is_layer_visible_on_level(&self, layer_name: &str, zoom: u8) -> bool {
        self.rules_by_source_layer
            .get(layer_name)
            .is_some_and(|rules| rules.iter().any(|rule| rule.draws_at(zoom, &self.paint_properties)))
    }
}

fn parse_zoomed_number(value: &Value) -> Option<ZoomedNumber> {
    if let Some(number) = value.as_f64() {
        return Some(ZoomedNumber::Constant(number));
    }
    let stops = value
        .get("stops")?
        .as_array()?
        .iter()
        .filter_map(|stop| match stop.as_array()?.as_slice() {
            [zoom, value, ..] => {
                let zoom = zoom.as_f64()?;
                let integral = zoom.fract() == 0.0 && (0.0..=255.0).contains(&zoom);
                integral.then_some((zoom as u8, value.as_f64()?))
            }
            _ => None,
        })
        .collect::<BTreeMap<_, _>>();
    (!stops.is_empty()).then_some(ZoomedNumber::Stepped(stops))
}

fn parse_style(value: &Value, paint_properties: Vec<String>) -> Result<MapboxStyle, String> {
    let layers = value
        .get("layers")
        .and_then(|layers| layers.as_array())
        .ok_or_else(|| "style json missing layers array".to_string())?;

    let mut rules_by_source_layer: HashMap<String, Vec<StyleRule>> = HashMap::new();
    let mut layer_ids_by_source: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for layer in layers {
        // Background layers have no source.
        let Some(source) = layer.get("source").and_then(|v| v.as_str()) else {
            continue;
        };
        if let Some(id) = layer.get("id").and_then(|v| v.as_str()) {
            layer_ids_by_source
                .entry(source.to_string())
                .or_default()
                .push(id.to_string());
        }
        let Some(source_layer) = layer.get("source-layer").and_then(|v| v.as_str()) else {
            continue;
        };
        rules_by_source_layer
            .entry(source_layer.to_string())
            .or_default()
            .push(StyleRule::parse(layer));
    }

    if rules_by_source_layer.is_empty() {
        warn!("style draws from no source-layer; every data layer counts as hidden");
    }
    Ok(MapboxStyle {
        rules_by_source_layer,
        layer_ids_by_source,
        paint_properties,
    })
}

pub fn read_style(path: &Path) -> Result<MapboxStyle> {
    let load_err = |reason: String| Error::StyleLoad {
        origin: path.display().to_string(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|err| load_err(err.to_string()))?;
    let value: Value =
        serde_json::from_str(&contents).map_err(|err| load_err(format!("parse style json: {err}")))?;
    let paint_properties = DEFAULT_PAINT_PROPERTIES
        .iter()
        .map(|prop| prop.to_string())
        .collect();
    parse_style(&value, paint_properties).map_err(load_err)
}
