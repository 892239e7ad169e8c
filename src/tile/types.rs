use std::collections::HashMap;

use serde::Serialize;

/// Geometry type of a feature, as carried by the vector tile wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeomType {
    Point,
    LineString,
    Polygon,
}

/// Attribute value stored in a layer's value dictionary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TileValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
}

impl TileValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TileValue::String(text) => serde_json::Value::String(text.clone()),
            TileValue::Float(val) => serde_json::Number::from_f64(*val as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            TileValue::Double(val) => serde_json::Number::from_f64(*val)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            TileValue::Int(val) | TileValue::SInt(val) => serde_json::Value::from(*val),
            TileValue::UInt(val) => serde_json::Value::from(*val),
            TileValue::Bool(val) => serde_json::Value::Bool(*val),
        }
    }

    /// Best-effort conversion of a GeoJSON property; `null` has no tile form.
    pub fn from_json(value: &serde_json::Value) -> Option<TileValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(val) => Some(TileValue::Bool(*val)),
            serde_json::Value::String(text) => Some(TileValue::String(text.clone())),
            serde_json::Value::Number(number) => {
                if let Some(val) = number.as_u64() {
                    Some(TileValue::UInt(val))
                } else if let Some(val) = number.as_i64() {
                    Some(TileValue::SInt(val))
                } else {
                    number.as_f64().map(TileValue::Double)
                }
            }
            other => Some(TileValue::String(other.to_string())),
        }
    }

    fn dictionary_key(&self) -> ValueKey {
        match self {
            TileValue::String(text) => ValueKey::String(text.clone()),
            TileValue::Float(val) => ValueKey::Float(val.to_bits()),
            TileValue::Double(val) => ValueKey::Double(val.to_bits()),
            TileValue::Int(val) => ValueKey::Int(*val),
            TileValue::UInt(val) => ValueKey::UInt(*val),
            TileValue::SInt(val) => ValueKey::SInt(*val),
            TileValue::Bool(val) => ValueKey::Bool(*val),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    String(String),
    Float(u32),
    Double(u64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
}

/// One feature of a layer.
///
/// `tags` holds consecutive key/value index pairs into the owning layer's
/// dictionaries. `geometry` holds rings of flat `x, y` pairs in the layer's
/// local grid; points carry one ring per point and polygon rings are closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub geom_type: GeomType,
    pub tags: Vec<u32>,
    pub geometry: Vec<Vec<i32>>,
}

impl Feature {
    pub fn vertex_count(&self) -> usize {
        self.geometry.iter().map(|ring| ring.len() / 2).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub extent: u32,
    pub features: Vec<Feature>,
    pub keys: Vec<String>,
    pub values: Vec<TileValue>,
}

impl Layer {
    pub fn new(name: impl Into<String>, extent: u32) -> Self {
        Self {
            name: name.into(),
            extent,
            features: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Resolve a feature's tag list against this layer's dictionaries.
    ///
    /// Dangling indices are skipped.
    pub fn properties<'a>(&'a self, feature: &'a Feature) -> Vec<(&'a str, &'a TileValue)> {
        feature
            .tags
            .chunks_exact(2)
            .filter_map(|pair| {
                let key = self.keys.get(pair[0] as usize)?;
                let value = self.values.get(pair[1] as usize)?;
                Some((key.as_str(), value))
            })
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.features.iter().map(Feature::vertex_count).sum()
    }
}

/// Builds the shared key/value dictionaries of a layer while features are added.
#[derive(Debug, Default)]
pub struct LayerDictionary {
    keys: Vec<String>,
    values: Vec<TileValue>,
    key_index: HashMap<String, u32>,
    value_index: HashMap<ValueKey, u32>,
}

impl LayerDictionary {
    pub fn tag(&mut self, key: &str, value: TileValue) -> [u32; 2] {
        let key_idx = match self.key_index.get(key) {
            Some(idx) => *idx,
            None => {
                let idx = self.keys.len() as u32;
                self.keys.push(key.to_string());
                self.key_index.insert(key.to_string(), idx);
                idx
            }
        };
        let dict_key = value.dictionary_key();
        let value_idx = match self.value_index.get(&dict_key) {
            Some(idx) => *idx,
            None => {
                let idx = self.values.len() as u32;
                self.values.push(value);
                self.value_index.insert(dict_key, idx);
                idx
            }
        };
        [key_idx, value_idx]
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<TileValue>) {
        (self.keys, self.values)
    }
}

/// Decoded tile: layers in wire order, addressed by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredTile {
    pub layers: Vec<Layer>,
}

impl StructuredTile {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name.as_str()).collect()
    }

    pub fn remove_layer(&mut self, name: &str) -> Option<Layer> {
        let idx = self.layers.iter().position(|layer| layer.name == name)?;
        Some(self.layers.remove(idx))
    }

    /// Replace the layer with the same name in place, or append it.
    pub fn replace_layer(&mut self, layer: Layer) {
        match self.layers.iter_mut().find(|existing| existing.name == layer.name) {
            Some(existing) => *existing = layer,
            None => self.layers.push(layer),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.features.len()).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.layers.iter().map(Layer::vertex_count).sum()
    }

    /// Largest layer extent, or the conventional 4096 for an empty tile.
    pub fn extent(&self) -> u32 {
        self.layers
            .iter()
            .map(|layer| layer.extent)
            .max()
            .unwrap_or(DEFAULT_EXTENT)
    }
}

pub const DEFAULT_EXTENT: u32 = 4096;

/// Append the first vertex when a ring of at least two vertices does not end on it.
pub(crate) fn close_ring(ring: &mut Vec<i32>) {
    let len = ring.len();
    if len >= 4 && ring[..2] != ring[len - 2..] {
        let (x, y) = (ring[0], ring[1]);
        ring.push(x);
        ring.push(y);
    }
}
