//! Portable mapping: the JSON-facing description of a project.
//!
//! Every node kind is its own type, so a traversal over these is an exhaustive
//! match; shape errors (a group without children, a leaf with children, an
//! unknown item or layer type) are rejected when the mapping is parsed.
use indexmap::IndexMap;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectDesc {
    #[serde(default)]
    pub items: Vec<ItemDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Comp,
    Footage,
    Folder,
}

impl ItemType {
    pub fn name(self) -> &'static str {
        match self {
            ItemType::Comp => "Comp",
            ItemType::Footage => "Footage",
            ItemType::Folder => "Folder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ItemDesc {
    Comp {
        name: String,
        comp_data: CompData,
    },
    Footage {
        name: String,
        footage_data: FootageData,
    },
    Folder {
        name: String,
        #[serde(default)]
        children: Vec<ItemDesc>,
    },
}

impl ItemDesc {
    pub fn name(&self) -> &str {
        match self {
            ItemDesc::Comp { name, .. }
            | ItemDesc::Footage { name, .. }
            | ItemDesc::Folder { name, .. } => name,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            ItemDesc::Comp { .. } => ItemType::Comp,
            ItemDesc::Footage { .. } => ItemType::Footage,
            ItemDesc::Folder { .. } => ItemType::Folder,
        }
    }
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompSettings {
    pub width: u32,
    pub height: u32,
    #[serde(default = "one")]
    pub pixel_aspect: f64,
    pub duration: f64,
    pub frame_rate: f64,
}

impl Default for CompSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_aspect: 1.0,
            duration: 10.0,
            frame_rate: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompData {
    #[serde(flatten)]
    pub settings: CompSettings,
    #[serde(default)]
    pub layers: Vec<LayerDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootageData {
    pub source: FootageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FootageSource {
    File {
        path: String,
    },
    Solid {
        color: [f64; 4],
        width: u32,
        height: u32,
    },
    Placeholder {
        width: u32,
        height: u32,
        duration: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Solid,
    Text,
    Shape,
    Footage,
    Null,
    Camera,
    Light,
    Adjustment,
}

impl LayerKind {
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Solid => "solid",
            LayerKind::Text => "text",
            LayerKind::Shape => "shape",
            LayerKind::Footage => "footage",
            LayerKind::Null => "null",
            LayerKind::Camera => "camera",
            LayerKind::Light => "light",
            LayerKind::Adjustment => "adjustment",
        }
    }

    /// Match name of the root property group of a layer of this kind.
    pub fn root_match_name(self) -> &'static str {
        match self {
            LayerKind::Text => "ADBE Text Layer",
            LayerKind::Shape => "ADBE Vector Layer",
            LayerKind::Camera => "ADBE Camera Layer",
            LayerKind::Light => "ADBE Light Layer",
            LayerKind::Solid | LayerKind::Footage | LayerKind::Null | LayerKind::Adjustment => {
                "ADBE AV Layer"
            }
        }
    }

    pub fn requires_source(self) -> bool {
        matches!(self, LayerKind::Footage)
    }
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Non-owning reference from a layer to a project item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub name: String,
    /// Index among all project items sharing `(type, name)`, depth-first.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDesc {
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub name: String,
    pub index: usize,
    pub in_point: f64,
    pub out_point: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    pub properties: PropNode,
    #[serde(default)]
    pub effects: Vec<EffectDesc>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDesc {
    pub match_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<PropNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropNode {
    Group(PropGroup),
    Leaf(PropLeaf),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropGroup {
    pub match_name: String,
    /// Keyed by sibling label (`match_name#ordinal`), in sibling order.
    pub children: IndexMap<String, PropNode>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropLeaf {
    pub match_name: String,
    pub value: Option<Value>,
    pub keyframes: Vec<KeyframeDesc>,
}

impl PropNode {
    pub fn match_name(&self) -> &str {
        match self {
            PropNode::Group(g) => &g.match_name,
            PropNode::Leaf(l) => &l.match_name,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, PropNode::Group(_))
    }

    pub fn kind_name(&self) -> &'static str {
        if self.is_group() { "group" } else { "leaf" }
    }
}

#[derive(Deserialize)]
struct RawPropNode {
    match_name: String,
    is_group: bool,
    #[serde(default)]
    children: Option<IndexMap<String, PropNode>>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    keyframes: Option<Vec<KeyframeDesc>>,
}

impl TryFrom<RawPropNode> for PropNode {
    type Error = String;

    fn try_from(raw: RawPropNode) -> Result<Self, Self::Error> {
        if raw.is_group {
            if raw.value.is_some() || raw.keyframes.is_some() {
                return Err(format!("group '{}' carries a value", raw.match_name));
            }
            let children = raw
                .children
                .ok_or_else(|| format!("group '{}' has no children field", raw.match_name))?;
            Ok(PropNode::Group(PropGroup {
                match_name: raw.match_name,
                children,
            }))
        } else {
            if raw.children.is_some() {
                return Err(format!("leaf '{}' carries children", raw.match_name));
            }
            Ok(PropNode::Leaf(PropLeaf {
                match_name: raw.match_name,
                value: raw.value,
                keyframes: raw.keyframes.unwrap_or_default(),
            }))
        }
    }
}

impl<'de> Deserialize<'de> for PropNode {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = RawPropNode::deserialize(d)?;
        PropNode::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PropNode {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            PropNode::Group(g) => {
                let mut st = s.serialize_struct("PropNode", 3)?;
                st.serialize_field("match_name", &g.match_name)?;
                st.serialize_field("is_group", &true)?;
                st.serialize_field("children", &g.children)?;
                st.end()
            }
            PropNode::Leaf(l) => {
                let mut st = s.serialize_struct("PropNode", 4)?;
                st.serialize_field("match_name", &l.match_name)?;
                st.serialize_field("is_group", &false)?;
                match &l.value {
                    Some(v) => st.serialize_field("value", v)?,
                    None => st.skip_field("value")?,
                }
                if l.keyframes.is_empty() {
                    st.skip_field("keyframes")?;
                } else {
                    st.serialize_field("keyframes", &l.keyframes)?;
                }
                st.end()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Linear,
    Bezier,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeDesc {
    pub time: f64,
    pub value: Value,
    #[serde(default)]
    pub interpolation: Interpolation,
}

fn is_zero_f64(d: &f64) -> bool {
    *d == 0.0
}

/// Timed layer annotation. Markers are plain data on both sides of the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Marker {
    pub time: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub duration: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_target: Option<String>,
    #[serde(default)]
    pub label: i32,
    #[serde(default)]
    pub protected: bool,
}

/// Mapping-side value: a literal, or an encoded blob with its type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    Vector(Vec<f64>),
    Blob(BlobValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobValue {
    pub type_tag: String,
    pub blob_hex: String,
}
