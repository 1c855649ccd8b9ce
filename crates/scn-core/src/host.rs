//! The seam to the live scene graph.
//!
//! The engine only ever talks to a host through these traits: the exporter
//! needs `SceneRead`, the reconciler needs `SceneWrite`. Handles are opaque
//! copies; values crossing the seam are primitives, blobs and match names.
use std::ops::{Deref, DerefMut};

use crate::codec::PropValue;
use crate::error::HostOperationError;
use crate::schema::{CompSettings, FootageSource, Interpolation, ItemType, LayerKind, Marker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

pub type HostResult<T> = Result<T, HostOperationError>;

/// A kind reported by the host, which may be one the engine has no mapping for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognized<T> {
    Known(T),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemInfo {
    pub kind: Recognized<ItemType>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub kind: Recognized<LayerKind>,
    pub name: String,
    /// 1-based position in the owning comp.
    pub index: usize,
    pub in_point: f64,
    pub out_point: f64,
    pub source: Option<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Leaf,
    Effect,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Leaf => "leaf",
            NodeKind::Effect => "effect",
        }
    }
}

/// What a node supports, reported by the host and queried directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Has ordered children and may accept new ones.
    pub groupable: bool,
    pub keyframeable: bool,
    /// Accepts opaque binary payloads (shape, custom, raw values).
    pub binary_payload: bool,
}

impl Capabilities {
    pub const GROUP: Capabilities = Capabilities {
        groupable: true,
        keyframeable: false,
        binary_payload: false,
    };
    pub const LEAF: Capabilities = Capabilities {
        groupable: false,
        keyframeable: true,
        binary_payload: true,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub match_name: String,
    /// Display name; effects carry a user-facing name separate from the match name.
    pub name: String,
    pub kind: NodeKind,
    pub caps: Capabilities,
}

/// Requested shape of a child created with `add_group_child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Group,
    Leaf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f64,
    pub value: PropValue,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemInit {
    Comp(CompSettings),
    Footage(FootageSource),
    Folder,
}

pub trait SceneRead {
    /// Top-level project items in project order.
    fn items(&self) -> Vec<ItemId>;
    fn item(&self, id: ItemId) -> HostResult<ItemInfo>;
    fn folder_children(&self, id: ItemId) -> HostResult<Vec<ItemId>>;
    fn comp_settings(&self, id: ItemId) -> HostResult<CompSettings>;
    fn footage_source(&self, id: ItemId) -> HostResult<FootageSource>;
    fn comp_layers(&self, id: ItemId) -> HostResult<Vec<LayerId>>;

    fn layer(&self, id: LayerId) -> HostResult<LayerInfo>;
    fn layer_root(&self, id: LayerId) -> HostResult<NodeId>;
    /// The layer's effect stack, a group whose children are effect nodes.
    fn layer_effects(&self, id: LayerId) -> HostResult<NodeId>;
    /// Markers in ascending time order.
    fn get_markers(&self, id: LayerId) -> HostResult<Vec<Marker>>;

    fn node(&self, id: NodeId) -> HostResult<NodeInfo>;
    fn get_children(&self, id: NodeId) -> HostResult<Vec<NodeId>>;
    fn get_value(&self, id: NodeId) -> HostResult<Option<PropValue>>;
    /// Keyframes in ascending time order.
    fn get_keyframes(&self, id: NodeId) -> HostResult<Vec<Keyframe>>;
    fn can_add_stream(&self, group: NodeId, match_name: &str) -> bool;
}

pub trait SceneWrite: SceneRead {
    /// Called when a pass acquires exclusive access. See [`ExclusivePass`].
    fn begin_pass(&mut self) {}
    fn end_pass(&mut self) {}

    fn create_item(
        &mut self,
        parent: Option<ItemId>,
        name: &str,
        init: &ItemInit,
    ) -> HostResult<ItemId>;
    fn set_comp_settings(&mut self, id: ItemId, settings: &CompSettings) -> HostResult<()>;
    fn set_footage_source(&mut self, id: ItemId, source: &FootageSource) -> HostResult<()>;

    /// Appends a layer to the comp.
    fn create_layer(
        &mut self,
        comp: ItemId,
        kind: LayerKind,
        name: &str,
        source: Option<ItemId>,
    ) -> HostResult<LayerId>;
    fn set_layer_timing(&mut self, id: LayerId, in_point: f64, out_point: f64) -> HostResult<()>;
    fn set_layer_source(&mut self, id: LayerId, source: Option<ItemId>) -> HostResult<()>;
    /// Moves a layer to a 1-based index within its comp.
    fn move_layer(&mut self, id: LayerId, index: usize) -> HostResult<()>;

    /// Appends an effect to the layer's effect stack.
    fn create_effect(&mut self, layer: LayerId, match_name: &str) -> HostResult<NodeId>;
    fn rename_node(&mut self, id: NodeId, name: &str) -> HostResult<()>;
    fn add_group_child(
        &mut self,
        group: NodeId,
        match_name: &str,
        kind: ChildKind,
    ) -> HostResult<NodeId>;
    fn set_value(&mut self, id: NodeId, value: PropValue) -> HostResult<()>;

    fn add_keyframe(&mut self, id: NodeId, key: &Keyframe) -> HostResult<()>;
    /// Replaces value and interpolation of the keyframe at `key.time`.
    fn set_keyframe(&mut self, id: NodeId, key: &Keyframe) -> HostResult<()>;
    fn remove_keyframe(&mut self, id: NodeId, time: f64) -> HostResult<()>;

    fn add_marker(&mut self, layer: LayerId, marker: &Marker) -> HostResult<()>;
    /// Replaces the marker at `index` in the layer's time-ordered marker list.
    fn set_marker(&mut self, layer: LayerId, index: usize, marker: &Marker) -> HostResult<()>;
    fn remove_marker(&mut self, layer: LayerId, index: usize) -> HostResult<()>;
}

/// Scoped exclusive access to a host for the length of one pass.
///
/// `end_pass` runs when the guard drops, whichever way the pass ends.
pub struct ExclusivePass<'h, H: SceneWrite + ?Sized> {
    host: &'h mut H,
}

impl<'h, H: SceneWrite + ?Sized> ExclusivePass<'h, H> {
    pub fn begin(host: &'h mut H) -> Self {
        host.begin_pass();
        Self { host }
    }
}

impl<H: SceneWrite + ?Sized> Deref for ExclusivePass<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: SceneWrite + ?Sized> DerefMut for ExclusivePass<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

impl<H: SceneWrite + ?Sized> Drop for ExclusivePass<'_, H> {
    fn drop(&mut self) {
        self.host.end_pass();
    }
}
