//! In-memory scene model implementing both host traits.
//!
//! Items, layers and property nodes live in arenas addressed by their handles.
//! Every successful write bumps a mutation counter, which is what makes
//! "no-op reconciliation" observable in tests and in the CLI.
use std::collections::{HashMap, HashSet};

use crate::codec::PropValue;
use crate::error::HostOperationError;
use crate::host::{
    Capabilities, ChildKind, HostResult, ItemId, ItemInfo, ItemInit, Keyframe, LayerId,
    LayerInfo, NodeId, NodeInfo, NodeKind, Recognized, SceneRead, SceneWrite,
};
use crate::schema::{CompSettings, FootageSource, ItemType, LayerKind, Marker};

pub const EFFECT_PARADE: &str = "ADBE Effect Parade";

/// Capability policy for streams and effects.
#[derive(Debug, Clone, Default)]
pub struct StreamCatalog {
    allowed: Option<HashSet<String>>,
    effects: HashMap<String, Vec<(String, PropValue)>>,
    static_streams: HashSet<String>,
    plain_streams: HashSet<String>,
}

impl StreamCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only these match names may be added under groups. Unrestricted by default.
    pub fn allow_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Effect template: `create_effect` populates these params with their defaults.
    pub fn register_effect<S: Into<String>>(
        mut self,
        match_name: impl Into<String>,
        params: impl IntoIterator<Item = (S, PropValue)>,
    ) -> Self {
        self.effects.insert(
            match_name.into(),
            params.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        );
        self
    }

    /// Streams with this match name cannot be keyframed.
    pub fn static_stream(mut self, match_name: impl Into<String>) -> Self {
        self.static_streams.insert(match_name.into());
        self
    }

    /// Streams with this match name refuse binary payloads.
    pub fn plain_stream(mut self, match_name: impl Into<String>) -> Self {
        self.plain_streams.insert(match_name.into());
        self
    }

    fn permits(&self, match_name: &str) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(match_name))
    }

    fn leaf_caps(&self, match_name: &str) -> Capabilities {
        Capabilities {
            groupable: false,
            keyframeable: !self.static_streams.contains(match_name),
            binary_payload: !self.plain_streams.contains(match_name),
        }
    }
}

#[derive(Debug, Clone)]
enum ItemData {
    Comp {
        settings: CompSettings,
        layers: Vec<LayerId>,
    },
    Footage {
        source: FootageSource,
    },
    Folder {
        children: Vec<ItemId>,
    },
    Unsupported {
        kind: String,
    },
}

#[derive(Debug, Clone)]
struct ItemEntry {
    name: String,
    data: ItemData,
}

#[derive(Debug, Clone)]
struct LayerEntry {
    comp: ItemId,
    kind: LayerKind,
    name: String,
    in_point: f64,
    out_point: f64,
    source: Option<ItemId>,
    root: NodeId,
    effects: NodeId,
    markers: Vec<Marker>,
}

#[derive(Debug, Clone)]
struct NodeEntry {
    match_name: String,
    name: String,
    kind: NodeKind,
    caps: Capabilities,
    children: Vec<NodeId>,
    value: Option<PropValue>,
    keyframes: Vec<Keyframe>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    items: Vec<ItemEntry>,
    roots: Vec<ItemId>,
    layers: Vec<LayerEntry>,
    nodes: Vec<NodeEntry>,
    catalog: StreamCatalog,
    locked: HashSet<NodeId>,
    locked_items: HashSet<ItemId>,
    unreadable: HashSet<NodeId>,
    mutations: usize,
    open_passes: usize,
    finished_passes: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: StreamCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Successful writes since creation.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub fn pass_open(&self) -> bool {
        self.open_passes > 0
    }

    pub fn finished_passes(&self) -> usize {
        self.finished_passes
    }

    /// Writes against a locked node fail, like host-locked properties.
    pub fn lock(&mut self, node: NodeId) {
        self.locked.insert(node);
    }

    /// Settings writes against a locked item fail.
    pub fn lock_item(&mut self, item: ItemId) {
        self.locked_items.insert(item);
    }

    /// Value and keyframe reads of this node fail.
    pub fn make_unreadable(&mut self, node: NodeId) {
        self.unreadable.insert(node);
    }

    /// Adds a top-level item of a kind the engine does not model.
    pub fn insert_unsupported_item(&mut self, name: &str, kind: &str) -> ItemId {
        let id = ItemId(self.items.len() as u32);
        self.items.push(ItemEntry {
            name: name.to_string(),
            data: ItemData::Unsupported {
                kind: kind.to_string(),
            },
        });
        self.roots.push(id);
        id
    }

    fn touch(&mut self) {
        self.mutations += 1;
    }

    fn item_entry(&self, id: ItemId) -> HostResult<&ItemEntry> {
        self.items
            .get(id.0 as usize)
            .ok_or_else(|| HostOperationError::new("item", format!("no item {}", id.0)))
    }

    fn item_entry_mut(&mut self, id: ItemId) -> HostResult<&mut ItemEntry> {
        self.items
            .get_mut(id.0 as usize)
            .ok_or_else(|| HostOperationError::new("item", format!("no item {}", id.0)))
    }

    fn layer_entry(&self, id: LayerId) -> HostResult<&LayerEntry> {
        self.layers
            .get(id.0 as usize)
            .ok_or_else(|| HostOperationError::new("layer", format!("no layer {}", id.0)))
    }

    fn layer_entry_mut(&mut self, id: LayerId) -> HostResult<&mut LayerEntry> {
        self.layers
            .get_mut(id.0 as usize)
            .ok_or_else(|| HostOperationError::new("layer", format!("no layer {}", id.0)))
    }

    fn writable_item(&mut self, op: &'static str, id: ItemId) -> HostResult<&mut ItemEntry> {
        if self.locked_items.contains(&id) {
            return Err(HostOperationError::new(op, format!("item {} is locked", id.0)));
        }
        self.item_entry_mut(id)
    }

    fn readable_leaf(&self, op: &'static str, id: NodeId) -> HostResult<&NodeEntry> {
        if self.unreadable.contains(&id) {
            return Err(HostOperationError::new(op, format!("node {} is unreadable", id.0)));
        }
        self.node_entry(id)
    }

    fn node_entry(&self, id: NodeId) -> HostResult<&NodeEntry> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| HostOperationError::new("node", format!("no node {}", id.0)))
    }

    fn writable_node(&mut self, op: &'static str, id: NodeId) -> HostResult<&mut NodeEntry> {
        if self.locked.contains(&id) {
            return Err(HostOperationError::new(op, format!("node {} is locked", id.0)));
        }
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| HostOperationError::new(op, format!("no node {}", id.0)))
    }

    fn writable_leaf(&mut self, op: &'static str, id: NodeId) -> HostResult<&mut NodeEntry> {
        let node = self.writable_node(op, id)?;
        if node.kind != NodeKind::Leaf {
            return Err(HostOperationError::new(
                op,
                format!("'{}' is not a property", node.match_name),
            ));
        }
        Ok(node)
    }

    fn keyframeable_leaf(&mut self, op: &'static str, id: NodeId) -> HostResult<&mut NodeEntry> {
        let node = self.writable_leaf(op, id)?;
        if !node.caps.keyframeable {
            return Err(HostOperationError::new(
                op,
                format!("'{}' cannot be keyframed", node.match_name),
            ));
        }
        Ok(node)
    }

    fn alloc_node(&mut self, match_name: &str, name: &str, kind: NodeKind, caps: Capabilities) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeEntry {
            match_name: match_name.to_string(),
            name: name.to_string(),
            kind,
            caps,
            children: Vec::new(),
            value: None,
            keyframes: Vec::new(),
        });
        id
    }

    fn check_source(&self, comp: ItemId, source: Option<ItemId>) -> HostResult<()> {
        let Some(src) = source else {
            return Ok(());
        };
        if src == comp {
            return Err(HostOperationError::new(
                "create_layer",
                "a comp cannot be its own layer source",
            ));
        }
        match self.item_entry(src)?.data {
            ItemData::Comp { .. } | ItemData::Footage { .. } => Ok(()),
            _ => Err(HostOperationError::new(
                "create_layer",
                format!("item {} cannot be a layer source", src.0),
            )),
        }
    }

    fn comp_layers_mut(&mut self, comp: ItemId) -> HostResult<&mut Vec<LayerId>> {
        match &mut self.item_entry_mut(comp)?.data {
            ItemData::Comp { layers, .. } => Ok(layers),
            _ => Err(HostOperationError::new("comp", format!("item {} is not a comp", comp.0))),
        }
    }
}

impl SceneRead for MemoryHost {
    fn items(&self) -> Vec<ItemId> {
        self.roots.clone()
    }

    fn item(&self, id: ItemId) -> HostResult<ItemInfo> {
        let entry = self.item_entry(id)?;
        let kind = match &entry.data {
            ItemData::Comp { .. } => Recognized::Known(ItemType::Comp),
            ItemData::Footage { .. } => Recognized::Known(ItemType::Footage),
            ItemData::Folder { .. } => Recognized::Known(ItemType::Folder),
            ItemData::Unsupported { kind } => Recognized::Unknown(kind.clone()),
        };
        Ok(ItemInfo {
            kind,
            name: entry.name.clone(),
        })
    }

    fn folder_children(&self, id: ItemId) -> HostResult<Vec<ItemId>> {
        match &self.item_entry(id)?.data {
            ItemData::Folder { children } => Ok(children.clone()),
            _ => Err(HostOperationError::new("folder_children", format!("item {} is not a folder", id.0))),
        }
    }

    fn comp_settings(&self, id: ItemId) -> HostResult<CompSettings> {
        match &self.item_entry(id)?.data {
            ItemData::Comp { settings, .. } => Ok(*settings),
            _ => Err(HostOperationError::new("comp_settings", format!("item {} is not a comp", id.0))),
        }
    }

    fn footage_source(&self, id: ItemId) -> HostResult<FootageSource> {
        match &self.item_entry(id)?.data {
            ItemData::Footage { source } => Ok(source.clone()),
            _ => Err(HostOperationError::new("footage_source", format!("item {} is not footage", id.0))),
        }
    }

    fn comp_layers(&self, id: ItemId) -> HostResult<Vec<LayerId>> {
        match &self.item_entry(id)?.data {
            ItemData::Comp { layers, .. } => Ok(layers.clone()),
            _ => Err(HostOperationError::new("comp_layers", format!("item {} is not a comp", id.0))),
        }
    }

    fn layer(&self, id: LayerId) -> HostResult<LayerInfo> {
        let entry = self.layer_entry(id)?;
        let position = self
            .comp_layers(entry.comp)?
            .iter()
            .position(|l| *l == id)
            .ok_or_else(|| HostOperationError::new("layer", "layer detached from its comp"))?;
        Ok(LayerInfo {
            kind: Recognized::Known(entry.kind),
            name: entry.name.clone(),
            index: position + 1,
            in_point: entry.in_point,
            out_point: entry.out_point,
            source: entry.source,
        })
    }

    fn layer_root(&self, id: LayerId) -> HostResult<NodeId> {
        Ok(self.layer_entry(id)?.root)
    }

    fn layer_effects(&self, id: LayerId) -> HostResult<NodeId> {
        Ok(self.layer_entry(id)?.effects)
    }

    fn get_markers(&self, id: LayerId) -> HostResult<Vec<Marker>> {
        Ok(self.layer_entry(id)?.markers.clone())
    }

    fn node(&self, id: NodeId) -> HostResult<NodeInfo> {
        let node = self.node_entry(id)?;
        Ok(NodeInfo {
            match_name: node.match_name.clone(),
            name: node.name.clone(),
            kind: node.kind,
            caps: node.caps,
        })
    }

    fn get_children(&self, id: NodeId) -> HostResult<Vec<NodeId>> {
        let node = self.node_entry(id)?;
        if !node.caps.groupable {
            return Err(HostOperationError::new(
                "get_children",
                format!("'{}' is not a group", node.match_name),
            ));
        }
        Ok(node.children.clone())
    }

    fn get_value(&self, id: NodeId) -> HostResult<Option<PropValue>> {
        Ok(self.readable_leaf("get_value", id)?.value.clone())
    }

    fn get_keyframes(&self, id: NodeId) -> HostResult<Vec<Keyframe>> {
        Ok(self.readable_leaf("get_keyframes", id)?.keyframes.clone())
    }

    fn can_add_stream(&self, group: NodeId, match_name: &str) -> bool {
        let Ok(node) = self.node_entry(group) else {
            return false;
        };
        if !node.caps.groupable {
            return false;
        }
        match node.kind {
            NodeKind::Effect => match self.catalog.effects.get(&node.match_name) {
                Some(params) => params.iter().any(|(n, _)| n == match_name),
                None => self.catalog.permits(match_name),
            },
            _ if node.match_name == EFFECT_PARADE => {
                self.catalog.effects.contains_key(match_name) || self.catalog.permits(match_name)
            }
            _ => self.catalog.permits(match_name),
        }
    }
}

impl SceneWrite for MemoryHost {
    fn begin_pass(&mut self) {
        self.open_passes += 1;
    }

    fn end_pass(&mut self) {
        self.open_passes = self.open_passes.saturating_sub(1);
        self.finished_passes += 1;
    }

    fn create_item(&mut self, parent: Option<ItemId>, name: &str, init: &ItemInit) -> HostResult<ItemId> {
        if let Some(p) = parent
            && !matches!(self.item_entry(p)?.data, ItemData::Folder { .. })
        {
            return Err(HostOperationError::new(
                "create_item",
                format!("parent item {} is not a folder", p.0),
            ));
        }
        let id = ItemId(self.items.len() as u32);
        let data = match init {
            ItemInit::Comp(settings) => ItemData::Comp {
                settings: *settings,
                layers: Vec::new(),
            },
            ItemInit::Footage(source) => ItemData::Footage {
                source: source.clone(),
            },
            ItemInit::Folder => ItemData::Folder {
                children: Vec::new(),
            },
        };
        self.items.push(ItemEntry {
            name: name.to_string(),
            data,
        });
        match parent {
            Some(p) => {
                if let ItemData::Folder { children } = &mut self.item_entry_mut(p)?.data {
                    children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        self.touch();
        Ok(id)
    }

    fn set_comp_settings(&mut self, id: ItemId, new: &CompSettings) -> HostResult<()> {
        match &mut self.writable_item("set_comp_settings", id)?.data {
            ItemData::Comp { settings, .. } => *settings = *new,
            _ => {
                return Err(HostOperationError::new(
                    "set_comp_settings",
                    format!("item {} is not a comp", id.0),
                ));
            }
        }
        self.touch();
        Ok(())
    }

    fn set_footage_source(&mut self, id: ItemId, new: &FootageSource) -> HostResult<()> {
        match &mut self.writable_item("set_footage_source", id)?.data {
            ItemData::Footage { source } => *source = new.clone(),
            _ => {
                return Err(HostOperationError::new(
                    "set_footage_source",
                    format!("item {} is not footage", id.0),
                ));
            }
        }
        self.touch();
        Ok(())
    }

    fn create_layer(
        &mut self,
        comp: ItemId,
        kind: LayerKind,
        name: &str,
        source: Option<ItemId>,
    ) -> HostResult<LayerId> {
        let duration = self.comp_settings(comp)?.duration;
        self.check_source(comp, source)?;
        let root = self.alloc_node(kind.root_match_name(), name, NodeKind::Group, Capabilities::GROUP);
        let effects = self.alloc_node(EFFECT_PARADE, "Effects", NodeKind::Group, Capabilities::GROUP);
        let id = LayerId(self.layers.len() as u32);
        self.layers.push(LayerEntry {
            comp,
            kind,
            name: name.to_string(),
            in_point: 0.0,
            out_point: duration,
            source,
            root,
            effects,
            markers: Vec::new(),
        });
        self.comp_layers_mut(comp)?.push(id);
        self.touch();
        Ok(id)
    }

    fn set_layer_timing(&mut self, id: LayerId, in_point: f64, out_point: f64) -> HostResult<()> {
        if out_point < in_point {
            return Err(HostOperationError::new(
                "set_layer_timing",
                format!("out point {out_point} precedes in point {in_point}"),
            ));
        }
        let layer = self.layer_entry_mut(id)?;
        layer.in_point = in_point;
        layer.out_point = out_point;
        self.touch();
        Ok(())
    }

    fn set_layer_source(&mut self, id: LayerId, source: Option<ItemId>) -> HostResult<()> {
        let comp = self.layer_entry(id)?.comp;
        self.check_source(comp, source)?;
        self.layer_entry_mut(id)?.source = source;
        self.touch();
        Ok(())
    }

    fn move_layer(&mut self, id: LayerId, index: usize) -> HostResult<()> {
        let comp = self.layer_entry(id)?.comp;
        let layers = self.comp_layers_mut(comp)?;
        if index == 0 || index > layers.len() {
            return Err(HostOperationError::new(
                "move_layer",
                format!("index {index} outside 1..={}", layers.len()),
            ));
        }
        layers.retain(|l| *l != id);
        layers.insert(index - 1, id);
        self.touch();
        Ok(())
    }

    fn create_effect(&mut self, layer: LayerId, match_name: &str) -> HostResult<NodeId> {
        let parade = self.layer_entry(layer)?.effects;
        if !self.can_add_stream(parade, match_name) {
            return Err(HostOperationError::new(
                "create_effect",
                format!("effect '{match_name}' is not available"),
            ));
        }
        let effect = self.alloc_node(match_name, match_name, NodeKind::Effect, Capabilities::GROUP);
        let defaults = self.catalog.effects.get(match_name).cloned().unwrap_or_default();
        for (param, value) in defaults {
            let caps = self.catalog.leaf_caps(&param);
            let id = self.alloc_node(&param, &param, NodeKind::Leaf, caps);
            self.nodes[id.0 as usize].value = Some(value);
            self.nodes[effect.0 as usize].children.push(id);
        }
        self.nodes[parade.0 as usize].children.push(effect);
        self.touch();
        Ok(effect)
    }

    fn rename_node(&mut self, id: NodeId, name: &str) -> HostResult<()> {
        self.writable_node("rename_node", id)?.name = name.to_string();
        self.touch();
        Ok(())
    }

    fn add_group_child(&mut self, group: NodeId, match_name: &str, kind: ChildKind) -> HostResult<NodeId> {
        if !self.can_add_stream(group, match_name) {
            let parent = self.node_entry(group)?.match_name.clone();
            return Err(HostOperationError::new(
                "add_group_child",
                format!("'{parent}' refuses '{match_name}'"),
            ));
        }
        let (node_kind, caps) = match kind {
            ChildKind::Group => (NodeKind::Group, Capabilities::GROUP),
            ChildKind::Leaf => (NodeKind::Leaf, self.catalog.leaf_caps(match_name)),
        };
        let id = self.alloc_node(match_name, match_name, node_kind, caps);
        self.nodes[group.0 as usize].children.push(id);
        self.touch();
        Ok(id)
    }

    fn set_value(&mut self, id: NodeId, value: PropValue) -> HostResult<()> {
        let node = self.writable_leaf("set_value", id)?;
        if value.is_binary() && !node.caps.binary_payload {
            return Err(HostOperationError::new(
                "set_value",
                format!("'{}' refuses binary payloads", node.match_name),
            ));
        }
        node.value = Some(value);
        self.touch();
        Ok(())
    }

    fn add_keyframe(&mut self, id: NodeId, key: &Keyframe) -> HostResult<()> {
        let node = self.keyframeable_leaf("add_keyframe", id)?;
        if node.keyframes.iter().any(|k| k.time == key.time) {
            return Err(HostOperationError::new(
                "add_keyframe",
                format!("keyframe already exists at {}", key.time),
            ));
        }
        let at = node.keyframes.partition_point(|k| k.time < key.time);
        node.keyframes.insert(at, key.clone());
        self.touch();
        Ok(())
    }

    fn set_keyframe(&mut self, id: NodeId, key: &Keyframe) -> HostResult<()> {
        let node = self.keyframeable_leaf("set_keyframe", id)?;
        let slot = node
            .keyframes
            .iter_mut()
            .find(|k| k.time == key.time)
            .ok_or_else(|| HostOperationError::new("set_keyframe", format!("no keyframe at {}", key.time)))?;
        slot.value = key.value.clone();
        slot.interpolation = key.interpolation;
        self.touch();
        Ok(())
    }

    fn remove_keyframe(&mut self, id: NodeId, time: f64) -> HostResult<()> {
        let node = self.keyframeable_leaf("remove_keyframe", id)?;
        let at = node
            .keyframes
            .iter()
            .position(|k| k.time == time)
            .ok_or_else(|| HostOperationError::new("remove_keyframe", format!("no keyframe at {time}")))?;
        node.keyframes.remove(at);
        self.touch();
        Ok(())
    }

    fn add_marker(&mut self, layer: LayerId, marker: &Marker) -> HostResult<()> {
        let markers = &mut self.layer_entry_mut(layer)?.markers;
        let at = markers.partition_point(|m| m.time <= marker.time);
        markers.insert(at, marker.clone());
        self.touch();
        Ok(())
    }

    fn set_marker(&mut self, layer: LayerId, index: usize, marker: &Marker) -> HostResult<()> {
        let markers = &mut self.layer_entry_mut(layer)?.markers;
        let slot = markers
            .get_mut(index)
            .ok_or_else(|| HostOperationError::new("set_marker", format!("no marker {index}")))?;
        *slot = marker.clone();
        markers.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.touch();
        Ok(())
    }

    fn remove_marker(&mut self, layer: LayerId, index: usize) -> HostResult<()> {
        let markers = &mut self.layer_entry_mut(layer)?.markers;
        if index >= markers.len() {
            return Err(HostOperationError::new("remove_marker", format!("no marker {index}")));
        }
        markers.remove(index);
        self.touch();
        Ok(())
    }
}
