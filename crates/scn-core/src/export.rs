//! Read-only walk from a live scene to its portable mapping.
//!
//! A node that cannot be exported is recorded with its path and left out of
//! the mapping; its siblings are exported as usual. Items, layers, effects and
//! params are matched by position among same-named siblings on import, so a
//! later sibling sharing the left-out node's name is left out with it.
//! Property group children carry their ordinal in their label and need no
//! such rule.
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use log::{debug, info, warn};

use crate::codec::encode_value;
use crate::error::{NodeError, ReferenceError, SchemaError, SyncError};
use crate::host::{ItemId, LayerId, NodeId, NodeInfo, NodeKind, Recognized, SceneRead};
use crate::identity::{NodePath, OrdinalCounter, assign_ordinals};
use crate::schema::{
    CompData, EffectDesc, FootageData, ItemDesc, ItemType, KeyframeDesc, LayerDesc, Marker,
    ProjectDesc, PropGroup, PropLeaf, PropNode, SourceRef,
};

#[derive(Clone, Copy, Debug)]
pub struct ExportOptions {
    /// Property trees deeper than this are reported instead of walked.
    pub max_depth: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub project: ProjectDesc,
    pub errors: Vec<NodeError>,
}

pub fn export_project<H: SceneRead + ?Sized>(host: &H, opts: ExportOptions) -> ExportReport {
    Exporter::new(host, opts).run()
}

pub struct Exporter<'h, H: SceneRead + ?Sized> {
    host: &'h H,
    opts: ExportOptions,
    sources: HashMap<ItemId, SourceRef>,
    /// Keyed globally: layer sources count items depth-first across folders.
    left_out_items: HashSet<(ItemType, String)>,
    errors: Vec<NodeError>,
}

/// Names already left out of one unlabelled sibling list.
struct LeftOut<K>(HashSet<K>);

impl<K: Hash + Eq> LeftOut<K> {
    fn new() -> Self {
        Self(HashSet::new())
    }

    fn shadows(&self, key: &K) -> bool {
        self.0.contains(key)
    }

    fn insert(&mut self, key: K) {
        self.0.insert(key);
    }
}

impl<'h, H: SceneRead + ?Sized> Exporter<'h, H> {
    pub fn new(host: &'h H, opts: ExportOptions) -> Self {
        let mut exporter = Self {
            host,
            opts,
            sources: HashMap::new(),
            left_out_items: HashSet::new(),
            errors: Vec::new(),
        };
        let mut counter = OrdinalCounter::default();
        exporter.index_sources(&host.items(), &mut counter);
        exporter
    }

    /// Depth-first numbering of items by `(type, name)`, the order the
    /// reconciler resolves them in.
    fn index_sources(&mut self, ids: &[ItemId], counter: &mut OrdinalCounter<(ItemType, String)>) {
        for &id in ids {
            let Ok(item) = self.host.item(id) else {
                continue;
            };
            let Recognized::Known(kind) = item.kind else {
                continue;
            };
            let ordinal = counter.next((kind, item.name.clone()));
            self.sources.insert(
                id,
                SourceRef {
                    kind,
                    name: item.name,
                    ordinal,
                },
            );
            if kind == ItemType::Folder
                && let Ok(children) = self.host.folder_children(id)
            {
                self.index_sources(&children, counter);
            }
        }
    }

    fn record(&mut self, path: NodePath, error: SyncError) {
        warn!("export {}: {}", path, error);
        self.errors.push(NodeError { path, error });
    }

    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    pub fn run(mut self) -> ExportReport {
        let top = self.host.items();
        let items = self.export_items(&top, &NodePath::root().child("items"));
        info!(
            "exported {} top-level items ({} node errors)",
            items.len(),
            self.errors.len()
        );
        ExportReport {
            project: ProjectDesc { items },
            errors: self.errors,
        }
    }

    fn export_items(&mut self, ids: &[ItemId], path: &NodePath) -> Vec<ItemDesc> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let info = match self.host.item(id) {
                Ok(info) => info,
                Err(e) => {
                    self.record(path.child(format!("item-{}", id.0)), e.into());
                    continue;
                }
            };
            let item_path = path.child(info.name.as_str());
            let key = match info.kind {
                Recognized::Known(kind) => Some((kind, info.name)),
                Recognized::Unknown(_) => None,
            };
            if let Some(key) = &key
                && self.left_out_items.contains(key)
            {
                self.record(item_path, SchemaError::SiblingLeftOut(key.1.clone()).into());
                continue;
            }
            match self.item_at(id, &item_path) {
                Ok(desc) => out.push(desc),
                Err(e) => {
                    self.record(item_path, e);
                    if let Some(key) = key {
                        self.left_out_items.insert(key);
                    }
                }
            }
        }
        out
    }

    pub fn export_item(&mut self, id: ItemId) -> Result<ItemDesc, SyncError> {
        let name = self.host.item(id)?.name;
        self.item_at(id, &NodePath::root().child("items").child(name))
    }

    fn item_at(&mut self, id: ItemId, path: &NodePath) -> Result<ItemDesc, SyncError> {
        let info = self.host.item(id)?;
        let kind = match info.kind {
            Recognized::Known(kind) => kind,
            Recognized::Unknown(kind) => {
                return Err(SchemaError::UnknownKind { what: "item", kind }.into());
            }
        };
        let name = info.name;
        Ok(match kind {
            ItemType::Comp => {
                let settings = self.host.comp_settings(id)?;
                let layer_ids = self.host.comp_layers(id)?;
                let layers_path = path.child("layers");
                let mut layers = Vec::with_capacity(layer_ids.len());
                let mut left_out = LeftOut::new();
                for layer in layer_ids {
                    let (segment, key) = match self.host.layer(layer) {
                        Ok(l) => match l.kind {
                            Recognized::Known(kind) => (l.name.clone(), Some((kind, l.name))),
                            Recognized::Unknown(_) => (l.name, None),
                        },
                        Err(_) => (format!("layer-{}", layer.0), None),
                    };
                    let layer_path = layers_path.child(segment);
                    if let Some(key) = &key
                        && left_out.shadows(key)
                    {
                        self.record(layer_path, SchemaError::SiblingLeftOut(key.1.clone()).into());
                        continue;
                    }
                    match self.layer_at(layer, &layer_path) {
                        Ok(desc) => layers.push(desc),
                        Err(e) => {
                            self.record(layer_path, e);
                            if let Some(key) = key {
                                left_out.insert(key);
                            }
                        }
                    }
                }
                debug!("comp '{}': {} layers", name, layers.len());
                ItemDesc::Comp {
                    name,
                    comp_data: CompData { settings, layers },
                }
            }
            ItemType::Footage => ItemDesc::Footage {
                name,
                footage_data: FootageData {
                    source: self.host.footage_source(id)?,
                },
            },
            ItemType::Folder => {
                let child_ids = self.host.folder_children(id)?;
                let children = self.export_items(&child_ids, &path.child("children"));
                ItemDesc::Folder { name, children }
            }
        })
    }

    pub fn export_layer(&mut self, id: LayerId) -> Result<LayerDesc, SyncError> {
        self.layer_at(id, &NodePath::root().child(format!("layer-{}", id.0)))
    }

    fn layer_at(&mut self, id: LayerId, path: &NodePath) -> Result<LayerDesc, SyncError> {
        let info = self.host.layer(id)?;
        let kind = match info.kind {
            Recognized::Known(kind) => kind,
            Recognized::Unknown(kind) => {
                return Err(SchemaError::UnknownKind { what: "layer", kind }.into());
            }
        };
        let source = match info.source {
            Some(item) => Some(self.sources.get(&item).cloned().ok_or_else(|| {
                ReferenceError {
                    kind: "item",
                    name: format!("id {}", item.0),
                    ordinal: 0,
                }
            })?),
            None => None,
        };

        let root = self.host.layer_root(id)?;
        let properties = self.tree_at(root, &path.child("properties"), 0)?;

        let parade = self.host.layer_effects(id)?;
        let effects_path = path.child("effects");
        let effect_ids = self.host.get_children(parade)?;
        let infos = self.child_infos(&effect_ids, &effects_path);
        let keys = assign_ordinals(infos.iter().map(|(_, i)| i.match_name.as_str()));
        let mut effects = Vec::with_capacity(infos.len());
        let mut left_out = LeftOut::new();
        for ((node, _), key) in infos.iter().zip(keys) {
            let effect_path = effects_path.child(key.label());
            if left_out.shadows(&key.match_name) {
                self.record(effect_path, SchemaError::SiblingLeftOut(key.match_name).into());
                continue;
            }
            match self.effect_at(*node, &effect_path) {
                Ok(desc) => effects.push(desc),
                Err(e) => {
                    self.record(effect_path, e);
                    left_out.insert(key.match_name);
                }
            }
        }

        let markers_path = path.child("markers");
        let mut markers = Vec::new();
        for (i, marker) in self.host.get_markers(id)?.iter().enumerate() {
            match export_marker(marker) {
                Ok(m) => markers.push(m),
                Err(e) => self.record(markers_path.child(i.to_string()), e),
            }
        }

        Ok(LayerDesc {
            kind,
            name: info.name,
            index: info.index,
            in_point: info.in_point,
            out_point: info.out_point,
            source,
            properties,
            effects,
            markers,
        })
    }

    /// Node info for each child; children the host cannot describe are recorded and skipped.
    fn child_infos(&mut self, ids: &[NodeId], path: &NodePath) -> Vec<(NodeId, NodeInfo)> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.host.node(id) {
                Ok(info) => out.push((id, info)),
                Err(e) => self.record(path.child(format!("node-{}", id.0)), e.into()),
            }
        }
        out
    }

    pub fn export_property_tree(&mut self, node: NodeId) -> Result<PropNode, SyncError> {
        self.tree_at(node, &NodePath::root(), 0)
    }

    fn tree_at(&mut self, node: NodeId, path: &NodePath, depth: usize) -> Result<PropNode, SyncError> {
        if depth > self.opts.max_depth {
            return Err(SchemaError::DepthExceeded(self.opts.max_depth).into());
        }
        let info = self.host.node(node)?;
        match info.kind {
            NodeKind::Leaf => Ok(PropNode::Leaf(self.leaf(node, info)?)),
            NodeKind::Group | NodeKind::Effect => {
                let ids = self.host.get_children(node)?;
                let infos = self.child_infos(&ids, path);
                let keys = assign_ordinals(infos.iter().map(|(_, i)| i.match_name.as_str()));
                let mut group = PropGroup {
                    match_name: info.match_name,
                    children: Default::default(),
                };
                for ((child, _), key) in infos.iter().zip(keys) {
                    let label = key.label();
                    let child_path = path.child(label.clone());
                    match self.tree_at(*child, &child_path, depth + 1) {
                        Ok(desc) => {
                            group.children.insert(label, desc);
                        }
                        Err(e) => self.record(child_path, e),
                    }
                }
                Ok(PropNode::Group(group))
            }
        }
    }

    fn leaf(&self, node: NodeId, info: NodeInfo) -> Result<PropLeaf, SyncError> {
        let value = self.host.get_value(node)?.map(|v| encode_value(&v));
        let keyframes = self
            .host
            .get_keyframes(node)?
            .iter()
            .map(|k| KeyframeDesc {
                time: k.time,
                value: encode_value(&k.value),
                interpolation: k.interpolation,
            })
            .collect();
        Ok(PropLeaf {
            match_name: info.match_name,
            value,
            keyframes,
        })
    }

    pub fn export_effect(&mut self, node: NodeId) -> Result<EffectDesc, SyncError> {
        self.effect_at(node, &NodePath::root())
    }

    fn effect_at(&mut self, node: NodeId, path: &NodePath) -> Result<EffectDesc, SyncError> {
        let info = self.host.node(node)?;
        let ids = self.host.get_children(node)?;
        let infos = self.child_infos(&ids, path);
        let keys = assign_ordinals(infos.iter().map(|(_, i)| i.match_name.as_str()));
        let mut params = Vec::with_capacity(infos.len());
        let mut left_out = LeftOut::new();
        for ((param, _), key) in infos.iter().zip(keys) {
            let param_path = path.child(key.label());
            if left_out.shadows(&key.match_name) {
                self.record(param_path, SchemaError::SiblingLeftOut(key.match_name).into());
                continue;
            }
            match self.param_at(*param, &param_path) {
                Ok(desc) => params.push(desc),
                Err(e) => {
                    self.record(param_path, e);
                    left_out.insert(key.match_name);
                }
            }
        }
        Ok(EffectDesc {
            match_name: info.match_name,
            name: info.name,
            params,
        })
    }

    pub fn export_param(&mut self, node: NodeId) -> Result<PropNode, SyncError> {
        self.param_at(node, &NodePath::root())
    }

    /// Params are property nodes one level below their effect.
    fn param_at(&mut self, node: NodeId, path: &NodePath) -> Result<PropNode, SyncError> {
        self.tree_at(node, path, 1)
    }
}

/// Host marker to mapping form. Empty optional strings are dropped; a
/// non-finite time or duration has no JSON form and is refused.
pub fn export_marker(marker: &Marker) -> Result<Marker, SyncError> {
    for (what, time) in [("marker", marker.time), ("marker duration", marker.duration)] {
        if !time.is_finite() {
            return Err(SchemaError::NonFiniteTime { what, time }.into());
        }
    }
    let present = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
    Ok(Marker {
        chapter: present(&marker.chapter),
        url: present(&marker.url),
        frame_target: present(&marker.frame_target),
        ..marker.clone()
    })
}
