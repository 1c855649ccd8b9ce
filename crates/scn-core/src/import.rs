//! Update-in-place reconciliation of a live scene against a mapping.
//!
//! Two passes. The item pass finds or creates every item (comps, footage,
//! folders) and applies item-level settings; the layer pass then walks each
//! comp's layers, whose sources may point at any item from the first pass.
//! Live nodes are matched by kind, name and first-seen ordinal; a host write is
//! issued only where the live state differs from the target.
//!
//! A failing subtree is recorded against its path and the walk moves on to the
//! next sibling. Nothing is ever deleted except keyframes (the keyframe list is
//! authoritative) and markers under [`MarkerPolicy::Replace`].
use std::ops::ControlFlow;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::codec::decode_value;
use crate::error::{NodeError, ReferenceError, SchemaError, SyncError};
use crate::host::{
    ChildKind, ExclusivePass, ItemId, ItemInit, Keyframe, LayerId, NodeId, NodeInfo, NodeKind,
    Recognized, SceneWrite,
};
use crate::identity::{NodePath, OrdinalCounter, SiblingIndex, SiblingKey};
use crate::schema::{
    CompData, EffectDesc, ItemDesc, ItemType, KeyframeDesc, LayerDesc, LayerKind, Marker,
    ProjectDesc, PropGroup, PropLeaf, PropNode, SourceRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerPolicy {
    /// Live markers without a target counterpart are kept.
    #[default]
    Merge,
    /// Live markers without a target counterpart are removed.
    Replace,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub marker_policy: MarkerPolicy,
    /// Keyframe and marker times closer than this are the same time.
    pub time_tolerance: f64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            marker_policy: MarkerPolicy::Merge,
            time_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub moved: usize,
}

impl MutationStats {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.removed + self.moved
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Every item resolved in the item pass, in mapping order.
    pub items: Vec<(SourceRef, ItemId)>,
    pub stats: MutationStats,
    pub errors: Vec<NodeError>,
    pub cancelled: bool,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

pub fn import_project<H: SceneWrite + ?Sized>(
    host: &mut H,
    desc: &ProjectDesc,
    opts: ImportOptions,
) -> ImportReport {
    Reconciler::new(host, opts).run(desc)
}

type Hook<'h> = Box<dyn FnMut(&NodePath) -> ControlFlow<()> + 'h>;

struct PendingComp<'d> {
    id: ItemId,
    data: &'d CompData,
    path: NodePath,
}

/// One reconciliation pass. Holds exclusive access to the host from `new`
/// until it is dropped.
pub struct Reconciler<'h, H: SceneWrite + ?Sized> {
    host: ExclusivePass<'h, H>,
    opts: ImportOptions,
    hook: Option<Hook<'h>>,
    item_ordinals: OrdinalCounter<(ItemType, String)>,
    resolved: IndexMap<SourceRef, ItemId>,
    stats: MutationStats,
    errors: Vec<NodeError>,
}

impl<'h, H: SceneWrite + ?Sized> Reconciler<'h, H> {
    pub fn new(host: &'h mut H, opts: ImportOptions) -> Self {
        Self {
            host: ExclusivePass::begin(host),
            opts,
            hook: None,
            item_ordinals: OrdinalCounter::default(),
            resolved: IndexMap::new(),
            stats: MutationStats::default(),
            errors: Vec::new(),
        }
    }

    /// Called before each layer, effect and property node; `Break` stops the
    /// pass, leaving whatever was already applied in place.
    pub fn with_hook(mut self, hook: impl FnMut(&NodePath) -> ControlFlow<()> + 'h) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn run(mut self, desc: &ProjectDesc) -> ImportReport {
        let items_path = NodePath::root().child("items");
        let mut pending = Vec::new();
        let first = self.item_pass(None, &desc.items, &items_path, &mut pending);
        let mut cancelled = self.settle(items_path, first).is_err();

        for comp in pending {
            if cancelled {
                break;
            }
            let result = self.layer_pass(comp.id, comp.data, &comp.path.child("layers"));
            cancelled = self.settle(comp.path, result).is_err();
        }

        info!(
            "import: {} created, {} updated, {} removed, {} moved, {} errors{}",
            self.stats.created,
            self.stats.updated,
            self.stats.removed,
            self.stats.moved,
            self.errors.len(),
            if cancelled { ", cancelled" } else { "" }
        );
        ImportReport {
            items: self.resolved.drain(..).collect(),
            stats: self.stats,
            errors: std::mem::take(&mut self.errors),
            cancelled,
        }
    }

    /// Records a subtree failure and lets the caller continue. Only
    /// cancellation propagates.
    fn settle(&mut self, path: NodePath, result: Result<(), SyncError>) -> Result<(), SyncError> {
        match result {
            Ok(()) => Ok(()),
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(error) => {
                warn!("import {}: {}", path, error);
                self.errors.push(NodeError { path, error });
                Ok(())
            }
        }
    }

    fn checkpoint(&mut self, path: &NodePath) -> Result<(), SyncError> {
        if let Some(hook) = self.hook.as_mut()
            && hook(path).is_break()
        {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    // -------- item pass --------

    fn item_pass<'d>(
        &mut self,
        parent: Option<ItemId>,
        descs: &'d [ItemDesc],
        path: &NodePath,
        pending: &mut Vec<PendingComp<'d>>,
    ) -> Result<(), SyncError> {
        let live = match parent {
            None => self.host.items(),
            Some(folder) => self.host.folder_children(folder)?,
        };
        let mut entries = Vec::with_capacity(live.len());
        for id in live {
            if let Ok(info) = self.host.item(id)
                && let Recognized::Known(kind) = info.kind
            {
                entries.push(((kind, info.name), id));
            }
        }
        let index = SiblingIndex::build(entries);
        let mut ords = OrdinalCounter::default();

        for desc in descs {
            let key = (desc.item_type(), desc.name().to_string());
            let ord = ords.next(key.clone());
            let global = self.item_ordinals.next(key.clone());
            let item_path = path.child(SiblingKey::new(desc.name(), ord).label());
            let existing = index.get(&key, ord);
            let result = self.reconcile_item(parent, existing, global, desc, &item_path, pending);
            self.settle(item_path, result)?;
        }
        Ok(())
    }

    fn reconcile_item<'d>(
        &mut self,
        parent: Option<ItemId>,
        existing: Option<ItemId>,
        global_ordinal: usize,
        desc: &'d ItemDesc,
        path: &NodePath,
        pending: &mut Vec<PendingComp<'d>>,
    ) -> Result<(), SyncError> {
        let id = match existing {
            Some(id) => id,
            None => {
                let init = match desc {
                    ItemDesc::Comp { comp_data, .. } => ItemInit::Comp(comp_data.settings),
                    ItemDesc::Footage { footage_data, .. } => {
                        ItemInit::Footage(footage_data.source.clone())
                    }
                    ItemDesc::Folder { .. } => ItemInit::Folder,
                };
                let id = self.host.create_item(parent, desc.name(), &init)?;
                self.stats.created += 1;
                debug!("created {} '{}'", desc.item_type().name(), desc.name());
                id
            }
        };
        // resolved before the settings diff: a failed write leaves it sourceable
        self.resolved.insert(
            SourceRef {
                kind: desc.item_type(),
                name: desc.name().to_string(),
                ordinal: global_ordinal,
            },
            id,
        );
        if let ItemDesc::Comp { comp_data, .. } = desc {
            pending.push(PendingComp {
                id,
                data: comp_data,
                path: path.clone(),
            });
        }
        if existing.is_some() {
            let result = self.update_item(id, desc);
            self.settle(path.clone(), result)?;
        }
        if let ItemDesc::Folder { children, .. } = desc {
            self.item_pass(Some(id), children, &path.child("children"), pending)?;
        }
        Ok(())
    }

    fn update_item(&mut self, id: ItemId, desc: &ItemDesc) -> Result<(), SyncError> {
        match desc {
            ItemDesc::Comp { comp_data, .. } => {
                if self.host.comp_settings(id)? != comp_data.settings {
                    self.host.set_comp_settings(id, &comp_data.settings)?;
                    self.stats.updated += 1;
                    debug!("updated comp settings of '{}'", desc.name());
                }
            }
            ItemDesc::Footage { footage_data, .. } => {
                if self.host.footage_source(id)? != footage_data.source {
                    self.host.set_footage_source(id, &footage_data.source)?;
                    self.stats.updated += 1;
                    debug!("updated footage source of '{}'", desc.name());
                }
            }
            ItemDesc::Folder { .. } => {}
        }
        Ok(())
    }

    fn resolve_source(&self, source: &SourceRef) -> Result<ItemId, ReferenceError> {
        self.resolved
            .get(source)
            .copied()
            .ok_or_else(|| ReferenceError {
                kind: source.kind.name(),
                name: source.name.clone(),
                ordinal: source.ordinal,
            })
    }

    // -------- layer pass --------

    fn layer_pass(&mut self, comp: ItemId, data: &CompData, path: &NodePath) -> Result<(), SyncError> {
        let live = self.host.comp_layers(comp)?;
        let mut entries = Vec::with_capacity(live.len());
        for id in live {
            if let Ok(info) = self.host.layer(id)
                && let Recognized::Known(kind) = info.kind
            {
                entries.push(((kind, info.name), id));
            }
        }
        let index = SiblingIndex::build(entries);
        let mut ords = OrdinalCounter::default();
        let mut placed = Vec::with_capacity(data.layers.len());

        for desc in &data.layers {
            let key = (desc.kind, desc.name.clone());
            let ord = ords.next(key.clone());
            let layer_path = path.child(SiblingKey::new(&desc.name, ord).label());
            self.checkpoint(&layer_path)?;
            match self.reconcile_layer(comp, index.get(&key, ord), desc, &layer_path) {
                Ok(id) => placed.push((id, desc.index)),
                Err(e) => self.settle(layer_path, Err(e))?,
            }
        }

        placed.sort_by_key(|(_, index)| *index);
        for (id, target) in placed {
            let result = self.place_layer(comp, id, target);
            self.settle(path.child(format!("index-{target}")), result)?;
        }
        Ok(())
    }

    fn place_layer(&mut self, comp: ItemId, id: LayerId, target: usize) -> Result<(), SyncError> {
        let count = self.host.comp_layers(comp)?.len();
        if target == 0 || target > count {
            return Ok(());
        }
        if self.host.layer(id)?.index != target {
            self.host.move_layer(id, target)?;
            self.stats.moved += 1;
        }
        Ok(())
    }

    fn reconcile_layer(
        &mut self,
        comp: ItemId,
        existing: Option<LayerId>,
        desc: &LayerDesc,
        path: &NodePath,
    ) -> Result<LayerId, SyncError> {
        let source = match &desc.source {
            Some(r) => Some(self.resolve_source(r)?),
            None => None,
        };
        if desc.kind.requires_source() && source.is_none() {
            return Err(SchemaError::MissingSource(desc.kind.name()).into());
        }

        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.host.create_layer(comp, desc.kind, &desc.name, source)?;
                self.stats.created += 1;
                debug!("created {} layer '{}'", desc.kind.name(), desc.name);
                id
            }
        };
        let info = self.host.layer(id)?;
        if info.in_point != desc.in_point || info.out_point != desc.out_point {
            self.host.set_layer_timing(id, desc.in_point, desc.out_point)?;
            self.stats.updated += 1;
        }
        if info.source != source {
            self.host.set_layer_source(id, source)?;
            self.stats.updated += 1;
        }

        let props_path = path.child("properties");
        let result = self.reconcile_root(id, desc.kind, &desc.properties, &props_path);
        self.settle(props_path, result)?;

        let effects_path = path.child("effects");
        let result = self.reconcile_effects(id, &desc.effects, &effects_path);
        self.settle(effects_path, result)?;

        let markers_path = path.child("markers");
        let result = self.reconcile_markers(id, &desc.markers);
        self.settle(markers_path, result)?;

        Ok(id)
    }

    // -------- property trees --------

    fn reconcile_root(
        &mut self,
        layer: LayerId,
        kind: LayerKind,
        desc: &PropNode,
        path: &NodePath,
    ) -> Result<(), SyncError> {
        let root = self.host.layer_root(layer)?;
        let info = self.host.node(root)?;
        let PropNode::Group(group) = desc else {
            return Err(SchemaError::KindMismatch {
                match_name: desc.match_name().to_string(),
                expected: "leaf",
                found: info.kind.name(),
            }
            .into());
        };
        if group.match_name != info.match_name {
            return Err(SchemaError::UnknownKind {
                what: "layer root",
                kind: format!(
                    "{} (a {} layer roots at {})",
                    group.match_name,
                    kind.name(),
                    info.match_name
                ),
            }
            .into());
        }
        self.reconcile_group(root, &info, group, path)
    }

    fn reconcile_group(
        &mut self,
        id: NodeId,
        info: &NodeInfo,
        desc: &PropGroup,
        path: &NodePath,
    ) -> Result<(), SyncError> {
        if !info.caps.groupable {
            return Err(SchemaError::KindMismatch {
                match_name: desc.match_name.clone(),
                expected: "group",
                found: info.kind.name(),
            }
            .into());
        }
        let children = desc.children.iter().map(|(label, node)| (Some(label.as_str()), node));
        self.reconcile_children(id, &info.match_name, children, path)
    }

    /// Group children are matched by the ordinal in their label; effect params
    /// carry no label and are matched by position.
    fn reconcile_children<'d>(
        &mut self,
        parent: NodeId,
        parent_name: &str,
        children: impl IntoIterator<Item = (Option<&'d str>, &'d PropNode)>,
        path: &NodePath,
    ) -> Result<(), SyncError> {
        let live = self.host.get_children(parent)?;
        let mut entries = Vec::with_capacity(live.len());
        for id in live {
            entries.push((self.host.node(id)?.match_name, id));
        }
        let mut index = SiblingIndex::build(entries);
        let mut ords = OrdinalCounter::<String>::default();

        for (label, child) in children {
            let ord = ords.for_child(label, child.match_name());
            let child_path = path.child(SiblingKey::new(child.match_name(), ord).label());
            self.checkpoint(&child_path)?;
            let result =
                self.reconcile_child(parent, parent_name, &mut index, ord, child, &child_path);
            self.settle(child_path, result)?;
        }
        Ok(())
    }

    fn reconcile_child(
        &mut self,
        parent: NodeId,
        parent_name: &str,
        index: &mut SiblingIndex<String, NodeId>,
        ord: usize,
        desc: &PropNode,
        path: &NodePath,
    ) -> Result<(), SyncError> {
        let match_name = desc.match_name();
        let id = match index.get(match_name, ord) {
            Some(id) => id,
            None => {
                if !self.host.can_add_stream(parent, match_name) {
                    return Err(SchemaError::CapabilityRefused {
                        parent: parent_name.to_string(),
                        match_name: match_name.to_string(),
                    }
                    .into());
                }
                let kind = if desc.is_group() {
                    ChildKind::Group
                } else {
                    ChildKind::Leaf
                };
                let id = self.host.add_group_child(parent, match_name, kind)?;
                self.stats.created += 1;
                debug!("added '{}' under '{}'", match_name, parent_name);
                index.push(match_name.to_string(), id);
                id
            }
        };
        let info = self.host.node(id)?;
        match desc {
            PropNode::Group(group) => self.reconcile_group(id, &info, group, path),
            PropNode::Leaf(leaf) => self.reconcile_leaf(id, &info, leaf),
        }
    }

    fn reconcile_leaf(&mut self, id: NodeId, info: &NodeInfo, desc: &PropLeaf) -> Result<(), SyncError> {
        if info.kind != NodeKind::Leaf {
            return Err(SchemaError::KindMismatch {
                match_name: desc.match_name.clone(),
                expected: "leaf",
                found: info.kind.name(),
            }
            .into());
        }
        if let Some(value) = &desc.value {
            let target = decode_value(value)?;
            if target.is_binary() && !info.caps.binary_payload {
                return Err(SchemaError::NotBinaryCapable {
                    match_name: desc.match_name.clone(),
                }
                .into());
            }
            if self.host.get_value(id)?.as_ref() != Some(&target) {
                self.host.set_value(id, target)?;
                self.stats.updated += 1;
            }
        }
        self.reconcile_keyframes(id, info, &desc.keyframes)
    }

    fn reconcile_keyframes(
        &mut self,
        id: NodeId,
        info: &NodeInfo,
        desc: &[KeyframeDesc],
    ) -> Result<(), SyncError> {
        let target = sorted_keyframes(desc, self.opts.time_tolerance)?;
        if !info.caps.keyframeable {
            if target.is_empty() {
                return Ok(());
            }
            return Err(SchemaError::NotKeyframeable {
                match_name: info.match_name.clone(),
            }
            .into());
        }
        if !info.caps.binary_payload && target.iter().any(|k| k.value.is_binary()) {
            return Err(SchemaError::NotBinaryCapable {
                match_name: info.match_name.clone(),
            }
            .into());
        }
        let live = self.host.get_keyframes(id)?;
        if live.is_empty() && target.is_empty() {
            return Ok(());
        }

        let tol = self.opts.time_tolerance;
        let mut removals = Vec::new();
        let mut updates = Vec::new();
        let mut additions = Vec::new();
        let (mut i, mut j) = (0, 0);
        loop {
            match (live.get(i), target.get(j)) {
                (Some(l), Some(t)) if (l.time - t.time).abs() <= tol => {
                    if l.value != t.value || l.interpolation != t.interpolation {
                        updates.push(Keyframe {
                            time: l.time,
                            value: t.value.clone(),
                            interpolation: t.interpolation,
                        });
                    }
                    i += 1;
                    j += 1;
                }
                (Some(l), Some(t)) if l.time < t.time => {
                    removals.push(l.time);
                    i += 1;
                }
                (Some(_), Some(t)) | (None, Some(t)) => {
                    additions.push(t.clone());
                    j += 1;
                }
                (Some(l), None) => {
                    removals.push(l.time);
                    i += 1;
                }
                (None, None) => break,
            }
        }

        for time in removals {
            self.host.remove_keyframe(id, time)?;
            self.stats.removed += 1;
        }
        for key in &updates {
            self.host.set_keyframe(id, key)?;
            self.stats.updated += 1;
        }
        for key in &additions {
            self.host.add_keyframe(id, key)?;
            self.stats.created += 1;
        }
        Ok(())
    }

    // -------- effects --------

    fn reconcile_effects(
        &mut self,
        layer: LayerId,
        effects: &[EffectDesc],
        path: &NodePath,
    ) -> Result<(), SyncError> {
        let parade = self.host.layer_effects(layer)?;
        let parade_name = self.host.node(parade)?.match_name;
        let live = self.host.get_children(parade)?;
        let mut entries = Vec::with_capacity(live.len());
        for id in live {
            entries.push((self.host.node(id)?.match_name, id));
        }
        let mut index = SiblingIndex::build(entries);
        let mut ords = OrdinalCounter::default();

        for effect in effects {
            let ord = ords.next(effect.match_name.clone());
            let effect_path = path.child(SiblingKey::new(&effect.match_name, ord).label());
            self.checkpoint(&effect_path)?;
            let existing = index.get(effect.match_name.as_str(), ord);
            let result = self.reconcile_effect(layer, parade, &parade_name, existing, effect, &effect_path);
            match result {
                Ok(id) => {
                    if existing.is_none() {
                        index.push(effect.match_name.clone(), id);
                    }
                }
                Err(e) => self.settle(effect_path, Err(e))?,
            }
        }
        Ok(())
    }

    fn reconcile_effect(
        &mut self,
        layer: LayerId,
        parade: NodeId,
        parade_name: &str,
        existing: Option<NodeId>,
        desc: &EffectDesc,
        path: &NodePath,
    ) -> Result<NodeId, SyncError> {
        let id = match existing {
            Some(id) => id,
            None => {
                if !self.host.can_add_stream(parade, &desc.match_name) {
                    return Err(SchemaError::CapabilityRefused {
                        parent: parade_name.to_string(),
                        match_name: desc.match_name.clone(),
                    }
                    .into());
                }
                let id = self.host.create_effect(layer, &desc.match_name)?;
                self.stats.created += 1;
                debug!("applied effect '{}'", desc.match_name);
                id
            }
        };
        let info = self.host.node(id)?;
        if info.kind != NodeKind::Effect {
            return Err(SchemaError::KindMismatch {
                match_name: desc.match_name.clone(),
                expected: "effect",
                found: info.kind.name(),
            }
            .into());
        }
        if !desc.name.is_empty() && info.name != desc.name {
            self.host.rename_node(id, &desc.name)?;
            self.stats.updated += 1;
        }
        let params = desc.params.iter().map(|p| (None, p));
        self.reconcile_children(id, &info.match_name, params, path)?;
        Ok(id)
    }

    // -------- markers --------

    fn reconcile_markers(&mut self, layer: LayerId, desc: &[Marker]) -> Result<(), SyncError> {
        let live = self.host.get_markers(layer)?;
        let mut target: Vec<&Marker> = desc.iter().collect();
        target.sort_by(|a, b| a.time.total_cmp(&b.time));

        let tol = self.opts.time_tolerance;
        let mut updates = Vec::new();
        let mut stale = Vec::new();
        let mut additions = Vec::new();
        let (mut i, mut j) = (0, 0);
        loop {
            match (live.get(i), target.get(j)) {
                (Some(l), Some(t)) if (l.time - t.time).abs() <= tol => {
                    // keep the live time so the host's ordering is untouched
                    let mut want = (*t).clone();
                    want.time = l.time;
                    if want != *l {
                        updates.push((i, want));
                    }
                    i += 1;
                    j += 1;
                }
                (Some(l), Some(t)) if l.time < t.time => {
                    stale.push(i);
                    i += 1;
                }
                (Some(_), Some(t)) | (None, Some(t)) => {
                    additions.push(*t);
                    j += 1;
                }
                (Some(_), None) => {
                    stale.push(i);
                    i += 1;
                }
                (None, None) => break,
            }
        }

        for (index, marker) in &updates {
            self.host.set_marker(layer, *index, marker)?;
            self.stats.updated += 1;
        }
        if self.opts.marker_policy == MarkerPolicy::Replace {
            for index in stale.into_iter().rev() {
                self.host.remove_marker(layer, index)?;
                self.stats.removed += 1;
            }
        }
        for marker in additions {
            self.host.add_marker(layer, marker)?;
            self.stats.created += 1;
        }
        Ok(())
    }
}

/// Decoded target keyframes in ascending time order. Two keyframes within
/// `tolerance` of each other are a duplicate.
pub fn sorted_keyframes(desc: &[KeyframeDesc], tolerance: f64) -> Result<Vec<Keyframe>, SyncError> {
    let mut keys = desc
        .iter()
        .map(|k| -> Result<Keyframe, SyncError> {
            Ok(Keyframe {
                time: k.time,
                value: decode_value(&k.value)?,
                interpolation: k.interpolation,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    if let Some(pair) = keys
        .windows(2)
        .find(|w| (w[1].time - w[0].time).abs() <= tolerance)
    {
        return Err(SchemaError::DuplicateKeyframe { time: pair[1].time }.into());
    }
    Ok(keys)
}
