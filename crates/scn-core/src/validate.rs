//! Host-free checks over a mapping.
//!
//! Runs the same decoding and reference rules the reconciler applies, so a
//! mapping that validates clean can only fail on import for host reasons
//! (refused streams, locked nodes, capability limits).
use indexmap::IndexSet;

use crate::codec::decode_value;
use crate::error::{NodeError, ReferenceError, SchemaError, SyncError};
use crate::identity::{NodePath, OrdinalCounter, SiblingKey};
use crate::import::{ImportOptions, sorted_keyframes};
use crate::schema::{CompData, ItemDesc, ItemType, LayerDesc, ProjectDesc, PropNode, SourceRef};

pub fn validate_project(desc: &ProjectDesc) -> Vec<NodeError> {
    let mut sources = IndexSet::new();
    let mut counter = OrdinalCounter::default();
    collect_sources(&desc.items, &mut counter, &mut sources);

    let mut v = Validator {
        sources,
        tolerance: ImportOptions::default().time_tolerance,
        errors: Vec::new(),
    };
    v.items(&desc.items, &NodePath::root().child("items"));
    v.errors
}

fn collect_sources(
    items: &[ItemDesc],
    counter: &mut OrdinalCounter<(ItemType, String)>,
    out: &mut IndexSet<SourceRef>,
) {
    for item in items {
        let ordinal = counter.next((item.item_type(), item.name().to_string()));
        out.insert(SourceRef {
            kind: item.item_type(),
            name: item.name().to_string(),
            ordinal,
        });
        if let ItemDesc::Folder { children, .. } = item {
            collect_sources(children, counter, out);
        }
    }
}

struct Validator {
    sources: IndexSet<SourceRef>,
    tolerance: f64,
    errors: Vec<NodeError>,
}

impl Validator {
    fn record(&mut self, path: NodePath, error: impl Into<SyncError>) {
        self.errors.push(NodeError {
            path,
            error: error.into(),
        });
    }

    fn items(&mut self, items: &[ItemDesc], path: &NodePath) {
        let mut ords = OrdinalCounter::default();
        for item in items {
            let ord = ords.next((item.item_type(), item.name().to_string()));
            let item_path = path.child(SiblingKey::new(item.name(), ord).label());
            match item {
                ItemDesc::Comp { comp_data, .. } => self.comp(comp_data, &item_path.child("layers")),
                ItemDesc::Folder { children, .. } => self.items(children, &item_path.child("children")),
                ItemDesc::Footage { .. } => {}
            }
        }
    }

    fn comp(&mut self, comp: &CompData, path: &NodePath) {
        let mut ords = OrdinalCounter::default();
        for layer in &comp.layers {
            let ord = ords.next((layer.kind, layer.name.clone()));
            self.layer(layer, &path.child(SiblingKey::new(&layer.name, ord).label()));
        }
    }

    fn layer(&mut self, layer: &LayerDesc, path: &NodePath) {
        match &layer.source {
            Some(r) if !self.sources.contains(r) => {
                let error = ReferenceError {
                    kind: r.kind.name(),
                    name: r.name.clone(),
                    ordinal: r.ordinal,
                };
                self.record(path.clone(), error);
            }
            None if layer.kind.requires_source() => {
                self.record(path.clone(), SchemaError::MissingSource(layer.kind.name()));
            }
            _ => {}
        }

        self.node(&layer.properties, &path.child("properties"));

        let mut ords = OrdinalCounter::default();
        let effects_path = path.child("effects");
        for effect in &layer.effects {
            let ord = ords.next(effect.match_name.as_str());
            let effect_path = effects_path.child(SiblingKey::new(&effect.match_name, ord).label());
            self.children(effect.params.iter().map(|p| (None, p)), &effect_path);
        }
    }

    fn children<'d>(
        &mut self,
        nodes: impl IntoIterator<Item = (Option<&'d str>, &'d PropNode)>,
        path: &NodePath,
    ) {
        let mut ords = OrdinalCounter::<String>::default();
        for (label, node) in nodes {
            let ord = ords.for_child(label, node.match_name());
            self.node(node, &path.child(SiblingKey::new(node.match_name(), ord).label()));
        }
    }

    fn node(&mut self, node: &PropNode, path: &NodePath) {
        match node {
            PropNode::Group(group) => self.children(
                group.children.iter().map(|(label, n)| (Some(label.as_str()), n)),
                path,
            ),
            PropNode::Leaf(leaf) => {
                if let Some(value) = &leaf.value
                    && let Err(e) = decode_value(value)
                {
                    self.record(path.clone(), e);
                }
                if let Err(e) = sorted_keyframes(&leaf.keyframes, self.tolerance) {
                    self.record(path.clone(), e);
                }
            }
        }
    }
}
