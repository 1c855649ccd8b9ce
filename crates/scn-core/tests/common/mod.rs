#![allow(dead_code)]

use scn_core::codec::{CustomData, PropValue, ShapePath, ShapeVertex, encode_value};
use scn_core::host::{ItemId, LayerId, NodeId, SceneRead};
use scn_core::identity::assign_ordinals;
use scn_core::schema::{
    CompData, CompSettings, EffectDesc, FootageData, FootageSource, Interpolation, ItemDesc,
    ItemType, KeyframeDesc, LayerDesc, LayerKind, Marker, ProjectDesc, PropGroup, PropLeaf,
    PropNode, SourceRef, Value,
};

pub fn leaf(match_name: &str, value: Value) -> PropNode {
    PropNode::Leaf(PropLeaf {
        match_name: match_name.to_string(),
        value: Some(value),
        keyframes: Vec::new(),
    })
}

pub fn animated(match_name: &str, keys: &[(f64, f64)]) -> PropNode {
    PropNode::Leaf(PropLeaf {
        match_name: match_name.to_string(),
        value: None,
        keyframes: keys
            .iter()
            .map(|&(time, v)| KeyframeDesc {
                time,
                value: Value::Number(v),
                interpolation: Interpolation::Linear,
            })
            .collect(),
    })
}

pub fn group(match_name: &str, children: Vec<PropNode>) -> PropNode {
    let keys = assign_ordinals(children.iter().map(PropNode::match_name));
    PropNode::Group(PropGroup {
        match_name: match_name.to_string(),
        children: keys.iter().map(|k| k.label()).zip(children).collect(),
    })
}

pub fn layer(kind: LayerKind, name: &str, index: usize, props: Vec<PropNode>) -> LayerDesc {
    LayerDesc {
        kind,
        name: name.to_string(),
        index,
        in_point: 0.0,
        out_point: 10.0,
        source: None,
        properties: group(kind.root_match_name(), props),
        effects: Vec::new(),
        markers: Vec::new(),
    }
}

pub fn comp(name: &str, layers: Vec<LayerDesc>) -> ItemDesc {
    ItemDesc::Comp {
        name: name.to_string(),
        comp_data: CompData {
            settings: CompSettings::default(),
            layers,
        },
    }
}

pub fn marker(time: f64, comment: &str) -> Marker {
    Marker {
        time,
        comment: comment.to_string(),
        ..Marker::default()
    }
}

pub fn transform(opacity: f64) -> PropNode {
    group(
        "ADBE Transform Group",
        vec![
            leaf("ADBE Position", Value::Vector(vec![960.0, 540.0, 0.0])),
            leaf("ADBE Opacity", Value::Number(opacity)),
        ],
    )
}

/// A project touching every item kind, duplicate names, layer sources,
/// binary values, keyframes, effects and markers.
pub fn sample_project() -> ProjectDesc {
    let mask = PropValue::Shape(ShapePath {
        closed: true,
        vertices: vec![
            ShapeVertex {
                point: [0.0, 0.0],
                in_tangent: [0.0, 0.0],
                out_tangent: [10.0, 0.0],
            },
            ShapeVertex {
                point: [100.0, 50.0],
                in_tangent: [-10.0, 0.0],
                out_tangent: [0.0, 0.0],
            },
        ],
    });
    let custom = PropValue::Custom(CustomData {
        channels: [0.5, 1.0, 0.0, 2.0],
        selector: 3,
        enabled: true,
    });

    let mut title = layer(
        LayerKind::Text,
        "Title",
        1,
        vec![
            transform(100.0),
            leaf("ADBE Text Document", Value::Text("Hello".into())),
            animated("ADBE Text Tracking", &[(0.0, 0.0), (1.0, 25.0), (2.0, 50.0)]),
        ],
    );
    title.markers = vec![marker(0.5, "in"), marker(4.0, "out")];
    title.effects = vec![
        EffectDesc {
            match_name: "ADBE Gaussian Blur 2".into(),
            name: "Soft".into(),
            params: vec![leaf("ADBE Gaussian Blur 2-0001", Value::Number(4.0))],
        },
        EffectDesc {
            match_name: "ADBE Gaussian Blur 2".into(),
            name: "Softer".into(),
            params: vec![
                leaf("ADBE Gaussian Blur 2-0001", Value::Number(12.0)),
                leaf("Pseudo/Custom-0001", encode_value(&custom)),
            ],
        },
    ];

    let mut clip = layer(LayerKind::Footage, "Clip", 2, vec![transform(80.0)]);
    clip.source = Some(SourceRef {
        kind: ItemType::Footage,
        name: "clip".into(),
        ordinal: 0,
    });

    let mut nested = layer(
        LayerKind::Shape,
        "Pre",
        3,
        vec![group(
            "ADBE Mask Parade",
            vec![group(
                "ADBE Mask Atom",
                vec![leaf("ADBE Mask Shape", encode_value(&mask))],
            )],
        )],
    );
    // second comp named "Pre" in depth-first order
    nested.source = Some(SourceRef {
        kind: ItemType::Comp,
        name: "Pre".into(),
        ordinal: 1,
    });

    ProjectDesc {
        items: vec![
            comp("Main", vec![title, clip, nested]),
            ItemDesc::Folder {
                name: "Assets".into(),
                children: vec![
                    ItemDesc::Footage {
                        name: "clip".into(),
                        footage_data: FootageData {
                            source: FootageSource::File {
                                path: "/media/clip.mov".into(),
                            },
                        },
                    },
                    comp("Pre", vec![layer(LayerKind::Null, "Ctrl", 1, vec![transform(0.0)])]),
                ],
            },
            comp("Pre", vec![layer(LayerKind::Solid, "Bg", 1, vec![transform(100.0)])]),
        ],
    }
}

pub fn comp_mut<'a>(project: &'a mut ProjectDesc, name: &str) -> &'a mut CompData {
    project
        .items
        .iter_mut()
        .find_map(|item| match item {
            ItemDesc::Comp { name: n, comp_data } if n == name => Some(comp_data),
            _ => None,
        })
        .unwrap()
}

/// Walks child labels from a layer's root group down to a leaf.
pub fn leaf_mut<'a>(layer: &'a mut LayerDesc, labels: &[&str]) -> &'a mut PropLeaf {
    let mut node = &mut layer.properties;
    for label in labels {
        node = match node {
            PropNode::Group(g) => g.children.get_mut(*label).unwrap(),
            PropNode::Leaf(_) => panic!("'{label}' is below a leaf"),
        };
    }
    match node {
        PropNode::Leaf(l) => l,
        PropNode::Group(g) => panic!("'{}' is a group", g.match_name),
    }
}

pub fn top_item<H: SceneRead>(host: &H, name: &str) -> ItemId {
    host.items()
        .into_iter()
        .find(|id| host.item(*id).unwrap().name == name)
        .unwrap()
}

pub fn layer_named<H: SceneRead>(host: &H, comp: ItemId, name: &str) -> LayerId {
    host.comp_layers(comp)
        .unwrap()
        .into_iter()
        .find(|id| host.layer(*id).unwrap().name == name)
        .unwrap()
}

pub fn child_named<H: SceneRead>(host: &H, node: NodeId, match_name: &str) -> NodeId {
    host.get_children(node)
        .unwrap()
        .into_iter()
        .find(|id| host.node(*id).unwrap().match_name == match_name)
        .unwrap()
}

pub fn layer_names<H: SceneRead>(host: &H, comp: ItemId) -> Vec<String> {
    host.comp_layers(comp)
        .unwrap()
        .into_iter()
        .map(|id| host.layer(id).unwrap().name)
        .collect()
}
