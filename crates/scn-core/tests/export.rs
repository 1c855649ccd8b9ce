mod common;

use assert_matches::assert_matches;
use common::*;
use scn_core::export::export_marker;
use scn_core::host::{SceneRead, SceneWrite};
use scn_core::schema::{ItemDesc, Marker, PropNode, Value};
use scn_core::{
    ExportOptions, Exporter, ImportOptions, MemoryHost, SchemaError, SyncError, export_project,
    import_project,
};

fn sample_host() -> MemoryHost {
    let mut host = MemoryHost::new();
    let report = import_project(&mut host, &sample_project(), ImportOptions::default());
    assert!(report.is_clean(), "{:?}", report.errors);
    host
}

#[test]
fn unknown_item_kind_is_reported_and_skipped() {
    let mut host = sample_host();
    host.insert_unsupported_item("Grade", "ADBE LUT Item");

    let report = export_project(&host, ExportOptions::default());
    assert_eq!(report.project.items.len(), 3);
    assert_matches!(
        report.errors.as_slice(),
        [e] if e.path.to_string() == "/items/Grade"
            && matches!(&e.error, SyncError::Schema(SchemaError::UnknownKind { kind, .. }) if kind == "ADBE LUT Item")
    );
}

#[test]
fn depth_guard_cuts_only_the_deep_nodes() {
    let host = sample_host();
    let report = export_project(&host, ExportOptions { max_depth: 2 });

    // the mask shape sits at depth 3 under the "Pre" shape layer
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_matches!(
        report.errors[0].error,
        SyncError::Schema(SchemaError::DepthExceeded(2))
    );
    assert!(
        report.errors[0]
            .path
            .to_string()
            .ends_with("/ADBE Mask Parade#0/ADBE Mask Atom#0/ADBE Mask Shape#0")
    );

    let ItemDesc::Comp { comp_data, .. } = &report.project.items[0] else {
        panic!("expected Main first");
    };
    let PropNode::Group(root) = &comp_data.layers[2].properties else {
        panic!("root is a group");
    };
    let PropNode::Group(parade) = &root.children["ADBE Mask Parade#0"] else {
        panic!("parade is a group");
    };
    let PropNode::Group(atom) = &parade.children["ADBE Mask Atom#0"] else {
        panic!("atom is a group");
    };
    assert!(atom.children.is_empty());
}

#[test]
fn single_nodes_export_on_their_own() {
    let host = sample_host();
    let main = top_item(&host, "Main");
    let title = layer_named(&host, main, "Title");
    let mut exporter = Exporter::new(&host, ExportOptions::default());

    let layer = exporter.export_layer(title).unwrap();
    assert_eq!(layer.effects.len(), 2);

    let parade = host.layer_effects(title).unwrap();
    let second = host.get_children(parade).unwrap()[1];
    let effect = exporter.export_effect(second).unwrap();
    assert_eq!(effect.name, "Softer");
    assert_eq!(effect.params.len(), 2);

    let param = host.get_children(second).unwrap()[0];
    assert_matches!(
        exporter.export_param(param).unwrap(),
        PropNode::Leaf(l) if l.value == Some(Value::Number(12.0))
    );

    let root = host.layer_root(title).unwrap();
    let tree = exporter.export_property_tree(root).unwrap();
    assert_eq!(tree, layer.properties);

    let item = exporter.export_item(main).unwrap();
    assert_eq!(item.name(), "Main");
    assert!(exporter.errors().is_empty());
}

#[test]
fn layer_sources_carry_depth_first_ordinals() {
    let host = sample_host();
    let report = export_project(&host, ExportOptions::default());
    let ItemDesc::Comp { comp_data, .. } = &report.project.items[0] else {
        panic!("expected Main first");
    };
    let pre = comp_data.layers[2].source.as_ref().unwrap();
    assert_eq!((pre.name.as_str(), pre.ordinal), ("Pre", 1));

    let json = serde_json::to_value(&report.project).unwrap();
    let clip = json.pointer("/items/0/comp_data/layers/1/source").unwrap();
    // ordinal 0 is left out of the mapping
    assert_eq!(clip, &serde_json::json!({"type": "Footage", "name": "clip"}));
}

#[test]
fn markers_drop_empty_fields_and_refuse_non_finite_times() {
    let chaptered = Marker {
        chapter: Some(String::new()),
        url: Some("https://example.com/notes".into()),
        ..marker(1.0, "beat")
    };
    let exported = export_marker(&chaptered).unwrap();
    assert_eq!(exported.chapter, None);
    assert_eq!(exported.url.as_deref(), Some("https://example.com/notes"));
    assert_eq!(exported.comment, "beat");

    let endless = Marker {
        duration: f64::INFINITY,
        ..marker(2.0, "")
    };
    assert_matches!(
        export_marker(&endless),
        Err(SyncError::Schema(SchemaError::NonFiniteTime { what: "marker duration", .. }))
    );

    let mut host = sample_host();
    let main = top_item(&host, "Main");
    let title = layer_named(&host, main, "Title");
    host.add_marker(title, &marker(f64::NAN, "lost")).unwrap();
    let report = export_project(&host, ExportOptions::default());
    assert_eq!(report.errors.len(), 1);
    // NaN compares false against every time, so it lands first
    assert!(report.errors[0].path.to_string().ends_with("/Title/markers/0"));

    let ItemDesc::Comp { comp_data, .. } = &report.project.items[0] else {
        panic!("expected Main first");
    };
    assert_eq!(comp_data.layers[0].markers.len(), 2);
}
