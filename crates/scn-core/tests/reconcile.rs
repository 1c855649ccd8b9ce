mod common;

use std::ops::ControlFlow;

use assert_matches::assert_matches;
use common::*;
use scn_core::codec::{CustomData, PropValue, encode_value};
use scn_core::host::{ChildKind, ItemInit, Keyframe, SceneRead, SceneWrite};
use scn_core::schema::{
    EffectDesc, FootageSource, Interpolation, ItemDesc, ItemType, LayerKind, ProjectDesc,
    PropNode, SourceRef, Value,
};
use scn_core::{
    ExportOptions, ImportOptions, MarkerPolicy, MemoryHost, Reconciler, SchemaError,
    StreamCatalog, SyncError, export_project, import_project,
};

const BLUR: &str = "ADBE Gaussian Blur 2";
const BLURRINESS: &str = "ADBE Gaussian Blur 2-0001";

fn blur(name: &str, amount: f64) -> EffectDesc {
    EffectDesc {
        match_name: BLUR.into(),
        name: name.into(),
        params: vec![leaf(BLURRINESS, Value::Number(amount))],
    }
}

fn one_layer(props: Vec<PropNode>) -> ProjectDesc {
    ProjectDesc {
        items: vec![comp("Main", vec![layer(LayerKind::Solid, "Bg", 1, props)])],
    }
}

#[test]
fn same_named_effects_keep_their_own_params() {
    let catalog = StreamCatalog::new().register_effect(BLUR, [(BLURRINESS, PropValue::Scalar(0.0))]);
    let mut host = MemoryHost::with_catalog(catalog);
    let mut desc = one_layer(vec![transform(100.0)]);
    comp_mut(&mut desc, "Main").layers[0].effects = vec![blur("Blur A", 5.0), blur("Blur B", 20.0)];

    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert!(report.is_clean(), "{:?}", report.errors);

    let main = top_item(&host, "Main");
    let bg = layer_named(&host, main, "Bg");
    let parade = host.layer_effects(bg).unwrap();
    let effects = host.get_children(parade).unwrap();
    assert_eq!(effects.len(), 2);
    let amounts: Vec<_> = effects
        .iter()
        .map(|e| {
            let param = child_named(&host, *e, BLURRINESS);
            host.get_value(param).unwrap()
        })
        .collect();
    assert_eq!(
        amounts,
        [Some(PropValue::Scalar(5.0)), Some(PropValue::Scalar(20.0))]
    );

    let exported = export_project(&host, ExportOptions::default()).project;
    assert_eq!(exported, desc);
}

#[test]
fn refused_stream_is_reported_and_siblings_still_apply() {
    let catalog = StreamCatalog::new().allow_only(["ADBE Transform Group", "ADBE Position", "ADBE Opacity"]);
    let mut host = MemoryHost::with_catalog(catalog);
    let desc = one_layer(vec![
        leaf("ADBE Bogus Stream", Value::Number(1.0)),
        transform(35.0),
    ]);

    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert_eq!(report.errors.len(), 1);
    let err = &report.errors[0];
    assert!(
        err.path.to_string().ends_with("/properties/ADBE Bogus Stream#0"),
        "{}",
        err.path
    );
    assert_matches!(
        &err.error,
        SyncError::Schema(SchemaError::CapabilityRefused { match_name, .. }) if match_name == "ADBE Bogus Stream"
    );

    let main = top_item(&host, "Main");
    let root = host.layer_root(layer_named(&host, main, "Bg")).unwrap();
    let xf = child_named(&host, root, "ADBE Transform Group");
    let opacity = child_named(&host, xf, "ADBE Opacity");
    assert_eq!(host.get_value(opacity).unwrap(), Some(PropValue::Scalar(35.0)));
}

#[test]
fn moving_one_keyframe_is_one_removal_and_one_addition() {
    let mut host = MemoryHost::new();
    let main = host
        .create_item(None, "Main", &ItemInit::Comp(Default::default()))
        .unwrap();
    let bg = host.create_layer(main, LayerKind::Solid, "Bg", None).unwrap();
    let root = host.layer_root(bg).unwrap();
    let xf = host
        .add_group_child(root, "ADBE Transform Group", ChildKind::Group)
        .unwrap();
    let opacity = host.add_group_child(xf, "ADBE Opacity", ChildKind::Leaf).unwrap();
    for time in [0.0, 1.0, 2.0] {
        let key = Keyframe {
            time,
            value: PropValue::Scalar(100.0),
            interpolation: Interpolation::Linear,
        };
        host.add_keyframe(opacity, &key).unwrap();
    }

    let mut desc = export_project(&host, ExportOptions::default()).project;
    let layer = &mut comp_mut(&mut desc, "Main").layers[0];
    leaf_mut(layer, &["ADBE Transform Group#0", "ADBE Opacity#0"]).keyframes[1].time = 1.5;

    let before = host.mutation_count();
    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(host.mutation_count() - before, 2);
    assert_eq!(report.stats.removed, 1);
    assert_eq!(report.stats.created, 1);

    let times: Vec<f64> = host
        .get_keyframes(opacity)
        .unwrap()
        .iter()
        .map(|k| k.time)
        .collect();
    assert_eq!(times, [0.0, 1.5, 2.0]);
}

#[test]
fn keyframe_list_is_authoritative() {
    let mut host = MemoryHost::new();
    let mut desc = one_layer(vec![animated("ADBE Opacity", &[(0.0, 0.0), (1.0, 50.0)])]);
    import_project(&mut host, &desc, ImportOptions::default());

    let layer = &mut comp_mut(&mut desc, "Main").layers[0];
    let opacity = leaf_mut(layer, &["ADBE Opacity#0"]);
    opacity.keyframes.clear();
    opacity.value = Some(Value::Number(75.0));

    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert!(report.is_clean());
    assert_eq!(report.stats.removed, 2);
    assert_eq!(report.stats.updated, 1);

    let main = top_item(&host, "Main");
    let root = host.layer_root(layer_named(&host, main, "Bg")).unwrap();
    let node = child_named(&host, root, "ADBE Opacity");
    assert!(host.get_keyframes(node).unwrap().is_empty());
}

#[test]
fn keyframe_times_within_tolerance_are_the_same_key() {
    let mut host = MemoryHost::new();
    let mut desc = one_layer(vec![animated("ADBE Opacity", &[(1.0, 10.0)])]);
    import_project(&mut host, &desc, ImportOptions::default());

    let layer = &mut comp_mut(&mut desc, "Main").layers[0];
    let key = &mut leaf_mut(layer, &["ADBE Opacity#0"]).keyframes[0];
    key.time = 1.0 + 1e-9;
    key.value = Value::Number(20.0);

    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.stats.updated, 1);
    assert_eq!(report.stats.total(), 1);
}

#[test]
fn duplicate_keyframe_times_are_rejected_for_that_leaf_only() {
    let mut host = MemoryHost::new();
    let desc = one_layer(vec![
        animated("ADBE Opacity", &[(1.0, 10.0), (1.0, 20.0)]),
        leaf("ADBE Position", Value::Vector(vec![1.0, 2.0])),
    ]);
    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert_eq!(report.errors.len(), 1);
    assert_matches!(
        report.errors[0].error,
        SyncError::Schema(SchemaError::DuplicateKeyframe { .. })
    );

    let main = top_item(&host, "Main");
    let root = host.layer_root(layer_named(&host, main, "Bg")).unwrap();
    let pos = child_named(&host, root, "ADBE Position");
    assert_eq!(host.get_value(pos).unwrap(), Some(PropValue::Vec2([1.0, 2.0])));
}

#[test]
fn static_and_plain_streams_refuse_what_they_cannot_hold() {
    let catalog = StreamCatalog::new()
        .static_stream("ADBE Layer Name")
        .plain_stream("ADBE Opacity");
    let mut host = MemoryHost::with_catalog(catalog);
    let custom = PropValue::Custom(CustomData {
        channels: [1.0, 2.0, 3.0, 4.0],
        selector: 0,
        enabled: false,
    });
    let desc = one_layer(vec![
        animated("ADBE Layer Name", &[(0.0, 1.0)]),
        leaf("ADBE Opacity", encode_value(&custom)),
    ]);

    let report = import_project(&mut host, &desc, ImportOptions::default());
    let errors: Vec<_> = report.errors.iter().map(|e| e.error.clone()).collect();
    assert_matches!(
        errors.as_slice(),
        [
            SyncError::Schema(SchemaError::NotKeyframeable { .. }),
            SyncError::Schema(SchemaError::NotBinaryCapable { .. }),
        ]
    );
}

#[test]
fn group_described_as_leaf_is_a_kind_mismatch() {
    let mut host = MemoryHost::new();
    let desc = one_layer(vec![transform(100.0)]);
    import_project(&mut host, &desc, ImportOptions::default());

    let bad = one_layer(vec![leaf("ADBE Transform Group", Value::Number(1.0))]);
    let report = import_project(&mut host, &bad, ImportOptions::default());
    assert_matches!(
        report.errors.as_slice(),
        [e] if matches!(e.error, SyncError::Schema(SchemaError::KindMismatch { found: "group", .. }))
    );
}

#[test]
fn markers_merge_or_replace() {
    let base = {
        let mut desc = one_layer(vec![]);
        comp_mut(&mut desc, "Main").layers[0].markers = vec![marker(1.0, "a"), marker(2.0, "b")];
        desc
    };
    let mut target = base.clone();
    comp_mut(&mut target, "Main").layers[0].markers = vec![marker(3.0, "c"), marker(2.0, "B")];

    for (policy, expected) in [
        (MarkerPolicy::Merge, vec![(1.0, "a"), (2.0, "B"), (3.0, "c")]),
        (MarkerPolicy::Replace, vec![(2.0, "B"), (3.0, "c")]),
    ] {
        let mut host = MemoryHost::new();
        import_project(&mut host, &base, ImportOptions::default());
        let opts = ImportOptions {
            marker_policy: policy,
            ..ImportOptions::default()
        };
        let report = import_project(&mut host, &target, opts);
        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.created, 1);

        let main = top_item(&host, "Main");
        let markers = host.get_markers(layer_named(&host, main, "Bg")).unwrap();
        let got: Vec<(f64, &str)> = markers.iter().map(|m| (m.time, m.comment.as_str())).collect();
        assert_eq!(got, expected, "{policy:?}");
    }
}

#[test]
fn unresolved_source_fails_only_that_layer() {
    let mut host = MemoryHost::new();
    let mut broken = layer(LayerKind::Footage, "Clip", 1, vec![]);
    broken.source = Some(SourceRef {
        kind: ItemType::Footage,
        name: "missing.mov".into(),
        ordinal: 0,
    });
    let unsourced = layer(LayerKind::Footage, "Bare", 2, vec![]);
    let fine = layer(LayerKind::Null, "Ctrl", 3, vec![]);
    let desc = ProjectDesc {
        items: vec![comp("Main", vec![broken, unsourced, fine])],
    };

    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert_eq!(report.errors.len(), 2);
    assert_matches!(&report.errors[0].error, SyncError::Reference(r) if r.name == "missing.mov");
    assert_matches!(
        report.errors[1].error,
        SyncError::Schema(SchemaError::MissingSource("footage"))
    );
    let main = top_item(&host, "Main");
    assert_eq!(layer_names(&host, main), ["Ctrl"]);
}

#[test]
fn locked_node_reports_host_error_and_siblings_update() {
    let mut host = MemoryHost::new();
    let mut desc = one_layer(vec![transform(100.0)]);
    import_project(&mut host, &desc, ImportOptions::default());

    let main = top_item(&host, "Main");
    let root = host.layer_root(layer_named(&host, main, "Bg")).unwrap();
    let xf = child_named(&host, root, "ADBE Transform Group");
    host.lock(child_named(&host, xf, "ADBE Opacity"));

    let layer = &mut comp_mut(&mut desc, "Main").layers[0];
    leaf_mut(layer, &["ADBE Transform Group#0", "ADBE Opacity#0"]).value = Some(Value::Number(10.0));
    leaf_mut(layer, &["ADBE Transform Group#0", "ADBE Position#0"]).value =
        Some(Value::Vector(vec![0.0, 0.0, 0.0]));

    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert_matches!(report.errors.as_slice(), [e] if matches!(e.error, SyncError::Host(_)));
    let pos = child_named(&host, xf, "ADBE Position");
    assert_eq!(host.get_value(pos).unwrap(), Some(PropValue::Vec3([0.0; 3])));
}

#[test]
fn layers_follow_described_indexes() {
    let mut host = MemoryHost::new();
    let names = ["A", "B", "C"];
    let layers = names
        .iter()
        .enumerate()
        .map(|(i, n)| layer(LayerKind::Null, n, i + 1, vec![]))
        .collect();
    let mut desc = ProjectDesc {
        items: vec![comp("Main", layers)],
    };
    import_project(&mut host, &desc, ImportOptions::default());

    for (layer, index) in comp_mut(&mut desc, "Main").layers.iter_mut().zip([3, 1, 2]) {
        layer.index = index;
    }
    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert!(report.is_clean());
    assert_eq!(report.stats.moved, 2);
    let main = top_item(&host, "Main");
    assert_eq!(layer_names(&host, main), ["B", "C", "A"]);

    let again = import_project(&mut host, &desc, ImportOptions::default());
    assert_eq!(again.stats.total(), 0);
}

#[test]
fn effect_display_name_is_renamed_in_place() {
    let mut host = MemoryHost::new();
    let mut desc = one_layer(vec![]);
    comp_mut(&mut desc, "Main").layers[0].effects = vec![blur("Blur", 1.0)];
    import_project(&mut host, &desc, ImportOptions::default());

    comp_mut(&mut desc, "Main").layers[0].effects[0].name = "Haze".into();
    let before = host.mutation_count();
    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert_eq!(report.stats.updated, 1);
    assert_eq!(host.mutation_count() - before, 1);

    let main = top_item(&host, "Main");
    let parade = host.layer_effects(layer_named(&host, main, "Bg")).unwrap();
    let effect = host.get_children(parade).unwrap()[0];
    assert_eq!(host.node(effect).unwrap().name, "Haze");
}

#[test]
fn comp_settings_update_without_recreating_the_comp() {
    let mut host = MemoryHost::new();
    let mut desc = one_layer(vec![]);
    import_project(&mut host, &desc, ImportOptions::default());
    let main = top_item(&host, "Main");

    comp_mut(&mut desc, "Main").settings.frame_rate = 24.0;
    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert_eq!(report.stats.created, 0);
    assert_eq!(report.stats.updated, 1);
    assert_eq!(host.items(), [main]);
    assert_eq!(host.comp_settings(main).unwrap().frame_rate, 24.0);
}

#[test]
fn failed_settings_write_keeps_the_item_sourceable_and_its_layers_reconciled() {
    let mut host = MemoryHost::new();
    let mut desc = sample_project();
    assert!(import_project(&mut host, &desc, ImportOptions::default()).is_clean());
    let pre = top_item(&host, "Pre");
    let assets = top_item(&host, "Assets");
    let clip = host.folder_children(assets).unwrap()[0];
    host.lock_item(pre);
    host.lock_item(clip);

    let target = comp_mut(&mut desc, "Pre");
    target.settings.frame_rate = 24.0;
    target.layers[0].in_point = 2.0;
    let ItemDesc::Folder { children, .. } = &mut desc.items[1] else {
        panic!("expected the Assets folder");
    };
    let ItemDesc::Footage { footage_data, .. } = &mut children[0] else {
        panic!("expected footage first");
    };
    footage_data.source = FootageSource::File {
        path: "/media/clip_v2.mov".into(),
    };

    let report = import_project(&mut host, &desc, ImportOptions::default());
    let errors: Vec<String> = report.errors.iter().map(|e| e.path.to_string()).collect();
    assert_eq!(errors, ["/items/Assets#0/children/clip#0", "/items/Pre#0"]);
    assert!(
        report
            .errors
            .iter()
            .all(|e| matches!(e.error, SyncError::Host(_)))
    );

    // both items still resolve, so no layer sourcing them fails
    assert_eq!(report.items.len(), 5);
    assert_eq!(host.comp_settings(pre).unwrap().frame_rate, 30.0);
    let bg = layer_named(&host, pre, "Bg");
    assert_eq!(host.layer(bg).unwrap().in_point, 2.0);
    let main = top_item(&host, "Main");
    let nested = layer_named(&host, main, "Pre");
    assert_eq!(host.layer(nested).unwrap().source, Some(pre));
    assert_eq!(host.layer(layer_named(&host, main, "Clip")).unwrap().source, Some(clip));
}

#[test]
fn cancelling_stops_the_pass_and_releases_the_host() {
    let mut host = MemoryHost::new();
    let desc = sample_project();
    let mut seen = 0;
    let report = Reconciler::new(&mut host, ImportOptions::default())
        .with_hook(|_path| {
            seen += 1;
            if seen > 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .run(&desc);

    assert!(report.cancelled);
    assert!(!report.is_clean());
    assert!(!host.pass_open());
    assert_eq!(host.finished_passes(), 1);

    // partial updates stay; a second full pass completes the scene
    let report = import_project(&mut host, &desc, ImportOptions::default());
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(export_project(&host, ExportOptions::default()).project, desc);
}

#[test]
fn dropping_an_unused_reconciler_ends_its_pass() {
    let mut host = MemoryHost::new();
    {
        let _r = Reconciler::new(&mut host, ImportOptions::default());
    }
    assert!(!host.pass_open());
    assert_eq!(host.finished_passes(), 1);
}
