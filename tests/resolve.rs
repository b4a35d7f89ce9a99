mod support;

use pretty_assertions::assert_eq;

use modwire::core::namespace::{
    CARDINALITY_DIRECTIVE, CARDINALITY_MULTIPLE, PACKAGE_NAMESPACE, RESOLUTION_DIRECTIVE,
    RESOLUTION_OPTIONAL, USES_DIRECTIVE,
};
use modwire::{resolve, resolve_dynamic, Filter, ResolutionError, Resource, Value, Wire};

use support::{assert_wires_satisfy, only_wire, v, vr, wires_of, TestContext};

#[test]
fn single_import_wires_to_exporter() {
    let a = Resource::build("a", v("1.0.0"))
        .export_package("x", v("1.0.0"), &[])
        .finish();
    let b = Resource::build("b", v("1.0.0"))
        .import_package("x", vr("*"))
        .finish();
    let ctx = TestContext::new().mandatory(&b).known(&a);

    let map = resolve(&ctx).unwrap();

    assert_wires_satisfy(&map);
    let wire = only_wire(&map, &b);
    assert_eq!(*wire.provider(), a);
    assert_eq!(*wire.requirer(), b);
    // The exporter was newly resolved along the way and has an entry of
    // its own.
    assert!(wires_of(&map, &a).is_empty());
}

#[test]
fn missing_mandatory_requirement_is_fatal() {
    let b = Resource::build("b", v("1.0.0"))
        .import_package("x", vr("*"))
        .finish();
    let ctx = TestContext::new().mandatory(&b);

    let err = resolve(&ctx).unwrap_err();
    match &err {
        ResolutionError::MissingRequirement { requirement } => {
            assert_eq!(*requirement, b.requirements(None)[0]);
        }
        other => panic!("expected missing requirement, got {}", other),
    }
    assert_eq!(err.unresolved_requirements(), b.requirements(None));
}

#[test]
fn optional_requirement_resolves_without_wire() {
    let b = Resource::build("b", v("1.0.0"))
        .import_package_with("x", vr("*"), vec![(RESOLUTION_DIRECTIVE, RESOLUTION_OPTIONAL)])
        .finish();
    let ctx = TestContext::new().mandatory(&b);

    let map = resolve(&ctx).unwrap();
    assert!(wires_of(&map, &b).is_empty());
}

#[test]
fn fragment_payload_merges_into_host() {
    let host = Resource::build("host", v("1.0.0"))
        .host()
        .export_package("h", v("1.0.0"), &[])
        .finish();
    let fragment = Resource::build("frag", v("1.0.0"))
        .fragment_of("host")
        .export_package("f", v("1.0.0"), &[])
        .finish();
    let user = Resource::build("user", v("1.0.0"))
        .import_package("f", vr("*"))
        .finish();
    let ctx = TestContext::new()
        .mandatory(&host)
        .mandatory(&fragment)
        .mandatory(&user);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    // The fragment's entry is exactly its host wire.
    let host_wire = only_wire(&map, &fragment);
    assert_eq!(*host_wire.provider(), host);
    assert_eq!(*host_wire.requirer(), fragment);

    // The wrap exports the fragment's package: the user wires to the host
    // as provider, through the fragment's declared capability.
    let user_wire = only_wire(&map, &user);
    assert_eq!(*user_wire.provider(), host);
    assert_eq!(user_wire.capability().resource(), fragment);

    assert!(wires_of(&map, &host).is_empty());
}

#[test]
fn fragment_import_conflict_rotates_to_common_provider() {
    let w1 = Resource::build("wlib", v("1.0.0"))
        .export_package("w", v("1.0.0"), &[])
        .finish();
    let w2 = Resource::build("wlib", v("2.0.0"))
        .export_package("w", v("2.0.0"), &[])
        .finish();
    let host = Resource::build("host", v("1.0.0"))
        .host()
        .import_package("w", vr("^1"))
        .finish();
    let fragment = Resource::build("frag", v("1.0.0"))
        .fragment_of("host")
        .import_package("w", vr("*"))
        .finish();
    let ctx = TestContext::new()
        .mandatory(&host)
        .mandatory(&fragment)
        .known(&w1)
        .known(&w2);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    // The fragment's import would prefer wlib v2, but the host can only
    // see v1; both end up on the common provider and the package is wired
    // once.
    let host_wires: Vec<_> = wires_of(&map, &host)
        .iter()
        .filter(|w| w.requirement().namespace().as_str() == PACKAGE_NAMESPACE)
        .collect();
    assert_eq!(host_wires.len(), 1);
    assert_eq!(*host_wires[0].provider(), w1);
}

#[test]
fn fragment_attachment_cycle_is_rejected() {
    let f1 = Resource::build("f1", v("1.0.0")).host().fragment_of("f2").finish();
    let f2 = Resource::build("f2", v("1.0.0")).host().fragment_of("f1").finish();
    let ctx = TestContext::new().mandatory(&f1).mandatory(&f2);

    let err = resolve(&ctx).unwrap_err();
    assert!(matches!(err, ResolutionError::FragmentCycle { .. }));
}

#[test]
fn uses_conflict_backtracks_import_choice() {
    // a1 is the only provider of p and pins q to qlib v1 through its uses
    // constraint; b would prefer qlib v2 but has to follow.
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let a1 = Resource::build("plib", v("1.0.0"))
        .export_package("p", v("1.0.0"), &["q"])
        .import_package("q", vr("^1"))
        .finish();
    let b = Resource::build("b", v("1.0.0"))
        .import_package("p", vr("=1.0.0"))
        .import_package("q", vr("*"))
        .finish();
    let ctx = TestContext::new()
        .mandatory(&b)
        .known(&a1)
        .known(&q1)
        .known(&q2);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    let wires = wires_of(&map, &b);
    assert_eq!(wires.len(), 2);
    assert_eq!(*wires[0].provider(), a1);
    assert_eq!(*wires[1].provider(), q1, "b must follow plib's choice of q");
}

#[test]
fn uses_conflict_backtracks_provider_choice() {
    // b prefers plib v2 (which needs qlib v2), but b itself can only see
    // qlib v1; rotating the p provider resolves the conflict.
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let a1 = Resource::build("plib", v("1.0.0"))
        .export_package("p", v("1.0.0"), &["q"])
        .import_package("q", vr("^1"))
        .finish();
    let a2 = Resource::build("plib", v("2.0.0"))
        .export_package("p", v("2.0.0"), &["q"])
        .import_package("q", vr("^2"))
        .finish();
    let b = Resource::build("b", v("1.0.0"))
        .import_package("p", vr("*"))
        .import_package("q", vr("^1"))
        .finish();
    let ctx = TestContext::new()
        .mandatory(&b)
        .known(&a1)
        .known(&a2)
        .known(&q1)
        .known(&q2);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    let wires = wires_of(&map, &b);
    assert_eq!(wires.len(), 2);
    assert_eq!(*wires[0].provider(), a1);
    assert_eq!(*wires[1].provider(), q1);
}

#[test]
fn unresolvable_uses_conflict_reports_chains() {
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let a1 = Resource::build("plib", v("1.0.0"))
        .export_package("p", v("1.0.0"), &["q"])
        .import_package("q", vr("=1.0.0"))
        .finish();
    let b = Resource::build("b", v("1.0.0"))
        .import_package("p", vr("=1.0.0"))
        .import_package("q", vr("=2.0.0"))
        .finish();
    let ctx = TestContext::new()
        .mandatory(&b)
        .known(&a1)
        .known(&q1)
        .known(&q2);

    let err = resolve(&ctx).unwrap_err();
    assert!(matches!(err, ResolutionError::UsesConflict(_)));
    assert!(!err.unresolved_requirements().is_empty());
    let rendered = err.to_string();
    assert!(rendered.contains("uses constraint violation"), "{}", rendered);
    assert!(rendered.contains("'q'"), "{}", rendered);
}

#[test]
fn multiple_cardinality_drops_incompatible_provider() {
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let widget = |name: &str, range: &str| {
        Resource::build(name, v("1.0.0"))
            .capability(
                "test.widget",
                vec![("test.widget", Value::from(name))],
                vec![(USES_DIRECTIVE, "q")],
            )
            .import_package("q", vr(range))
            .finish()
    };
    let x = widget("x", "^1");
    let y = widget("y", "^2");
    let z = widget("z", "^1");
    let l = Resource::build("l", v("1.0.0"))
        .import_package("q", vr("^1"))
        .requirement(
            "test.widget",
            vec![(CARDINALITY_DIRECTIVE, CARDINALITY_MULTIPLE)],
            Filter::any(),
        )
        .finish();
    let ctx = TestContext::new()
        .mandatory(&l)
        .known(&x)
        .known(&y)
        .known(&z)
        .known(&q1)
        .known(&q2);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    let wires = wires_of(&map, &l);
    // One package wire to qlib v1, then the surviving multi-bind members.
    assert_eq!(wires.len(), 3, "{:?}", wires);
    assert_eq!(*wires[0].provider(), q1);
    let bound: Vec<&Resource> = wires[1..].iter().map(Wire::provider).collect();
    assert_eq!(bound, [&x, &z], "y must be dropped from the multi-bind");
}

#[test]
fn multiple_cardinality_reduced_to_empty_fails() {
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let y = Resource::build("y", v("1.0.0"))
        .capability(
            "test.widget",
            vec![("test.widget", Value::from("y"))],
            vec![(USES_DIRECTIVE, "q")],
        )
        .import_package("q", vr("^2"))
        .finish();
    let l = Resource::build("l", v("1.0.0"))
        .import_package("q", vr("^1"))
        .requirement(
            "test.widget",
            vec![(CARDINALITY_DIRECTIVE, CARDINALITY_MULTIPLE)],
            Filter::any(),
        )
        .finish();
    let ctx = TestContext::new()
        .mandatory(&l)
        .known(&y)
        .known(&q1)
        .known(&q2);

    let err = resolve(&ctx).unwrap_err();
    assert!(matches!(err, ResolutionError::UsesConflict(_)));
}

#[test]
fn reexport_propagates_required_packages_into_uses_check() {
    // c requires bundle blib, which exports p using q; c's own q import
    // must end up on the same q provider blib uses.
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let blib = Resource::build("blib", v("1.0.0"))
        .provide_bundle()
        .export_package("p", v("1.0.0"), &["q"])
        .import_package("q", vr("^1"))
        .finish();
    let c = Resource::build("c", v("1.0.0"))
        .import_package("q", vr("*"))
        .require_bundle("blib", vr("*"), false)
        .finish();
    let ctx = TestContext::new()
        .mandatory(&c)
        .known(&blib)
        .known(&q1)
        .known(&q2);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    let wires = wires_of(&map, &c);
    assert_eq!(wires.len(), 2);
    // Package wires come before bundle wires.
    assert_eq!(*wires[0].provider(), q1);
    assert_eq!(*wires[1].provider(), blib);
}

#[test]
fn substitutable_export_defers_to_other_provider() {
    let s = Resource::build("s", v("1.0.0"))
        .export_package("s", v("1.0.0"), &[])
        .import_package("s", vr("*"))
        .finish();
    let t = Resource::build("t", v("1.0.0"))
        .export_package("s", v("2.0.0"), &[])
        .finish();
    let u = Resource::build("u", v("1.0.0"))
        .import_package("s", vr("*"))
        .finish();
    let ctx = TestContext::new()
        .mandatory(&s)
        .mandatory(&t)
        .mandatory(&u);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    assert_eq!(*only_wire(&map, &u).provider(), t);
    assert_eq!(*only_wire(&map, &s).provider(), t);
    assert!(wires_of(&map, &t).is_empty());
}

#[test]
fn self_satisfied_import_emits_no_wire() {
    let s = Resource::build("s", v("1.0.0"))
        .export_package("s", v("1.0.0"), &[])
        .import_package("s", vr("*"))
        .finish();
    let u = Resource::build("u", v("1.0.0"))
        .import_package("s", vr("*"))
        .finish();
    let ctx = TestContext::new().mandatory(&s).mandatory(&u);

    let map = resolve(&ctx).unwrap();
    assert_wires_satisfy(&map);

    // s's import is satisfied by its own export: no self-wire is emitted.
    assert!(wires_of(&map, &s).is_empty());
    assert_eq!(*only_wire(&map, &u).provider(), s);
}

#[test]
fn dynamic_import_discovers_new_wire() {
    let h = Resource::build("h", v("1.0.0")).dynamic_import_package("d").finish();
    let d1 = Resource::build("dlib", v("1.0.0"))
        .export_package("d", v("1.0.0"), &[])
        .finish();
    let d2 = Resource::build("dlib", v("2.0.0"))
        .export_package("d", v("2.0.0"), &[])
        .finish();
    let ctx = TestContext::new().wired(&h, vec![]).known(&d1).known(&d2);

    let requirement = h.requirements(None).remove(0);
    let matches = [&d1, &d2]
        .iter()
        .flat_map(|r| r.capabilities(Some(PACKAGE_NAMESPACE)))
        .collect();
    let map = resolve_dynamic(&ctx, &h, &requirement, matches).unwrap();
    assert_wires_satisfy(&map);

    assert_eq!(map.len(), 2, "{:?}", map);
    let wire = only_wire(&map, &h);
    assert_eq!(*wire.provider(), d2, "higher version preferred");
    assert!(wires_of(&map, &d2).is_empty());
}

#[test]
fn dynamic_import_of_visible_package_is_rejected() {
    let e = Resource::build("e", v("1.0.0"))
        .export_package("d", v("1.0.0"), &[])
        .finish();
    let h = Resource::build("h", v("1.0.0"))
        .import_package("d", vr("*"))
        .dynamic_import_package("d")
        .finish();
    let import_req = h.requirements(None).remove(0);
    let e_cap = e.capabilities(Some(PACKAGE_NAMESPACE)).remove(0);
    let existing = Wire::new(h.clone(), import_req, e.clone(), e_cap.clone());
    let ctx = TestContext::new()
        .wired(&h, vec![existing])
        .wired(&e, vec![]);

    let dynamic_req = h
        .requirements(None)
        .into_iter()
        .find(|r| r.is_dynamic())
        .unwrap();
    let err = resolve_dynamic(&ctx, &h, &dynamic_req, vec![e_cap]).unwrap_err();
    assert!(matches!(err, ResolutionError::DynamicAlreadyVisible { .. }));
}

#[test]
fn failing_optional_resource_is_removed_on_retry() {
    // o's own imports are satisfiable but inconsistent; since o is
    // optional the resolver drops it and succeeds with nothing to do.
    let q1 = Resource::build("qlib", v("1.0.0"))
        .export_package("q", v("1.0.0"), &[])
        .finish();
    let q2 = Resource::build("qlib", v("2.0.0"))
        .export_package("q", v("2.0.0"), &[])
        .finish();
    let a1 = Resource::build("plib", v("1.0.0"))
        .export_package("p", v("1.0.0"), &["q"])
        .import_package("q", vr("=1.0.0"))
        .finish();
    let o = Resource::build("o", v("1.0.0"))
        .import_package("p", vr("=1.0.0"))
        .import_package("q", vr("=2.0.0"))
        .finish();
    let ctx = TestContext::new()
        .optional(&o)
        .known(&a1)
        .known(&q1)
        .known(&q2);

    let map = resolve(&ctx).unwrap();
    assert!(!map.contains_key(&o));
}

#[test]
fn resolve_is_deterministic() {
    let build = || {
        let q1 = Resource::build("qlib", v("1.0.0"))
            .export_package("q", v("1.0.0"), &[])
            .finish();
        let q2 = Resource::build("qlib", v("2.0.0"))
            .export_package("q", v("2.0.0"), &[])
            .finish();
        let a1 = Resource::build("plib", v("1.0.0"))
            .export_package("p", v("1.0.0"), &["q"])
            .import_package("q", vr("^1"))
            .finish();
        let b = Resource::build("b", v("1.0.0"))
            .import_package("p", vr("=1.0.0"))
            .import_package("q", vr("*"))
            .finish();
        (q1, q2, a1, b)
    };
    let (q1, q2, a1, b) = build();
    let ctx1 = TestContext::new().mandatory(&b).known(&a1).known(&q1).known(&q2);
    let ctx2 = TestContext::new().mandatory(&b).known(&a1).known(&q1).known(&q2);

    let first = resolve(&ctx1).unwrap();
    let second = resolve(&ctx2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn resolving_resolved_state_is_empty() {
    let a = Resource::build("a", v("1.0.0"))
        .export_package("x", v("1.0.0"), &[])
        .finish();
    let b = Resource::build("b", v("1.0.0"))
        .import_package("x", vr("*"))
        .finish();
    let ctx = TestContext::new().mandatory(&b).known(&a);
    let map = resolve(&ctx).unwrap();

    // Feed the result back as existing wirings; nothing is left to do.
    let mut replay = TestContext::new().mandatory(&b).known(&a);
    for (resource, wires) in map {
        replay = replay.wired(&resource, wires);
    }
    let again = resolve(&replay).unwrap();
    assert!(again.is_empty(), "{:?}", again);
}

#[test]
fn cancellation_aborts_between_attempts() {
    let b = Resource::build("b", v("1.0.0")).finish();
    let ctx = TestContext::new().mandatory(&b).cancelled();

    let err = resolve(&ctx).unwrap_err();
    assert!(matches!(err, ResolutionError::Cancelled));
}
