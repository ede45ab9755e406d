// Integration tests for the sync layer
// These run whole investigations through the public store API, often with
// two peers exchanging updates.

use chrono::{TimeZone, Utc};
use sleuth_model::{
    CanvasTab, Element, Link, LinkDirection, Position, Property, PropertyValue,
};
use sleuth_sync::codec::{encode_element, encode_link, encode_tab, insert_node};
use sleuth_sync::{
    EditHost, EditOutcome, EditTarget, ElementPatch, Field, FieldValue, InvestigationStore, LinkPatch,
    LinkVisualPatch, RecordingNotifier, RemoteOutcome, Repositories, SyncConfig, SyncContext,
};
use std::time::Instant;

fn config() -> SyncConfig {
    SyncConfig {
        mirror_throttle_ms: 0,
        ..Default::default()
    }
}

fn open() -> InvestigationStore {
    InvestigationStore::open(
        "inv",
        Repositories::in_memory(),
        Box::new(RecordingNotifier::new()),
        config(),
    )
    .unwrap()
}

/// A store seeded with one tab called "Main"
fn open_with_tab() -> InvestigationStore {
    let mut repos = Repositories::in_memory();
    repos
        .tabs
        .create(CanvasTab::new("main", "inv", "Main", 0, Utc::now()))
        .unwrap();
    InvestigationStore::open("inv", repos, Box::new(RecordingNotifier::new()), config()).unwrap()
}

/// Deliver everything `from` produced since the last call to `to`
fn deliver(from: &InvestigationStore, to: &mut InvestigationStore) {
    for update in from.take_outbox() {
        to.apply_remote_update(&update).unwrap();
    }
}

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_records_round_trip_through_document() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut element = Element::new("e1", "inv", "Alice", at);
    element.tags = ids(&["person", "suspect"]);
    element.properties = vec![
        Property::new("born", PropertyValue::Date(Utc.with_ymd_and_hms(1990, 5, 17, 0, 0, 0).unwrap())),
        Property::new("nickname", PropertyValue::Text("1990-05-17".into())),
        Property::new("country", PropertyValue::Country("FR".into())),
    ];
    element.confidence = Some(70);
    let link = Link::new("l1", "inv", "e1", "e2", at).with_direction(LinkDirection::Backward);
    let mut tab = CanvasTab::new("t1", "inv", "Main", 3, at);
    tab.member_element_ids = ids(&["e1"]);

    let ctx = SyncContext::open("inv", Some(1));
    ctx.transact(|txn, cols| {
        insert_node(txn, &cols.elements, "e1", encode_element(&element));
        insert_node(txn, &cols.links, "l1", encode_link(&link));
        insert_node(txn, &cols.tabs, "t1", encode_tab(&tab));
    });

    // decode on a peer, from update bytes only
    let peer = SyncContext::from_state("inv", Some(2), &ctx.encode_state()).unwrap();
    assert_eq!(peer.read_element("e1").unwrap(), element);
    assert_eq!(peer.read_link("l1").unwrap(), link);
    assert_eq!(peer.read_tab("t1").unwrap(), tab);
}

#[test]
fn test_two_clients_converge() {
    let mut a = open_with_tab();
    let mut b = open();
    // b starts from a's full state
    b.apply_remote_update(&a.context().encode_state()).unwrap();
    a.take_outbox();

    let alice = a.create_element("Alice", Position::default());
    deliver(&a, &mut b);
    assert_eq!(b.context().read_element(&alice).unwrap().label, "Alice");

    // concurrent edits to different fields of the same element
    a.update_element(
        &alice,
        ElementPatch {
            label: Some("Alice Smith".into()),
            ..Default::default()
        },
    )
    .unwrap();
    b.update_element(
        &alice,
        ElementPatch {
            notes: Some("Seen twice".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let b_bob = b.create_element("Bob", Position::default());
    deliver(&a, &mut b);
    deliver(&b, &mut a);

    let merged = a.context().read_element(&alice).unwrap();
    assert_eq!(merged.label, "Alice Smith");
    assert_eq!(merged.notes, "Seen twice");
    assert!(a.context().read_element(&b_bob).is_some());
    assert_ne!(alice, b_bob);

    let sa = a.context().snapshot();
    let sb = b.context().snapshot();
    assert_eq!(sa.elements, sb.elements);
    assert_eq!(sa.tabs, sb.tabs);
}

#[test]
fn test_echo_is_suppressed_and_remote_edit_accepted() {
    let mut a = open_with_tab();
    let mut b = open();
    let alice = a.create_element("Alice", Position::default());
    deliver(&a, &mut b);

    let target = EditTarget::Element(alice.clone());
    let mut session = a.open_session(target.clone()).unwrap();

    session.edit(&mut a, Field::Label, FieldValue::text("Alice S"), Instant::now());
    assert_eq!(session.blur(&mut a, Field::Label), EditOutcome::Committed);

    // the change notification for our own write
    let echoed = a.load(&target).unwrap();
    let outcomes = session.receive_remote(&echoed);
    assert!(outcomes.iter().all(|(_, outcome)| *outcome == RemoteOutcome::Echo));
    assert_eq!(session.local(Field::Label), Some(&FieldValue::text("Alice S")));

    // a peer renames concurrently
    deliver(&a, &mut b);
    b.update_element(
        &alice,
        ElementPatch {
            label: Some("Alicia".into()),
            ..Default::default()
        },
    )
    .unwrap();
    deliver(&b, &mut a);

    let remote = a.load(&target).unwrap();
    let outcome = session.receive_remote_field(Field::Label, remote[&Field::Label].clone());
    assert_eq!(outcome, RemoteOutcome::Applied);
    assert_eq!(session.local(Field::Label), Some(&FieldValue::text("Alicia")));
}

#[test]
fn test_unrelated_remote_change_keeps_pending_typing() {
    let mut a = open_with_tab();
    let mut b = open();
    let alice = a.create_element("Alice", Position::default());
    deliver(&a, &mut b);

    let target = EditTarget::Element(alice.clone());
    let mut session = a.open_session(target.clone()).unwrap();
    session.edit(&mut a, Field::Label, FieldValue::text("Alice Sm"), Instant::now());

    b.add_tag(&alice, "person").unwrap();
    deliver(&b, &mut a);
    session.receive_remote(&a.load(&target).unwrap());

    assert!(session.is_pending(Field::Label));
    assert_eq!(session.local(Field::Label), Some(&FieldValue::text("Alice Sm")));
    assert_eq!(session.local(Field::Tags), Some(&FieldValue::Tags(ids(&["person"]))));
}

#[test]
fn test_flush_before_switching_target() {
    let mut store = open_with_tab();
    let x = store.create_element("X", Position::default());
    let y = store.create_element("Y", Position::default());

    let mut session = store.open_session(EditTarget::Element(x.clone())).unwrap();
    session.edit(&mut store, Field::Label, FieldValue::text("X renamed"), Instant::now());
    assert!(session.is_pending(Field::Label));

    assert!(session.switch_target(&mut store, EditTarget::Element(y.clone())));
    assert_eq!(store.context().read_element(&x).unwrap().label, "X renamed");
    assert!(!session.has_pending());
    assert_eq!(session.local(Field::Label), Some(&FieldValue::text("Y")));
}

#[test]
fn test_visual_patch_preserves_siblings_across_peers() {
    let mut a = open_with_tab();
    let mut b = open();
    let from = a.create_element("A", Position::default());
    let to = a.create_element("B", Position::default());
    let link = a.create_link(&from, &to, LinkDirection::Forward);
    a.update_link(
        &link,
        LinkPatch {
            visual: Some(LinkVisualPatch {
                thickness: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .unwrap();
    deliver(&a, &mut b);

    b.update_link(
        &link,
        LinkPatch {
            visual: Some(LinkVisualPatch {
                color: Some("#ff0000".into()),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .unwrap();
    deliver(&b, &mut a);

    let merged = a.context().read_link(&link).unwrap();
    assert_eq!(merged.visual.color, "#ff0000");
    assert_eq!(merged.visual.thickness, 4);
    assert_eq!(merged.direction, LinkDirection::Forward);
}

#[test]
fn test_ghosts_exclusion_and_admission() {
    let mut store = open_with_tab();
    let a = store.create_element("A", Position::default());
    let other = store.create_tab("Other");
    store.set_active_tab(&other);
    let b = store.create_element("B", Position::default());
    let c = store.create_element("C", Position::default());
    store.create_link(&a, &b, LinkDirection::None);
    store.create_link(&b, &c, LinkDirection::None);
    store.set_active_tab("main");

    assert_eq!(store.ghosts().into_iter().collect::<Vec<_>>(), vec![b.clone()]);
    let derived = store.ghost_recomputations();
    store.ghosts();
    assert_eq!(store.ghost_recomputations(), derived);

    assert!(store.exclude_ghost("main", &b));
    assert!(store.ghosts().is_empty());

    store.add_members("main", &[b.clone()]);
    assert!(store.is_member(&b));
    assert!(!store.context().read_tab("main").unwrap().is_excluded(&b));
    assert_eq!(store.ghosts().into_iter().collect::<Vec<_>>(), vec![c]);
}

#[test]
fn test_remote_link_produces_ghost() {
    let mut a = open_with_tab();
    let mut b = open();
    let alice = a.create_element("Alice", Position::default());
    let side = a.create_tab("Side");
    a.set_active_tab(&side);
    let bob = a.create_element("Bob", Position::default());
    a.set_active_tab("main");
    deliver(&a, &mut b);
    assert!(a.ghosts().is_empty());

    b.create_link(&alice, &bob, LinkDirection::Forward);
    deliver(&b, &mut a);
    assert!(a.is_ghost(&bob));
}

#[test]
fn test_delete_element_cascades_and_leaves_links_dangling() {
    let mut store = open_with_tab();
    let second = store.create_tab("Second");
    let a = store.create_element("A", Position::default());
    let e = store.create_element("E", Position::default());
    store.add_members(&second, &[a.clone()]);
    store.create_link(&a, &e, LinkDirection::None);
    store.exclude_ghost(&second, &e);

    store.delete_element(&e);
    for tab in store.context().tabs() {
        assert!(!tab.is_member(&e));
        assert!(!tab.is_excluded(&e));
    }
    let snapshot = store.context().snapshot();
    assert_eq!(snapshot.dangling_links().len(), 1);
    assert!(store.tabs_for_element(&e).is_empty());
}

#[test]
fn test_orphan_protection_on_remove() {
    let mut store = open_with_tab();
    let side = store.create_tab("Side");
    let shared = store.create_element("Shared", Position::default());
    let only = store.create_element("Only", Position::default());
    store.add_members(&side, &[shared.clone()]);

    let removed = store.remove_members("main", &[shared.clone(), only.clone()]);
    assert_eq!(removed, vec![shared.clone()]);
    assert!(store.is_member(&only));
    assert_eq!(store.tabs_for_element(&shared), vec![side]);
}

#[test]
fn test_extract_property_undo_and_redo() {
    let mut store = open_with_tab();
    let source = store.create_element("Alice", Position::new(10.0, 10.0));
    for (key, value) in [("phone", "555-0100"), ("email", "alice@example.com"), ("city", "Lyon")] {
        store
            .set_property(&source, Property::new(key, PropertyValue::Text(value.into())))
            .unwrap();
    }
    let original = store.context().read_element(&source).unwrap().properties;

    let created = store.extract_property_to_element(&source, "email").unwrap();
    let new_element = store.context().read_element(&created).unwrap();
    assert_eq!(new_element.label, "alice@example.com");
    assert!(store.is_member(&created));
    let keys: Vec<String> = store
        .context()
        .read_element(&source)
        .unwrap()
        .properties
        .into_iter()
        .map(|p| p.key)
        .collect();
    assert_eq!(keys, vec!["phone", "city"]);
    let link = store
        .context()
        .links()
        .into_iter()
        .find(|l| l.to_id == created)
        .unwrap();
    assert_eq!(link.from_id, source);
    assert_eq!(link.label, "email");

    assert!(store.undo());
    assert_eq!(store.context().read_element(&source).unwrap().properties, original);
    assert!(store.context().read_element(&created).is_none());
    assert!(store.context().read_link(&link.id).is_none());
    assert!(!store.context().read_tab("main").unwrap().is_member(&created));

    assert!(store.redo());
    assert!(store.context().read_element(&created).is_some());
    assert!(store.context().read_link(&link.id).is_some());
    assert_eq!(store.context().read_element(&source).unwrap().properties.len(), 2);
    assert_eq!(store.context().elements().len(), 2);
}

#[test]
fn test_redo_after_peer_edits_source() {
    let mut a = open_with_tab();
    let mut b = open();
    let source = a.create_element("Alice", Position::default());
    a.set_property(&source, Property::new("alias", PropertyValue::Text("Al".into())))
        .unwrap();
    let created = a.extract_property_to_element(&source, "alias").unwrap();
    a.undo();
    deliver(&a, &mut b);

    // peer edits the source while the extraction is undone
    b.update_element(
        &source,
        ElementPatch {
            label: Some("Alice B.".into()),
            ..Default::default()
        },
    )
    .unwrap();
    deliver(&b, &mut a);

    a.redo();
    deliver(&a, &mut b);
    for store in [&a, &b] {
        let src = store.context().read_element(&source).unwrap();
        assert_eq!(src.label, "Alice B.");
        assert!(src.properties.is_empty());
        assert_eq!(store.context().elements().len(), 2);
        assert_eq!(store.context().links().len(), 1);
        assert!(store.context().read_element(&created).is_some());
    }
}

#[test]
fn test_tab_delete_and_undo_on_peer() {
    let mut a = open_with_tab();
    let mut b = open();
    let side = a.create_tab("Side");
    a.set_active_tab(&side);
    let orphan = a.create_element("Orphan", Position::default());
    deliver(&a, &mut b);

    let deletion = a.delete_tab(&side).unwrap();
    assert_eq!(deletion.reassigned_to.as_deref(), Some("main"));
    deliver(&a, &mut b);
    assert!(b.context().read_tab(&side).is_none());
    assert!(b.context().read_tab("main").unwrap().is_member(&orphan));

    a.undo();
    deliver(&a, &mut b);
    let restored = b.context().read_tab(&side).unwrap();
    assert_eq!(restored.name, "Side");
    assert!(restored.is_member(&orphan));
    assert!(!b.context().read_tab("main").unwrap().is_member(&orphan));
}

#[test]
fn test_persist_snapshot_writes_repositories() {
    let mut store = open_with_tab();
    let alice = store.create_element("Alice", Position::new(1.0, 2.0));
    store.persist_snapshot().unwrap();

    let stored = store.repositories().elements.get_by_investigation("inv").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, alice);
    assert_eq!(stored[0].position, Position::new(1.0, 2.0));
}

#[test]
fn test_redo_of_removal_keeps_last_membership() {
    let mut a = open_with_tab();
    let mut b = open();
    let side = a.create_tab("Side");
    let shared = a.create_element("Shared", Position::default());
    a.add_members(&side, &[shared.clone()]);
    deliver(&a, &mut b);

    assert_eq!(a.remove_members("main", &[shared.clone()]), vec![shared.clone()]);
    a.undo();
    deliver(&a, &mut b);

    // meanwhile the peer takes it out of the other tab
    assert_eq!(b.remove_members(&side, &[shared.clone()]), vec![shared.clone()]);
    deliver(&b, &mut a);

    a.redo();
    deliver(&a, &mut b);
    for store in [&a, &b] {
        assert_eq!(store.tabs_for_element(&shared), vec!["main".to_string()]);
    }
}

#[test]
fn test_concurrent_notes_resolve_to_one_writer() {
    let mut a = open_with_tab();
    let mut b = open();
    let alice = a.create_element("Alice", Position::default());
    a.update_element(
        &alice,
        ElementPatch {
            notes: Some("base".into()),
            ..Default::default()
        },
    )
    .unwrap();
    deliver(&a, &mut b);

    a.update_element(
        &alice,
        ElementPatch {
            notes: Some("alpha".into()),
            ..Default::default()
        },
    )
    .unwrap();
    b.update_element(
        &alice,
        ElementPatch {
            notes: Some("beta".into()),
            ..Default::default()
        },
    )
    .unwrap();
    deliver(&a, &mut b);
    deliver(&b, &mut a);

    let on_a = a.context().read_element(&alice).unwrap().notes;
    let on_b = b.context().read_element(&alice).unwrap().notes;
    assert_eq!(on_a, on_b);
    assert!(on_a == "alpha" || on_a == "beta", "unexpected notes {:?}", on_a);
}

#[test]
fn test_reopened_session_reaches_peers() {
    let mut a = open_with_tab();
    let mut b = open();
    let first = a.create_element("First", Position::default());
    deliver(&a, &mut b);
    a.persist_snapshot().unwrap();

    let mut repos = Repositories::in_memory();
    let persisted = a.repositories();
    repos.elements.bulk_upsert(persisted.elements.get_by_investigation("inv").unwrap()).unwrap();
    repos.links.bulk_upsert(persisted.links.get_by_investigation("inv").unwrap()).unwrap();
    repos.tabs.bulk_upsert(persisted.tabs.get_by_investigation("inv").unwrap()).unwrap();
    let previous_client = a.context().client_id();
    a.close();

    let mut reopened = InvestigationStore::open("inv", repos, Box::new(RecordingNotifier::new()), config()).unwrap();
    assert_ne!(reopened.context().client_id(), previous_client);
    let second = reopened.create_element("Second", Position::default());
    deliver(&reopened, &mut b);

    assert!(b.context().read_element(&first).is_some());
    assert_eq!(b.context().read_element(&second).unwrap().label, "Second");
}
