//! End-to-end tagging behavior over the SQLite store

mod common;

use common::{admin, agent, count, ticket, TempDb};
use tagging::{RecordQuery, RecordRef, TagNames, TaggingError};

#[test]
fn tags_and_counts_survive_reopen() {
    let db = TempDb::new();
    {
        let engine = db.engine();
        engine.tag(&ticket("1"), "Billing, Urgent", None, &admin()).unwrap();
        engine.tag(&ticket("2"), "billing", None, &admin()).unwrap();
        engine
            .registry()
            .set_suggested("Urgent", None, true)
            .unwrap();
    }

    let engine = db.engine();
    assert_eq!(engine.tag_names(&ticket("1")).unwrap(), vec!["Billing", "Urgent"]);
    assert_eq!(count(&engine, "Billing", None), 2);
    assert_eq!(count(&engine, "Urgent", None), 1);

    let suggested = engine.registry().suggested().unwrap();
    assert_eq!(suggested.len(), 1);
    assert_eq!(suggested[0].slug, "urgent");
}

#[test]
fn attach_and_detach_are_idempotent() {
    let db = TempDb::new();
    let engine = db.engine();
    let r = ticket("1");

    assert!(engine.add_tag(&r, "Foo", None, &admin()).unwrap());
    assert!(!engine.add_tag(&r, "FOO ", None, &admin()).unwrap());
    assert_eq!(count(&engine, "foo", None), 1);

    assert_eq!(engine.remove_tag(&r, "foo", None).unwrap(), 1);
    assert_eq!(engine.remove_tag(&r, "foo", None).unwrap(), 0);
    assert_eq!(count(&engine, "foo", None), 0);
    assert!(engine.registry().exists("foo", None).unwrap());
}

#[test]
fn retag_replaces_the_set() {
    let db = TempDb::new();
    let engine = db.engine();
    let r = ticket("1");
    engine.tag(&r, "A, B", None, &admin()).unwrap();

    engine.retag(&r, "B, C", None, &admin()).unwrap();

    assert_eq!(engine.tag_slugs(&r).unwrap(), vec!["b", "c"]);
    assert_eq!(count(&engine, "A", None), 0);
    assert_eq!(count(&engine, "B", None), 1);
    assert_eq!(count(&engine, "C", None), 1);
}

#[test]
fn creation_rights_apply_to_default_department_only() {
    let db = TempDb::new();
    let engine = db.engine();

    let err = engine
        .add_tag(&ticket("1"), "Escalated", None, &agent())
        .unwrap_err();
    assert!(matches!(err, TaggingError::ForbiddenTagCreation { .. }));

    assert!(engine
        .add_tag(&ticket("1"), "Escalated", Some("Sales"), &agent())
        .unwrap());

    engine.add_tag(&ticket("2"), "Escalated", None, &admin()).unwrap();
    assert!(engine
        .add_tag(&ticket("3"), "escalated", None, &agent())
        .unwrap());
    assert_eq!(count(&engine, "Escalated", None), 2);
    assert_eq!(count(&engine, "Escalated", Some("sales")), 1);
}

#[test]
fn scopes_select_records_by_tag_membership() {
    let db = TempDb::new();
    let engine = db.engine();
    engine.tag(&ticket("r1"), "x, y", None, &admin()).unwrap();
    engine.tag(&ticket("r2"), "x", None, &admin()).unwrap();
    engine.tag(&ticket("r3"), "y", None, &admin()).unwrap();
    engine
        .tag(&RecordRef::new("article", "r1"), "x", None, &admin())
        .unwrap();

    let all = engine
        .find(&RecordQuery::new("ticket").with_all_tags("X, Y"))
        .unwrap();
    assert_eq!(all, vec![ticket("r1")]);

    let any = engine
        .find(&RecordQuery::new("ticket").with_any_tag("x, y"))
        .unwrap();
    assert_eq!(any, vec![ticket("r1"), ticket("r2"), ticket("r3")]);

    let combined = engine
        .find(&RecordQuery::new("ticket").with_all_tags("x").with_any_tag("y, z"))
        .unwrap();
    assert_eq!(combined, vec![ticket("r1")]);

    let none = engine
        .find(&RecordQuery::new("ticket").with_any_tag(Vec::<String>::new()))
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn existing_tags_report_live_counts() {
    let db = TempDb::new();
    let engine = db.engine();
    engine.tag(&ticket("1"), "beta, alpha", None, &admin()).unwrap();
    engine.tag(&ticket("2"), "alpha", None, &admin()).unwrap();
    engine.untag(&ticket("2"), Some(TagNames::from("alpha")), None).unwrap();

    let existing = engine.existing_tags("ticket").unwrap();
    let slugs: Vec<_> = existing.iter().map(|t| (t.slug.as_str(), t.count)).collect();
    assert_eq!(slugs, vec![("alpha", 1), ("beta", 1)]);
    assert!(engine.existing_tags("article").unwrap().is_empty());
}

#[test]
fn delete_cascade_detaches_everything() {
    let db = TempDb::new();
    let engine = db.engine();
    engine.tag(&ticket("1"), "a, b", None, &admin()).unwrap();
    engine.tag(&ticket("1"), "c", Some("sales"), &admin()).unwrap();

    assert!(engine.before_delete(&ticket("1")).unwrap());
    assert!(engine.associations(&ticket("1")).unwrap().is_empty());
    for (name, department) in [("a", None), ("b", None), ("c", Some("sales"))] {
        assert_eq!(count(&engine, name, department), 0);
    }
}

#[test]
fn reconcile_repairs_counters_after_direct_store_writes() {
    let db = TempDb::new();
    let engine = db.engine();
    engine.tag(&ticket("1"), "a, b", None, &admin()).unwrap();
    assert!(engine.registry().reconcile().unwrap().is_empty());

    // Deleting the registry row loses the counter; reconcile rebuilds it
    assert!(engine.registry().delete("a", None).unwrap());
    let corrections = engine.registry().reconcile().unwrap();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].slug, "a");
    assert_eq!(corrections[0].actual, 1);
    assert_eq!(count(&engine, "a", None), 1);
}
