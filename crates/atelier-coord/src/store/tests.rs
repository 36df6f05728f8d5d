use super::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn map(pairs: &[(&str, Value)]) -> StateMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[test]
fn test_get_and_snapshot_are_independent_copies() {
    let store = SharedStateStore::new(map(&[("theme", json!("light"))]));

    let mut snapshot = store.snapshot();
    snapshot.insert("theme".to_string(), json!("mangled"));

    assert_eq!(store.get("theme"), Some(json!("light")));
    assert_eq!(store.get("missing"), None);
}

#[test]
fn test_idempotent_set_notifies_nobody() {
    let store = SharedStateStore::new(map(&[("a", json!(1))]));
    let count = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&count);
    let _sub = store.subscribe(None, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    store.set(map(&[("a", json!(1))]));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    store.set(map(&[("a", json!(2))]));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_selective_notification() {
    let store = SharedStateStore::new(map(&[("a", json!(1)), ("b", json!(1))]));
    let hits = Arc::new(AtomicUsize::new(0));

    let h = Arc::clone(&hits);
    let _sub = store.subscribe(Some(&["a"]), move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    store.set(map(&[("b", json!(2))]));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    store.set(map(&[("a", json!(2))]));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_change_record_contents() {
    let store = SharedStateStore::new(map(&[("theme", json!("light")), ("zoom", json!(1))]));
    let seen: Arc<Mutex<Vec<StateChange>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let _sub = store.subscribe(Some(&["theme"]), move |change| {
        sink.lock().unwrap().push(change.clone());
    });

    // Mixed call: only the actually-changed key enters the change set.
    store.set(map(&[("theme", json!("dark")), ("zoom", json!(1))]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let change = &seen[0];
    assert_eq!(change.changed, vec!["theme".to_string()]);
    assert!(change.touches("theme"));
    assert!(!change.touches("zoom"));
    assert_eq!(change.previous.get("theme"), Some(&json!("light")));
    assert_eq!(change.snapshot.get("theme"), Some(&json!("dark")));
    assert_eq!(change.snapshot.get("zoom"), Some(&json!(1)));
}

#[test]
fn test_all_listeners_observe_identical_snapshot() {
    let store = SharedStateStore::new(map(&[("n", json!(0))]));
    let snapshots: Arc<Mutex<Vec<StateMap>>> = Arc::new(Mutex::new(Vec::new()));

    let store_inner = store.clone();
    let sink = Arc::clone(&snapshots);
    let _first = store.subscribe(None, move |change| {
        sink.lock().unwrap().push(change.snapshot.clone());
        // A listener mutating the store mid-notification must not make a
        // later listener of the same call observe a different snapshot.
        store_inner.set(map(&[("extra", json!(true))]));
    });
    let sink = Arc::clone(&snapshots);
    let _second = store.subscribe(None, move |change| {
        sink.lock().unwrap().push(change.snapshot.clone());
    });

    store.set(map(&[("n", json!(1))]));

    let snapshots = snapshots.lock().unwrap();
    // first listener (outer call), both listeners of the nested call, then
    // the second listener of the outer call with the outer snapshot
    let outer: Vec<&StateMap> = snapshots
        .iter()
        .filter(|s| s.get("n") == Some(&json!(1)) && !s.contains_key("extra"))
        .collect();
    assert_eq!(outer.len(), 2);
    assert_eq!(outer[0], outer[1]);
}

#[test]
fn test_notification_in_subscription_order() {
    let store = SharedStateStore::new(StateMap::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        store.subscribe(None, move |_| order.lock().unwrap().push(tag));
    }

    store.set(map(&[("k", json!(1))]));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let store = SharedStateStore::new(StateMap::new());
    let count = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&count);
    let sub = store.subscribe(None, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    store.set(map(&[("k", json!(1))]));
    sub.unsubscribe();
    store.set(map(&[("k", json!(2))]));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_reset_changed_set_is_union_of_both_states() {
    let store = SharedStateStore::new(map(&[("kept", json!(1)), ("dropped", json!(2))]));
    let seen: Arc<Mutex<Vec<StateChange>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let _sub = store.subscribe(None, move |change| {
        sink.lock().unwrap().push(change.clone());
    });

    store.reset(map(&[("kept", json!(1)), ("added", json!(3))]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let mut changed = seen[0].changed.clone();
    changed.sort();
    // Wholesale replacement: every key present in either state counts as
    // changed, even where the value is identical.
    assert_eq!(changed, vec!["added", "dropped", "kept"]);
    assert_eq!(store.get("dropped"), None);
    assert_eq!(store.get("added"), Some(json!(3)));
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let store = SharedStateStore::new(StateMap::new());
    let count = Arc::new(AtomicUsize::new(0));

    let _bad = store.subscribe(None, |_| panic!("bad listener"));
    let c = Arc::clone(&count);
    let _good = store.subscribe(None, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    store.set(map(&[("k", json!(1))]));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_theme_scenario() {
    let store = SharedStateStore::new(map(&[("theme", json!("light"))]));
    let themed: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let other_hits = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&themed);
    let _theme_sub = store.subscribe(Some(&["theme"]), move |change| {
        sink.lock()
            .unwrap()
            .push(change.snapshot.get("theme").cloned().unwrap_or(Value::Null));
    });
    let hits = Arc::clone(&other_hits);
    let _other_sub = store.subscribe(Some(&["other"]), move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    store.set(map(&[("theme", json!("dark"))]));

    assert_eq!(*themed.lock().unwrap(), vec![json!("dark")]);
    assert_eq!(other_hits.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

#[test]
fn test_derive_computes_initial_value() {
    let store = SharedStateStore::new(map(&[("count", json!(2))]));
    let doubled = store.derive(
        |state| json!(state.get("count").and_then(Value::as_i64).unwrap_or(0) * 2),
        &["count"],
    );
    assert_eq!(doubled.get(), json!(4));
}

#[test]
fn test_derive_recomputes_only_on_dependency_change() {
    let store = SharedStateStore::new(map(&[("a", json!(1)), ("b", json!(1))]));
    let computes = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&computes);
    let view = store.derive(
        move |state| {
            c.fetch_add(1, Ordering::SeqCst);
            state.get("a").cloned().unwrap_or(Value::Null)
        },
        &["a"],
    );
    let after_construction = computes.load(Ordering::SeqCst);
    assert_eq!(after_construction, 1);

    store.set(map(&[("b", json!(99))]));
    assert_eq!(computes.load(Ordering::SeqCst), after_construction);

    store.set(map(&[("a", json!(2))]));
    assert_eq!(computes.load(Ordering::SeqCst), after_construction + 1);
    assert_eq!(view.get(), json!(2));
}

#[test]
fn test_derive_notifies_only_on_structural_difference() {
    let store = SharedStateStore::new(map(&[("n", json!(1))]));
    let notifications = Arc::new(AtomicUsize::new(0));

    // Projection collapses 1 and 2 to the same parity value.
    let view = store.derive(
        |state| json!(state.get("n").and_then(Value::as_i64).unwrap_or(0) % 2),
        &["n"],
    );
    let n = Arc::clone(&notifications);
    let _sub = view.subscribe(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });

    store.set(map(&[("n", json!(3))])); // parity unchanged
    assert_eq!(notifications.load(Ordering::SeqCst), 0);

    store.set(map(&[("n", json!(4))])); // parity flips
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(view.get(), json!(0));
}

#[test]
fn test_derive_releases_upstream_at_zero_listeners() {
    let store = SharedStateStore::new(map(&[("n", json!(1))]));
    let view = store.derive(|state| state.get("n").cloned().unwrap_or(Value::Null), &["n"]);
    assert_eq!(store.listener_count(), 1);
    assert!(view.is_attached());

    let sub_a = view.subscribe(|_| {});
    let sub_b = view.subscribe(|_| {});
    assert_eq!(view.listener_count(), 2);

    sub_a.unsubscribe();
    assert!(view.is_attached());
    sub_b.unsubscribe();
    assert!(!view.is_attached());
    assert_eq!(store.listener_count(), 0);

    // Detached views still answer, fresh from the store.
    store.set(map(&[("n", json!(7))]));
    assert_eq!(view.get(), json!(7));

    // Re-attaching refreshes the cache and re-subscribes.
    let _sub = view.subscribe(|_| {});
    assert!(view.is_attached());
    assert_eq!(store.listener_count(), 1);
    assert_eq!(view.get(), json!(7));
}

#[test]
fn test_dropped_view_releases_upstream() {
    let store = SharedStateStore::new(map(&[("n", json!(1))]));
    let view = store.derive(|state| state.get("n").cloned().unwrap_or(Value::Null), &["n"]);
    assert_eq!(store.listener_count(), 1);

    drop(view);
    assert_eq!(store.listener_count(), 0);
}
