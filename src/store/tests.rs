//! Behavior shared by both backends, plus SQLite-specific persistence checks.

use super::{MemoryStore, SqliteStore};
use crate::clock::{Clock, ManualClock};
use crate::media::{MediaLibrary, MissingAltQuery, NewImage};
use crate::state::StateStore;
use crate::suggestion::{NewSuggestion, SuggestionStatus, SuggestionStore};
use chrono::TimeDelta;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

trait Backend: StateStore + MediaLibrary + SuggestionStore {
    fn add(&self, image: &NewImage) -> i64;
}

impl Backend for MemoryStore {
    fn add(&self, image: &NewImage) -> i64 {
        self.add_image(image)
    }
}

impl Backend for SqliteStore {
    fn add(&self, image: &NewImage) -> i64 {
        self.add_image(image).unwrap()
    }
}

fn backends() -> Vec<(Box<dyn Backend>, Arc<ManualClock>)> {
    let memory_clock = Arc::new(ManualClock::starting_now());
    let sqlite_clock = Arc::new(ManualClock::starting_now());
    vec![
        (
            Box::new(MemoryStore::new(memory_clock.clone())) as Box<dyn Backend>,
            memory_clock,
        ),
        (
            Box::new(SqliteStore::open_in_memory(sqlite_clock.clone()).unwrap()) as Box<dyn Backend>,
            sqlite_clock,
        ),
    ]
}

fn image(url: &str, alt: &str) -> NewImage {
    NewImage {
        url: url.to_string(),
        mime_type: "image/jpeg".into(),
        title: format!("Title for {url}"),
        alt_text: alt.to_string(),
        ..Default::default()
    }
}

fn suggestion(image_id: i64, clock: &ManualClock, alt: &str) -> NewSuggestion {
    NewSuggestion {
        image_id,
        alt_text: alt.to_string(),
        model: "a/vision:free".into(),
        request_payload: "{}".into(),
        response_body: r#"{"model":"a/vision:free"}"#.into(),
        duration_secs: 1.5,
        created_at: clock.now(),
    }
}

#[test]
fn test_state_ttl_and_delete() {
    for (store, clock) in backends() {
        store.set("k", json!({"n": 1}), Some(TimeDelta::minutes(5))).unwrap();
        store.set("forever", json!(true), None).unwrap();
        assert_eq!(StateStore::get(store.as_ref(), "k").unwrap(), Some(json!({"n": 1})));

        clock.advance(TimeDelta::minutes(5));
        assert_eq!(StateStore::get(store.as_ref(), "k").unwrap(), None);
        assert_eq!(StateStore::get(store.as_ref(), "forever").unwrap(), Some(json!(true)));

        store.delete("forever").unwrap();
        assert_eq!(StateStore::get(store.as_ref(), "forever").unwrap(), None);
    }
}

#[test]
fn test_set_if_absent() {
    for (store, clock) in backends() {
        let ttl = Some(TimeDelta::minutes(30));
        assert!(store.set_if_absent("lock", json!(1), ttl).unwrap());
        assert!(!store.set_if_absent("lock", json!(2), ttl).unwrap());
        assert_eq!(StateStore::get(store.as_ref(), "lock").unwrap(), Some(json!(1)));

        // An expired entry no longer blocks the write.
        clock.advance(TimeDelta::minutes(31));
        assert!(store.set_if_absent("lock", json!(3), ttl).unwrap());
        assert_eq!(StateStore::get(store.as_ref(), "lock").unwrap(), Some(json!(3)));
    }
}

#[test]
fn test_missing_alt_filters() {
    for (store, _) in backends() {
        let missing = store.add(&image("a.jpg", ""));
        store.add(&image("b.jpg", "Existing alt"));
        let blank = store.add(&image("c.jpg", "  \n"));
        store.add(&NewImage {
            mime_type: "application/pdf".into(),
            ..image("doc.pdf", "")
        });

        let page = store
            .missing_alt_page(MissingAltQuery {
                seed: 48_271,
                after: None,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page.total, 2);
        let ids: HashSet<i64> = page.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, HashSet::from([missing, blank]));
        assert_eq!(page.next, None);
    }
}

#[test]
fn test_pagination_survives_images_being_fixed() {
    for (store, _) in backends() {
        let ids: Vec<i64> = (0..25)
            .map(|n| store.add(&image(&format!("{n}.jpg"), "")))
            .collect();
        let seed = 987_654_321;

        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = store
                .missing_alt_page(MissingAltQuery {
                    seed,
                    after,
                    limit: 10,
                })
                .unwrap();
            // Fill in alt text as we go, like a scan in auto mode.
            for item in &page.items {
                store.set_alt_text(item.id, "Described").unwrap();
                seen.push(item.id);
            }
            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        assert_eq!(seen.len(), ids.len());
        assert_eq!(seen.iter().copied().collect::<HashSet<_>>().len(), ids.len());
    }
}

#[test]
fn test_order_depends_on_seed() {
    for (store, _) in backends() {
        for n in 0..20 {
            store.add(&image(&format!("{n}.jpg"), ""));
        }
        let order = |seed| -> Vec<i64> {
            store
                .missing_alt_page(MissingAltQuery {
                    seed,
                    after: None,
                    limit: 20,
                })
                .unwrap()
                .items
                .iter()
                .map(|i| i.id)
                .collect()
        };
        assert_eq!(order(7), order(7));
        assert_ne!(order(7), order(1_234_567_891));
    }
}

#[test]
fn test_memory_and_sqlite_agree_on_order() {
    let clock = Arc::new(ManualClock::starting_now());
    let memory = MemoryStore::new(clock.clone());
    let sqlite = SqliteStore::open_in_memory(clock).unwrap();
    for n in 0..30 {
        memory.add_image(&image(&format!("{n}.jpg"), ""));
        sqlite.add_image(&image(&format!("{n}.jpg"), "")).unwrap();
    }
    let query = MissingAltQuery {
        seed: 1_134_903_170,
        after: None,
        limit: 30,
    };
    let a: Vec<i64> = memory.missing_alt_page(query).unwrap().items.iter().map(|i| i.id).collect();
    let b: Vec<i64> = sqlite.missing_alt_page(query).unwrap().items.iter().map(|i| i.id).collect();
    assert_eq!(a, b);
}

#[test]
fn test_example_alt_texts() {
    for (store, _) in backends() {
        assert!(store.example_alt_texts(5).unwrap().is_empty());
        for n in 0..7 {
            store.add(&image(&format!("{n}.jpg"), &format!("Alt {n}")));
        }
        store.add(&image("none.jpg", ""));
        let examples = store.example_alt_texts(5).unwrap();
        assert_eq!(examples.len(), 5);
        assert!(examples.iter().all(|(_, alt)| alt.starts_with("Alt ")));
    }
}

#[test]
fn test_unicode_whitespace_alt_is_missing() {
    for (store, _) in backends() {
        let nbsp = store.add(&image("nbsp.jpg", "\u{a0}"));
        let mixed = store.add(&image("mixed.jpg", "\u{2003} \u{3000}\t"));
        store.add(&image("ok.jpg", "\u{a0}Harbor at dusk\u{a0}"));

        let page = store
            .missing_alt_page(MissingAltQuery {
                seed: 48_271,
                after: None,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page.total, 2);
        let ids: HashSet<i64> = page.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, HashSet::from([nbsp, mixed]));
        assert!(page.items.iter().all(|i| !i.has_alt_text()));

        let examples = store.example_alt_texts(5).unwrap();
        assert_eq!(examples.len(), 1);
        assert!(examples[0].1.contains("Harbor at dusk"));
    }
}

#[test]
fn test_sqlite_whitespace_set_matches_char_is_whitespace() {
    let expected: Vec<u32> = (0..=u32::from(char::MAX))
        .filter_map(char::from_u32)
        .filter(|c| c.is_whitespace())
        .map(u32::from)
        .collect();
    assert_eq!(super::sqlite::WHITESPACE_CODE_POINTS, expected.as_slice());
}

#[test]
fn test_set_alt_text_missing_image() {
    for (store, _) in backends() {
        assert!(!store.set_alt_text(999, "x").unwrap());
        let id = store.add(&image("a.jpg", ""));
        assert!(store.set_alt_text(id, "A harbor").unwrap());
        assert_eq!(store.get_image(id).unwrap().unwrap().alt_text, "A harbor");
        assert!(store.get_image(999).unwrap().is_none());
    }
}

#[test]
fn test_suggestion_lifecycle() {
    for (store, clock) in backends() {
        let record = store.insert(&suggestion(1, &clock, "A harbor")).unwrap();
        assert_eq!(record.status, SuggestionStatus::Pending);
        assert_eq!(record.applied_at, None);

        let latest = store
            .latest_for_image(1, SuggestionStatus::Pending)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, record.id);

        clock.advance(TimeDelta::seconds(10));
        assert!(store.resolve(record.id, SuggestionStatus::Applied, clock.now()).unwrap());
        // Terminal records never change again.
        assert!(!store.resolve(record.id, SuggestionStatus::Rejected, clock.now()).unwrap());
        assert!(!store.resolve(999, SuggestionStatus::Applied, clock.now()).unwrap());

        let stored = SuggestionStore::get(store.as_ref(), record.id).unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Applied);
        assert_eq!(
            stored.applied_at.map(|t| t.timestamp_millis()),
            Some(clock.now().timestamp_millis())
        );
        assert!(store.latest_for_image(1, SuggestionStatus::Pending).unwrap().is_none());
    }
}

#[test]
fn test_list_and_counts() {
    for (store, clock) in backends() {
        let mut ids = Vec::new();
        for n in 0..5 {
            ids.push(store.insert(&suggestion(n, &clock, &format!("Alt {n}"))).unwrap().id);
            clock.advance(TimeDelta::seconds(1));
        }
        store.resolve(ids[0], SuggestionStatus::Applied, clock.now()).unwrap();
        store.resolve(ids[1], SuggestionStatus::Rejected, clock.now()).unwrap();

        let all = store.list(None, 10, 0).unwrap();
        let listed: Vec<i64> = all.iter().map(|s| s.id).collect();
        let mut newest_first = ids.clone();
        newest_first.reverse();
        assert_eq!(listed, newest_first);

        let page = store.list(None, 2, 1).unwrap();
        assert_eq!(page.iter().map(|s| s.id).collect::<Vec<_>>(), newest_first[1..3]);

        let pending = store.list(Some(SuggestionStatus::Pending), 10, 0).unwrap();
        assert_eq!(pending.len(), 3);

        let counts = store.counts().unwrap();
        assert_eq!(
            (counts.pending, counts.applied, counts.rejected, counts.total),
            (3, 1, 1, 5)
        );
    }
}

#[test]
fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("altgen.db");
    let clock = Arc::new(ManualClock::starting_now());

    let (image_id, suggestion_id) = {
        let store = SqliteStore::open(&path, clock.clone()).unwrap();
        let image_id = store.add_image(&image("a.jpg", "")).unwrap();
        let record = store.insert(&suggestion(image_id, &clock, "A harbor")).unwrap();
        store.set("run_status", json!({"state": "completed"}), None).unwrap();
        (image_id, record.id)
    };

    let store = SqliteStore::open(&path, clock).unwrap();
    assert!(store.get_image(image_id).unwrap().is_some());
    assert_eq!(
        SuggestionStore::get(&store, suggestion_id).unwrap().unwrap().alt_text,
        "A harbor"
    );
    assert_eq!(
        StateStore::get(&store, "run_status").unwrap(),
        Some(json!({"state": "completed"}))
    );
    assert_eq!(store.list_images(10, 0).unwrap().len(), 1);
}
