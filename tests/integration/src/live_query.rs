#![cfg(test)]
use super::harness::{frame_id, next_frame, wait_until, Harness};
use rivulet_core::dispatch::FnListener;
use rivulet_core::filter::parse_filter;
use rivulet_core::session::Target;
use rivulet_http::egress::Frame;
use serde_json::{json, Value};
use shared::event::{ChangeEvent, DocumentId, Snapshot};
use shared::session::{SessionId, UserContext};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn age_query(max: i64) -> Target {
  Target::Query(parse_filter(&json!({ "age": { "$lte": max } })).unwrap())
}

/// What a client holds after applying `frames` in order. Panics on a push
/// that contradicts the view: an add for a shown id, or an update or remove
/// for one that is not shown.
fn client_view(frames: &[Frame]) -> BTreeMap<String, Value> {
  let mut view = BTreeMap::new();
  for frame in frames {
    let id = frame_id(frame).to_string();
    match frame.event {
      "data" => {
        view.clear();
        for doc in frame.payload.as_array().unwrap() {
          view.insert(doc["_id"].to_string(), doc.clone());
        }
      }
      "add" => assert!(
        view.insert(id.clone(), frame.payload["data"].clone()).is_none(),
        "add for {id} which is already shown"
      ),
      "update" => assert!(
        view.insert(id.clone(), frame.payload["data"].clone()).is_some(),
        "update for {id} which is not shown"
      ),
      "remove" => assert!(view.remove(&id).is_some(), "remove for {id} which is not shown"),
      other => panic!("unexpected {other} frame"),
    }
  }
  view
}

#[tokio::test]
async fn test_query_membership_follows_updates() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");

  let snapshot = h
    .service
    .subscribe(SessionId::from("s1"), "User", age_query(5), &UserContext::anonymous())
    .await
    .unwrap();
  assert_eq!(snapshot, Snapshot::Many(vec![]));
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "data");
  assert_eq!(frame.payload, json!([]));

  let id = h.store.insert("users", json!({ "_id": "u1", "age": 3 })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "add");
  assert_eq!(frame_id(&frame), &json!("u1"));
  assert_eq!(frame.payload["data"]["age"], json!(3));

  h.store.update("users", &id, json!({ "age": 10 })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "remove");
  assert_eq!(frame.payload, json!({ "_id": "u1" }));

  h.store.update("users", &id, json!({ "age": 2 })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "add");
  assert_eq!(frame_id(&frame), &json!("u1"));

  h.store.update("users", &id, json!({ "age": 1 })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "update");
  assert_eq!(frame.payload["data"]["age"], json!(1));

  assert!(h.store.delete("users", &id));
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "remove");
  assert_eq!(frame_id(&frame), &json!("u1"));

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_initial_snapshot_seeds_matched_set() {
  let h = Harness::start().await;
  h.store.insert("users", json!({ "_id": "a", "age": 4 })).unwrap();
  h.store.insert("users", json!({ "_id": "b", "age": 40 })).unwrap();
  let mut stream = h.open("s1");

  let snapshot = h
    .service
    .subscribe(SessionId::from("s1"), "User", age_query(5), &UserContext::anonymous())
    .await
    .unwrap();
  assert_eq!(snapshot, Snapshot::Many(vec![json!({ "_id": "a", "age": 4 })]));
  assert_eq!(next_frame(&mut stream).await.payload, json!([{ "_id": "a", "age": 4 }]));

  // The inserts above are already in the snapshot and must not be re-added.
  h.settle().await;
  assert!(stream.try_recv().is_none());

  let sub = h.service.registry().get(&SessionId::from("s1")).unwrap();
  let matched = rivulet_core::registry::lock(&sub).matched().cloned().unwrap();
  assert_eq!(matched.len(), 1);
  assert!(matched.contains(&DocumentId::from("a")));

  // Leaving a doc that was never matched is silent; the next event proves it.
  h.store.update("users", &DocumentId::from("b"), json!({ "age": 50 })).unwrap();
  h.store.delete("users", &DocumentId::from("a"));
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "remove");
  assert_eq!(frame_id(&frame), &json!("a"));

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_events_on_other_collections_are_ignored() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");
  h.service
    .subscribe(SessionId::from("s1"), "User", age_query(5), &UserContext::anonymous())
    .await
    .unwrap();
  next_frame(&mut stream).await;

  h.store.insert("posts", json!({ "_id": "p1", "age": 1 })).unwrap();
  h.store.insert("users", json!({ "_id": "u9", "age": 99 })).unwrap();
  h.store.insert("users", json!({ "_id": "u1", "age": 1 })).unwrap();

  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "add");
  assert_eq!(frame_id(&frame), &json!("u1"));
  assert!(stream.try_recv().is_none());

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_document_mode_tracks_one_id() {
  let h = Harness::start().await;
  h.store.insert("users", json!({ "_id": "x", "name": "ada" })).unwrap();
  let mut stream = h.open("s1");

  let snapshot = h
    .service
    .subscribe(
      SessionId::from("s1"),
      "User",
      Target::Document(DocumentId::from("x")),
      &UserContext::anonymous(),
    )
    .await
    .unwrap();
  assert_eq!(snapshot, Snapshot::One(Some(json!({ "_id": "x", "name": "ada" }))));
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "data");
  assert_eq!(frame.payload["name"], json!("ada"));
  h.settle().await;
  assert!(stream.try_recv().is_none());

  h.store.insert("users", json!({ "_id": "y", "name": "bob" })).unwrap();
  h.store.update("users", &DocumentId::from("y"), json!({ "name": "bo" })).unwrap();
  h.store.update("users", &DocumentId::from("x"), json!({ "name": "lovelace" })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "update");
  assert_eq!(frame_id(&frame), &json!("x"));
  assert_eq!(frame.payload["data"]["name"], json!("lovelace"));

  h.store.delete("users", &DocumentId::from("y"));
  h.store.delete("users", &DocumentId::from("x"));
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "remove");
  assert_eq!(frame.payload, json!({ "_id": "x" }));
  assert!(stream.try_recv().is_none());

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_document_mode_for_missing_document() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");

  let snapshot = h
    .service
    .subscribe(
      SessionId::from("s1"),
      "User",
      Target::Document(DocumentId::from("later")),
      &UserContext::anonymous(),
    )
    .await
    .unwrap();
  assert_eq!(snapshot, Snapshot::One(None));
  assert_eq!(next_frame(&mut stream).await.payload, json!(null));

  h.store.insert("users", json!({ "_id": "later", "n": 1 })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "add");
  assert_eq!(frame_id(&frame), &json!("later"));

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_retarget_replaces_matched_set() {
  let h = Harness::start().await;
  h.store.insert("users", json!({ "_id": "a", "age": 3 })).unwrap();
  h.store.insert("users", json!({ "_id": "b", "age": 30 })).unwrap();
  let mut stream = h.open("s1");
  let session = SessionId::from("s1");

  h.service
    .subscribe(session.clone(), "User", age_query(5), &UserContext::anonymous())
    .await
    .unwrap();
  next_frame(&mut stream).await;

  let target = Target::from_json(&json!({ "filter": { "age": { "$gte": 18 } } })).unwrap();
  let snapshot = h.service.set_target(&session, target).await.unwrap();
  assert_eq!(snapshot, Snapshot::Many(vec![json!({ "_id": "b", "age": 30 })]));
  assert_eq!(next_frame(&mut stream).await.event, "data");
  h.settle().await;
  assert!(stream.try_recv().is_none());

  // `a` belongs to the old query only.
  h.store.update("users", &DocumentId::from("a"), json!({ "age": 4 })).unwrap();
  h.store.update("users", &DocumentId::from("b"), json!({ "age": 31 })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "update");
  assert_eq!(frame_id(&frame), &json!("b"));

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribed_session_receives_nothing() {
  let h = Harness::start().await;
  let mut first = h.open("s1");
  let mut second = h.open("s2");
  let user = UserContext::anonymous();

  h.service.subscribe(SessionId::from("s1"), "User", age_query(5), &user).await.unwrap();
  h.service.subscribe(SessionId::from("s2"), "User", age_query(5), &user).await.unwrap();
  next_frame(&mut first).await;
  next_frame(&mut second).await;

  assert!(h.service.unsubscribe(&SessionId::from("s1")));
  assert!(!h.service.unsubscribe(&SessionId::from("s1")));

  h.store.insert("users", json!({ "_id": "u1", "age": 1 })).unwrap();
  assert_eq!(next_frame(&mut second).await.event, "add");
  assert!(first.try_recv().is_none());
  assert_eq!(h.service.registry().len(), 1);

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_change_listeners_see_every_forwarded_event() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&seen);
  let h = Harness::start_with(super::harness::fast_feed(), move |b| {
    b.register_change_listener(Arc::new(FnListener(move |event: &ChangeEvent| {
      sink.lock().unwrap().push(event.app_event_name());
    })))
  })
  .await;

  let id = h.store.insert("users", json!({ "age": 1 })).unwrap();
  h.store.update("users", &id, json!({ "age": 2 })).unwrap();
  h.store.delete("users", &id);
  h.store.insert("posts", json!({ "title": "hi" })).unwrap();

  let so_far = Arc::clone(&seen);
  wait_until(move || so_far.lock().unwrap().len() == 4).await;
  assert_eq!(
    *seen.lock().unwrap(),
    vec![
      "database.users.created",
      "database.users.updated",
      "database.users.deleted",
      "database.posts.created",
    ]
  );

  h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_racing_the_seed_keep_the_client_view_exact() {
  let h = Harness::start().await;
  for i in 0..20 {
    h.store
      .insert("users", json!({ "_id": format!("u{i}"), "age": i % 10 }))
      .unwrap();
  }

  let store = Arc::clone(&h.store);
  let writer = tokio::spawn(async move {
    for round in 0..300u64 {
      let id = DocumentId::from(format!("u{}", round % 20).as_str());
      store.update("users", &id, json!({ "age": (round * 7) % 10 })).unwrap();
      if round % 3 == 0 {
        store
          .insert("users", json!({ "_id": format!("n{round}"), "age": round % 10 }))
          .unwrap();
      }
      if round % 3 == 0 && round >= 30 {
        store.delete("users", &DocumentId::from(format!("n{}", round - 30).as_str()));
      }
      if round % 10 == 0 {
        tokio::task::yield_now().await;
      }
    }
  });

  let user = UserContext::anonymous();
  let mut streams = Vec::new();
  for n in 0..8 {
    let session = format!("s{n}");
    streams.push(h.open(&session));
    h.service
      .subscribe(SessionId::from(session.as_str()), "User", age_query(5), &user)
      .await
      .unwrap();
    tokio::task::yield_now().await;
  }
  writer.await.unwrap();
  h.settle().await;

  let filter = parse_filter(&json!({ "age": { "$lte": 5 } })).unwrap();
  let expected: BTreeMap<String, Value> = h
    .store
    .find(&"users".into(), &filter)
    .into_iter()
    .map(|doc| (doc["_id"].to_string(), doc))
    .collect();
  for stream in &mut streams {
    let frames = stream.drain();
    assert_eq!(frames.first().map(|f| f.event), Some("data"));
    assert_eq!(client_view(&frames), expected, "view of {}", stream.session());
  }

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_while_writes_are_queued() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");
  // Commit without waiting for the feed, so the events are still in flight
  // while the seed is read.
  h.store.insert("users", json!({ "_id": "a", "age": 4 })).unwrap();
  h.store.update("users", &DocumentId::from("a"), json!({ "age": 3 })).unwrap();
  h.store.insert("users", json!({ "_id": "b", "age": 2 })).unwrap();

  h.service
    .subscribe(SessionId::from("s1"), "User", age_query(5), &UserContext::anonymous())
    .await
    .unwrap();
  h.store.update("users", &DocumentId::from("b"), json!({ "age": 9 })).unwrap();
  h.settle().await;

  let frames = stream.drain();
  assert_eq!(frames[0].event, "data");
  let view = client_view(&frames);
  assert_eq!(view.keys().collect::<Vec<_>>(), vec!["\"a\""]);
  assert_eq!(view["\"a\""]["age"], json!(3));

  h.service.shutdown().await;
}
