#![cfg(test)]
use super::harness::{fast_feed, frame_id, next_frame, Harness};
use async_trait::async_trait;
use rivulet_core::filter::{parse_filter, FilterExpr};
use rivulet_core::rules::{FnRule, Operation, RuleOutcome, StaticRule};
use rivulet_core::session::{ConnectionGuard, HandshakeRequest, Target};
use serde_json::json;
use shared::error::{ErrorKind, Result, RivuletError};
use shared::event::{DocumentId, Snapshot};
use shared::session::{SessionId, UserContext};
use std::sync::Arc;

fn all_users() -> Target {
  Target::Query(FilterExpr::All)
}

/// Lets through callers carrying the given role.
struct RoleGuard(&'static str);

#[async_trait]
impl ConnectionGuard for RoleGuard {
  async fn can_connect(&self, request: &HandshakeRequest) -> Result<bool> {
    Ok(request.user.get("role") == Some(&json!(self.0)))
  }
}

#[tokio::test]
async fn test_unknown_discriminator_is_rejected() {
  let h = Harness::start().await;
  let request = HandshakeRequest::new("users", UserContext::anonymous()).with_discriminator("Admin");

  let err = h.service.connect(SessionId::from("s1"), &request).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert!(matches!(err, RivuletError::UnknownDiscriminator { .. }));
  assert!(h.service.registry().is_empty());
  assert_eq!(
    h.service
      .metrics()
      .handshakes_rejected
      .with_label_values(&["NotFound"])
      .get(),
    1
  );

  let err = h
    .service
    .connect(
      SessionId::from("s2"),
      &HandshakeRequest::new("widgets", UserContext::anonymous()),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, RivuletError::UnknownCollection(_)));
  assert!(h.service.registry().is_empty());

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_handshake_from_wire_query() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");
  let request = HandshakeRequest::from_json(
    &json!({ "collection": "users", "discriminator": "Mod" }),
    UserContext::anonymous(),
  )
  .unwrap();

  let entity = h.service.connect(SessionId::from("s1"), &request).await.unwrap();
  assert_eq!(entity.name, "Moderator");
  assert!(HandshakeRequest::from_json(&json!({}), UserContext::anonymous()).is_err());

  let target = Target::from_json(&json!({ "filter": {} })).unwrap();
  h.service.set_target(&SessionId::from("s1"), target).await.unwrap();
  next_frame(&mut stream).await;

  // Only documents tagged with the subtype belong to a subtype session.
  h.store.insert("users", json!({ "_id": "plain", "name": "p" })).unwrap();
  h.store.insert("users", json!({ "_id": "m1", "__t": "Mod" })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "add");
  assert_eq!(frame_id(&frame), &json!("m1"));

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_session_is_rejected() {
  let h = Harness::start().await;
  let request = HandshakeRequest::new("users", UserContext::anonymous());
  h.service.connect(SessionId::from("s1"), &request).await.unwrap();

  let err = h.service.connect(SessionId::from("s1"), &request).await.unwrap_err();
  assert!(matches!(err, RivuletError::SessionExists(_)));
  assert_eq!(h.service.registry().len(), 1);

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_base_rule_denial_applies_to_subtypes() {
  let h = Harness::start_with(fast_feed(), |b| {
    b.register_rule("User", Arc::new(StaticRule::new().read(RuleOutcome::Deny)))
      .register_rule("Moderator", Arc::new(StaticRule::new()))
  })
  .await;

  let err = h
    .service
    .subscribe(SessionId::from("s1"), "Moderator", all_users(), &UserContext::anonymous())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::AccessDenied);
  assert_eq!(err.status_code(), 403);
  assert!(h.service.registry().is_empty());

  // Posts have no rule at all.
  h.service
    .subscribe(SessionId::from("s2"), "Post", all_users(), &UserContext::anonymous())
    .await
    .unwrap();

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_read_rule_scopes_live_results() {
  let h = Harness::start_with(fast_feed(), |b| {
    b.register_rule(
      "User",
      Arc::new(FnRule::new(|op, user: &UserContext| match (op, user.get("org")) {
        (Operation::Read, Some(org)) => Ok(FilterExpr::field_eq("org", org.clone()).into()),
        (Operation::Read, None) => Ok(RuleOutcome::Deny),
        _ => Ok(RuleOutcome::Allow),
      })),
    )
  })
  .await;
  h.store.insert("users", json!({ "_id": "a", "org": "acme" })).unwrap();
  h.store.insert("users", json!({ "_id": "b", "org": "globex" })).unwrap();
  let mut stream = h.open("s1");
  let user = UserContext::new(json!({ "id": "u1", "org": "acme" }));

  let snapshot = h
    .service
    .subscribe(SessionId::from("s1"), "User", all_users(), &user)
    .await
    .unwrap();
  assert_eq!(snapshot, Snapshot::Many(vec![json!({ "_id": "a", "org": "acme" })]));
  next_frame(&mut stream).await;

  h.store.insert("users", json!({ "_id": "c", "org": "globex" })).unwrap();
  h.store.insert("users", json!({ "_id": "d", "org": "acme" })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame_id(&frame), &json!("d"));

  let err = h
    .service
    .subscribe(SessionId::from("s2"), "User", all_users(), &UserContext::anonymous())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::AccessDenied);

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_watched_document_leaving_read_scope_is_removed() {
  let h = Harness::start_with(fast_feed(), |b| {
    b.register_rule(
      "User",
      Arc::new(FnRule::new(|op, user: &UserContext| match (op, user.get("org")) {
        (Operation::Read, Some(org)) => Ok(FilterExpr::field_eq("org", org.clone()).into()),
        _ => Ok(RuleOutcome::Allow),
      })),
    )
  })
  .await;
  h.store.insert("users", json!({ "_id": "x", "org": "acme" })).unwrap();
  let mut stream = h.open("s1");
  let user = UserContext::new(json!({ "id": "u1", "org": "acme" }));

  h.service
    .subscribe(
      SessionId::from("s1"),
      "User",
      Target::Document(DocumentId::from("x")),
      &user,
    )
    .await
    .unwrap();
  assert_eq!(next_frame(&mut stream).await.event, "data");

  h.store.update("users", &DocumentId::from("x"), json!({ "org": "globex" })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "remove");
  assert_eq!(frame_id(&frame), &json!("x"));

  // Further writes outside the scope stay silent; coming back is an update.
  h.store.update("users", &DocumentId::from("x"), json!({ "n": 1 })).unwrap();
  h.store.update("users", &DocumentId::from("x"), json!({ "org": "acme" })).unwrap();
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "update");
  assert_eq!(frame.payload["data"]["org"], json!("acme"));
  h.settle().await;
  assert!(stream.try_recv().is_none());

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_conflicting_filters_combine_with_and() {
  let h = Harness::start_with(fast_feed(), |b| {
    b.register_rule(
      "User",
      Arc::new(StaticRule::new().read(FilterExpr::field_eq("org", "acme"))),
    )
  })
  .await;
  h.store.insert("users", json!({ "_id": "a", "org": "acme" })).unwrap();
  let mut stream = h.open("s1");
  let mut posts = h.open("s2");
  h.service
    .subscribe(SessionId::from("s2"), "Post", all_users(), &UserContext::anonymous())
    .await
    .unwrap();
  next_frame(&mut posts).await;

  let target = Target::Query(parse_filter(&json!({ "org": "globex" })).unwrap());
  let snapshot = h
    .service
    .subscribe(SessionId::from("s1"), "User", target, &UserContext::anonymous())
    .await
    .unwrap();
  assert_eq!(snapshot, Snapshot::Many(vec![]));
  next_frame(&mut stream).await;

  // Neither org can ever satisfy both predicates.
  h.store.insert("users", json!({ "_id": "b", "org": "globex" })).unwrap();
  h.store.insert("users", json!({ "_id": "c", "org": "acme" })).unwrap();
  h.store.insert("posts", json!({ "_id": "p" })).unwrap();
  assert_eq!(frame_id(&next_frame(&mut posts).await), &json!("p"));
  assert!(stream.try_recv().is_none());

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_guards_gate_connections() {
  let h = Harness::start_with(fast_feed(), |b| {
    b.register_guard(Arc::new(RoleGuard("admin")))
      .register_guard(Arc::new(RoleGuard("staff")))
  })
  .await;

  let err = h
    .service
    .subscribe(SessionId::from("s1"), "User", all_users(), &UserContext::anonymous())
    .await
    .unwrap_err();
  assert!(matches!(err, RivuletError::GuardRejected));
  assert_eq!(err.status_code(), 403);

  let staff = UserContext::new(json!({ "role": "staff" }));
  h.service
    .subscribe(SessionId::from("s1"), "User", all_users(), &staff)
    .await
    .unwrap();
  assert_eq!(h.service.registry().len(), 1);

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_failed_target_pushes_exception() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");
  let session = SessionId::from("s1");
  h.service
    .subscribe(session.clone(), "User", all_users(), &UserContext::anonymous())
    .await
    .unwrap();
  next_frame(&mut stream).await;
  h.service.unsubscribe(&session);

  let err = h.service.set_target(&session, all_users()).await.unwrap_err();
  assert!(matches!(err, RivuletError::SessionNotFound(_)));
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "exception");
  assert_eq!(frame.payload["error"], json!("NotFound"));
  assert_eq!(frame.payload["statusCode"], json!(404));

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_rolls_back_when_seeding_fails() {
  let h = Harness::start().await;
  let mut stream = h.open("s1");
  let session = SessionId::from("s1");
  h.flaky.set_failing(true);

  let err = h
    .service
    .subscribe(session.clone(), "User", all_users(), &UserContext::anonymous())
    .await
    .unwrap_err();
  assert!(matches!(err, RivuletError::StoreFailed { .. }));
  assert!(h.service.registry().is_empty());
  let frame = next_frame(&mut stream).await;
  assert_eq!(frame.event, "exception");
  assert_eq!(frame.payload["statusCode"], json!(503));

  h.flaky.set_failing(false);
  h.service
    .subscribe(session, "User", all_users(), &UserContext::anonymous())
    .await
    .unwrap();
  assert_eq!(next_frame(&mut stream).await.event, "data");

  h.service.shutdown().await;
}

#[tokio::test]
async fn test_document_rules_for_writes() {
  let h = Harness::start_with(fast_feed(), |b| {
    b.register_rule(
      "Post",
      Arc::new(
        StaticRule::new()
          .create(FilterExpr::field_eq("draft", true))
          .update(RuleOutcome::Deny)
          .delete(FilterExpr::field_eq("owner", "u1")),
      ),
    )
  })
  .await;
  let user = UserContext::new(json!({ "id": "u1" }));

  h.service
    .authorize_document("Post", &user, Operation::Create, &json!({ "draft": true }))
    .await
    .unwrap();
  let err = h
    .service
    .authorize_document("Post", &user, Operation::Create, &json!({ "draft": false }))
    .await
    .unwrap_err();
  assert!(matches!(err, RivuletError::ForbiddenDocument { .. }));
  let err = h
    .service
    .authorize_document("Post", &user, Operation::Update, &json!({}))
    .await
    .unwrap_err();
  assert!(matches!(err, RivuletError::AccessDenied { .. }));

  let scoped = h
    .service
    .scope_filter("Post", &user, Operation::Delete, FilterExpr::field_eq("_id", "p1"))
    .await
    .unwrap();
  assert!(scoped.matches(&json!({ "_id": "p1", "owner": "u1" })));
  assert!(!scoped.matches(&json!({ "_id": "p1", "owner": "u2" })));

  let err = h
    .service
    .scope_filter("Ghost", &user, Operation::Read, FilterExpr::All)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  h.service.shutdown().await;
}
