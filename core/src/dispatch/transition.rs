use shared::event::{ChangeEvent, OpType, PushEvent};

use crate::registry::{Subscription, Watch};

/// Apply one change event to one subscription.
///
/// Updates the matched set in place and returns the push to send, if any.
/// Only the changed document is inspected; the query is never re-run.
/// Events arriving while a seed read is in flight are held on the
/// subscription and replayed once the seed lands.
pub fn transition(sub: &mut Subscription, event: &ChangeEvent) -> Option<PushEvent> {
  if sub.hold(event) || !sub.is_active() || sub.is_stale(event) {
    return None;
  }
  let scope_ok = event
    .full_document
    .as_ref()
    .map_or(false, |doc| sub.scope().matches(doc));

  match sub.watch_mut()? {
    Watch::Document { id, visible } => {
      if *id != event.document_id {
        return None;
      }
      let id = id.clone();
      if event.op == OpType::Delete {
        *visible = false;
        return Some(PushEvent::Remove { id });
      }
      // A write that takes the document out of scope retracts it once.
      if !scope_ok {
        return std::mem::replace(visible, false).then_some(PushEvent::Remove { id });
      }
      *visible = true;
      match event.op {
        OpType::Insert => Some(PushEvent::Add {
          id,
          data: event.full_document.clone()?,
        }),
        _ => Some(PushEvent::Update {
          id,
          data: event.full_document.clone()?,
        }),
      }
    }

    Watch::Query { filter, matched } => {
      let id = event.document_id.clone();
      let was_matched = matched.contains(&id);

      if event.op == OpType::Delete {
        return if matched.remove(&id) {
          Some(PushEvent::Remove { id })
        } else {
          None
        };
      }

      let doc = event.full_document.as_ref();
      let passes = doc.map_or(false, |d| filter.matches(d));

      match (was_matched, passes) {
        (true, true) if event.op != OpType::Insert => Some(PushEvent::Update {
          id,
          data: doc?.clone(),
        }),
        (_, true) => {
          matched.insert(id.clone());
          Some(PushEvent::Add {
            id,
            data: doc?.clone(),
          })
        }
        (true, false) => {
          matched.remove(&id);
          Some(PushEvent::Remove { id })
        }
        (false, false) => None,
      }
    }
  }
}
