use shared::event::{AdminKind, ChangeEvent, OpType, RawChange};

/// What the connector does with one raw change-stream item.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
  /// A data event for the dispatcher.
  Forward(ChangeEvent),
  /// The stream was invalidated and must be reopened.
  Reconnect,
  /// Administrative event, dropped.
  SkipAdmin(AdminKind),
  /// Data event of an operation type we did not subscribe to.
  SkipOp(OpType),
}

pub fn classify(raw: RawChange, ops: &[OpType]) -> Classified {
  match raw {
    RawChange::Data(event) if ops.contains(&event.op) => Classified::Forward(event),
    RawChange::Data(event) => Classified::SkipOp(event.op),
    RawChange::Invalidate => Classified::Reconnect,
    RawChange::Admin { kind, .. } => Classified::SkipAdmin(kind),
  }
}
