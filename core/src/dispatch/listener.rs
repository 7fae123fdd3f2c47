use shared::event::ChangeEvent;

/// Server-side observer of every forwarded change event.
///
/// Called synchronously on the dispatch path before fan-out; keep it cheap.
pub trait ChangeListener: Send + Sync {
  fn on_change(&self, event: &ChangeEvent);
}

/// Adapts a closure into a listener.
pub struct FnListener<F>(pub F);

impl<F> ChangeListener for FnListener<F>
where
  F: Fn(&ChangeEvent) + Send + Sync,
{
  fn on_change(&self, event: &ChangeEvent) {
    (self.0)(event)
  }
}
