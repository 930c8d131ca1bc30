//! Fire-and-forget event delivery to an optional observer.

use relay_types::ExecutionEvent;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Optional observer channel. Sending never blocks and a dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<ExecutionEvent>>,
}

impl EventSink {
    pub fn new(sender: Option<UnboundedSender<ExecutionEvent>>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        let kind = event.kind();
        if sender.send(event).is_err() {
            trace!(kind, "event observer is gone");
        }
    }
}
