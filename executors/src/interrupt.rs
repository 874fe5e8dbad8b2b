use tokio::sync::watch;

/// Create a linked interrupt handle and signal.
///
/// The handle side belongs to the UI flow that can abandon a submission;
/// the signal side is checked by the orchestrator between its async steps.
pub fn interrupt_pair() -> (InterruptHandle, InterruptSignal) {
    let (tx, rx) = watch::channel(false);
    (InterruptHandle { tx }, InterruptSignal { rx })
}

pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl InterruptHandle {
    pub fn raise(&self) {
        // receivers may already be gone if the flow finished first
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

impl InterruptSignal {
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_observes_raise() {
        let (handle, signal) = interrupt_pair();
        assert!(!signal.is_raised());
        handle.raise();
        assert!(signal.is_raised());
    }

    #[test]
    fn clones_share_state() {
        let (handle, signal) = interrupt_pair();
        let cloned = signal.clone();
        handle.raise();
        assert!(cloned.is_raised());
    }
}
