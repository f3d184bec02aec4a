use tokio::sync::broadcast;

/// Shutdown fan-out owned by one SDK instance.
#[derive(Clone)]
pub struct SignalManager {
    sender: broadcast::Sender<()>,
}

impl SignalManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        SignalManager { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(());
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}
