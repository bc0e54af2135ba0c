//! Cooperative shutdown signaling.

use tokio::sync::watch;

/// A cancel token shared by every actor.
///
/// Actors poll [`cancelled`](Self::cancelled) in their select loops; the
/// system triggers it once and then drains actors in a fixed order.
#[derive(Clone)]
pub struct ShutdownToken {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    /// Signals every holder to stop.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when shutdown is requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let token = ShutdownToken::new();
        assert!(!token.is_triggered());
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.trigger();
        waiter.await.unwrap();
        assert!(token.is_triggered());
    }
}
