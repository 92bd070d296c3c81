//! Bounded single-producer streams handed to streaming handlers.
//!
//! A handler producing ListResource results or InvokeAction events pushes
//! items through a [`StreamSender`]. `send` resolves to `false` once the
//! consumer has gone away or the server was stopped; the handler should
//! return at that point without producing more items.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sending half of a handler stream.
#[derive(Debug)]
pub struct StreamSender<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T> StreamSender<T> {
    /// Create a bounded channel whose sender observes `cancel`.
    pub fn channel(buffer: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx, cancel }, rx)
    }

    /// Push an item, waiting for room in the buffer.
    ///
    /// Returns `false` when the stream was closed or the request cancelled;
    /// the item is dropped in that case.
    pub async fn send(&self, item: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            result = self.tx.send(item) => result.is_ok(),
        }
    }

    /// Whether further sends are guaranteed to fail.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// The token cancelled when the server stops.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_in_order() {
        let (sender, mut rx) = StreamSender::channel(4, CancellationToken::new());
        assert!(sender.send(1).await);
        assert!(sender.send(2).await);
        drop(sender);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_after_receiver_closed() {
        let (sender, rx) = StreamSender::channel(1, CancellationToken::new());
        drop(rx);
        assert!(sender.is_closed());
        assert!(!sender.send("late").await);
    }

    #[tokio::test]
    async fn test_send_after_cancel() {
        let token = CancellationToken::new();
        let (sender, _rx) = StreamSender::channel(1, token.clone());
        token.cancel();
        assert!(sender.is_closed());
        assert!(!sender.send(()).await);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_full_buffer() {
        let token = CancellationToken::new();
        let (sender, _rx) = StreamSender::channel(1, token.clone());
        assert!(sender.send(1).await);

        let pending = tokio::spawn(async move { sender.send(2).await });
        tokio::task::yield_now().await;
        token.cancel();
        assert!(!pending.await.unwrap());
    }

    #[test]
    fn test_zero_buffer_is_clamped() {
        let (sender, _rx) = StreamSender::<u8>::channel(0, CancellationToken::new());
        assert!(!sender.is_closed());
    }
}
