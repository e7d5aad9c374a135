//! Bounded per-connection outbound queue.
//!
//! Producers never wait: a full mailbox drops the frame. Closing is
//! idempotent and wakes the owning outbound loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    Full,
    Closed,
}

/// Producer side, held by the hub.
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
}

/// Consumer side, owned by the outbound loop.
#[derive(Debug)]
pub struct MailboxReceiver {
    rx: mpsc::Receiver<Arc<str>>,
    closed: CancellationToken,
}

impl Mailbox {
    pub fn new(capacity: usize) -> (Mailbox, MailboxReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        (
            Mailbox {
                tx,
                closed: closed.clone(),
            },
            MailboxReceiver { rx, closed },
        )
    }

    /// Queue an encoded frame without waiting.
    pub fn try_deliver(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Stop accepting frames. Frames already queued are still drained.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

impl MailboxReceiver {
    /// Next queued frame; `None` once the mailbox is closed and empty.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        tokio::select! {
            biased;
            frame = self.rx.recv() => frame,
            _ = self.closed.cancelled() => {
                self.rx.close();
                self.rx.recv().await
            }
        }
    }

    /// Frames that are already queued, at most `max`, without waiting.
    pub fn drain_ready(&mut self, max: usize) -> Vec<Arc<str>> {
        let mut frames = Vec::new();
        while frames.len() < max {
            match self.rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(_) => break,
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (mailbox, mut rx) = Mailbox::new(4);
        mailbox.try_deliver(frame("a")).unwrap();
        mailbox.try_deliver(frame("b")).unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn full_mailbox_drops_without_blocking() {
        let (mailbox, mut rx) = Mailbox::new(2);
        mailbox.try_deliver(frame("1")).unwrap();
        mailbox.try_deliver(frame("2")).unwrap();
        assert_eq!(mailbox.try_deliver(frame("3")), Err(DeliveryError::Full));

        let frames = rx.drain_ready(10);
        assert_eq!(frames.len(), 2);
        mailbox.try_deliver(frame("4")).unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drains_queued_frames() {
        let (mailbox, mut rx) = Mailbox::new(4);
        mailbox.try_deliver(frame("queued")).unwrap();
        mailbox.close();
        mailbox.close();

        assert!(mailbox.is_closed());
        assert_eq!(mailbox.try_deliver(frame("late")), Err(DeliveryError::Closed));
        assert_eq!(rx.recv().await.as_deref(), Some("queued"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_waiting_receiver() {
        let (mailbox, mut rx) = Mailbox::new(4);
        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        mailbox.close();

        assert_eq!(waiter.await.unwrap(), None);
    }

    #[test]
    fn drain_ready_respects_max() {
        let (mailbox, mut rx) = Mailbox::new(8);
        for i in 0..5 {
            mailbox.try_deliver(frame(&i.to_string())).unwrap();
        }
        assert_eq!(rx.drain_ready(3).len(), 3);
        assert_eq!(rx.drain_ready(3).len(), 2);
    }
}
