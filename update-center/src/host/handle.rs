//! Handle for sending messages to the host actor.
//!
//! User commands wait a bounded time for a mailbox slot. Engine and
//! installer callbacks wait until the host makes room.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::HostMessage;

/// Default timeout for send operations when the mailbox is full.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The actor has stopped and is no longer accepting messages.
    ActorStopped,
    /// The send operation timed out.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ActorStopped => write!(f, "Actor has stopped"),
            SendError::Timeout => write!(f, "Send operation timed out"),
        }
    }
}

impl std::error::Error for SendError {}

/// A handle to an actor for sending messages.
pub struct ActorHandle<M> {
    sender: mpsc::Sender<M>,
    cancellation_token: CancellationToken,
    max_capacity: usize,
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancellation_token: self.cancellation_token.clone(),
            max_capacity: self.max_capacity,
        }
    }
}

impl<M> fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("max_capacity", &self.max_capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle of the control-plane host actor.
pub type HostHandle = ActorHandle<HostMessage>;

impl<M> ActorHandle<M> {
    pub fn new(sender: mpsc::Sender<M>, cancellation_token: CancellationToken) -> Self {
        let max_capacity = sender.max_capacity();
        Self {
            sender,
            cancellation_token,
            max_capacity,
        }
    }

    /// Send a message with backpressure awareness.
    ///
    /// # Errors
    ///
    /// Returns `SendError::ActorStopped` if the actor has stopped.
    /// Returns `SendError::Timeout` if the send times out.
    pub async fn send(&self, msg: M) -> Result<(), SendError> {
        self.send_with_timeout(msg, DEFAULT_SEND_TIMEOUT).await
    }

    /// Send a message with a custom timeout.
    pub async fn send_with_timeout(&self, msg: M, timeout: Duration) -> Result<(), SendError> {
        // Fast path: try non-blocking send first
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                // Slow path: wait for permit with timeout
                match tokio::time::timeout(timeout, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::ActorStopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    /// Send a message, waiting for mailbox capacity without a timeout.
    ///
    /// Used for callbacks that must not be lost while the host is busy.
    pub async fn send_wait(&self, msg: M) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ActorStopped)
    }

    /// The actor dropped its mailbox.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_times_out_on_full_mailbox() {
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new());

        handle.send(1).await.unwrap();
        assert_eq!(
            handle.send_with_timeout(2, Duration::from_millis(10)).await,
            Err(SendError::Timeout)
        );

        assert_eq!(rx.recv().await, Some(1));
        handle.send(3).await.unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_send_wait_outlasts_a_full_mailbox() {
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new());
        handle.send(1).await.unwrap();

        let consumer = tokio::spawn(async move {
            tokio::time::sleep(DEFAULT_SEND_TIMEOUT * 3).await;
            let mut received = Vec::new();
            while let Some(value) = rx.recv().await {
                received.push(value);
            }
            received
        });

        handle.send_wait(2).await.unwrap();
        drop(handle);
        assert_eq!(consumer.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_closed_mailbox() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new());
        drop(rx);

        assert!(handle.is_closed());
        assert_eq!(handle.send(1).await, Err(SendError::ActorStopped));
        assert_eq!(handle.send_wait(1).await, Err(SendError::ActorStopped));
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new());
        let clone = handle.clone();

        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
