//! Broadcast hooks fired around every send.
//!
//! A [`Signal`] holds an ordered list of receivers. Sending runs every
//! receiver synchronously, in the order they were connected; none of them can
//! stop the others from running. The receiver list is copied before the
//! receivers run, so a receiver may connect or disconnect receivers (its own
//! signal included) without deadlocking. Those changes apply from the next
//! send.
//!
//! ```rust
//! use std::sync::Arc;
//! use integrations_ses_mailer::message::EmailMessage;
//! use integrations_ses_mailer::signals::MailSignals;
//!
//! let signals = Arc::new(MailSignals::<EmailMessage>::new());
//! let subscription = signals.pre_send.connect(|message: &mut EmailMessage| {
//!     message.bcc.push("archive@example.com".to_string());
//! });
//!
//! let mut message = EmailMessage::new("Hi", "Body", "a@example.com", ["b@example.com"]);
//! signals.pre_send.send(&mut message);
//! assert_eq!(message.bcc, vec!["archive@example.com"]);
//!
//! assert!(signals.pre_send.disconnect(subscription));
//! ```

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver of `pre_send`; may rewrite the message.
pub type PreSendReceiver<M> = dyn Fn(&mut M) + Send + Sync;

/// Receiver of `post_send`; gets the message and the service's message id.
pub type PostSendReceiver<M> = dyn Fn(&M, &str) + Send + Sync;

/// Handle returned by `connect`, used to disconnect the receiver again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// An ordered set of receivers of type `H`.
pub struct Signal<H: ?Sized> {
    receivers: RwLock<Vec<(Subscription, Arc<H>)>>,
    next_id: AtomicU64,
}

impl<H: ?Sized> Signal<H> {
    pub fn new() -> Self {
        Self {
            receivers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append an already boxed receiver.
    pub fn connect_arc(&self, receiver: Arc<H>) -> Subscription {
        let subscription = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.receivers.write().push((subscription, receiver));
        subscription
    }

    /// Remove a receiver. Returns `false` if it was not connected.
    pub fn disconnect(&self, subscription: Subscription) -> bool {
        let mut receivers = self.receivers.write();
        let before = receivers.len();
        receivers.retain(|(id, _)| *id != subscription);
        receivers.len() != before
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.read().len()
    }

    pub fn disconnect_all(&self) {
        self.receivers.write().clear();
    }

    fn snapshot(&self) -> Vec<Arc<H>> {
        self.receivers
            .read()
            .iter()
            .map(|(_, receiver)| Arc::clone(receiver))
            .collect()
    }
}

impl<H: ?Sized> Default for Signal<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for Signal<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

impl<M> Signal<PreSendReceiver<M>> {
    /// Append a receiver; receivers run in connection order.
    ///
    /// # Example
    ///
    /// ```
    /// use integrations_ses_mailer::{EmailMessage, MailSignals};
    ///
    /// let signals = MailSignals::<EmailMessage>::new();
    /// let subscription = signals.pre_send.connect(|message: &mut EmailMessage| {
    ///     message.subject = format!("[staging] {}", message.subject);
    /// });
    ///
    /// let mut message = EmailMessage::new("Hi", "Body", "app@example.com", ["a@example.com"]);
    /// signals.pre_send.send(&mut message);
    /// assert_eq!(message.subject, "[staging] Hi");
    ///
    /// assert!(signals.pre_send.disconnect(subscription));
    /// ```
    pub fn connect<F>(&self, receiver: F) -> Subscription
    where
        F: Fn(&mut M) + Send + Sync + 'static,
    {
        self.connect_arc(Arc::new(receiver))
    }

    /// Run every receiver against `message`.
    pub fn send(&self, message: &mut M) {
        for receiver in self.snapshot() {
            receiver(message);
        }
    }
}

impl<M> Signal<PostSendReceiver<M>> {
    pub fn connect<F>(&self, receiver: F) -> Subscription
    where
        F: Fn(&M, &str) + Send + Sync + 'static,
    {
        self.connect_arc(Arc::new(receiver))
    }

    pub fn send(&self, message: &M, message_id: &str) {
        for receiver in self.snapshot() {
            receiver(message, message_id);
        }
    }
}

/// The two hooks a backend fires. Share one instance between backends with
/// an `Arc`; receivers connected to it see every send from each of them.
pub struct MailSignals<M> {
    /// Fired before serialization, once per message.
    pub pre_send: Signal<PreSendReceiver<M>>,
    /// Fired after the service accepted a message.
    pub post_send: Signal<PostSendReceiver<M>>,
}

impl<M> MailSignals<M> {
    pub fn new() -> Self {
        Self {
            pre_send: Signal::new(),
            post_send: Signal::new(),
        }
    }
}

impl<M> Default for MailSignals<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for MailSignals<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSignals")
            .field("pre_send", &self.pre_send)
            .field("post_send", &self.post_send)
            .finish()
    }
}
