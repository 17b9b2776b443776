//! Push-style observable values with last-value-wins semantics.
//!
//! A producer holds the latest value and forwards every change to each
//! attached [`Subscription`]. Subscribers receive the current value on
//! attach and may detach at any time, either explicitly or by dropping
//! their subscription.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::util::lock;

#[derive(Debug)]
struct Inner<T> {
    value: T,
    subscribers: Vec<(u64, Sender<T>)>,
    next_id: u64,
}

#[derive(Debug)]
pub struct Observable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Replace the value. Subscribers are notified only when it changed.
    pub fn set(&self, value: T) -> bool {
        let mut inner = lock(&self.inner);
        if inner.value == value {
            return false;
        }
        inner.value = value;
        Self::publish(&mut inner);
        true
    }

    /// Mutate the value in place; notifies when the result differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut inner = lock(&self.inner);
        let mut next = inner.value.clone();
        f(&mut next);
        if inner.value == next {
            return false;
        }
        inner.value = next;
        Self::publish(&mut inner);
        true
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let mut inner = lock(&self.inner);
        let (tx, rx) = mpsc::channel();
        // The receiver is alive, so this send cannot fail.
        let _ = tx.send(inner.value.clone());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, subscription: Subscription<T>) {
        lock(&self.inner)
            .subscribers
            .retain(|(id, _)| *id != subscription.id);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    fn publish(inner: &mut Inner<T>) {
        let value = inner.value.clone();
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }
}

impl<T: Clone + PartialEq + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Receiving end of an [`Observable`]. Values arrive in publish order.
#[derive(Debug)]
pub struct Subscription<T> {
    id: u64,
    rx: Receiver<T>,
}

impl<T> Subscription<T> {
    /// Next pending value, if any, without blocking.
    pub fn try_recv(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain everything pending and keep only the newest value.
    pub fn latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    /// Everything pending right now, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Block until a value satisfying `pred` arrives or `timeout` elapses.
    pub fn wait_for(&self, mut pred: impl FnMut(&T) -> bool, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(value) if pred(&value) => return Some(value),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
