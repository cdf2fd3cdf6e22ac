//! Channel-like structures for the single-threaded control process.
//!
//! Messages sit in a sender's outbox until the channel is stepped; after
//! that, they sit in every receiver's inbox. `recv` never blocks, which is
//! what lets the control loop drain each source within its tick budget.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};
use thiserror::Error;
use tracing::trace;

/// A single-threaded mpmc channel that requires manual stepping for
/// messages to propagate.
#[derive(Debug)]
pub struct StepChannel<T: Clone> {
    senders: Vec<Sender<T>>,
    receivers: Vec<Receiver<T>>,
}

impl<T: Clone> Default for StepChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> StepChannel<T> {
    pub fn new() -> Self {
        StepChannel {
            senders: vec![],
            receivers: vec![],
        }
    }

    pub fn sender(&mut self, outbox_capacity: impl Into<Option<usize>>) -> Sender<T> {
        let rc = Rc::new(RefCell::new(Inner {
            queue: VecDeque::new(),
            capacity: outbox_capacity.into(),
        }));
        self.senders.push(Sender(rc.clone()));
        Sender(rc)
    }

    pub fn receiver(&mut self, inbox_capacity: impl Into<Option<usize>>) -> Receiver<T> {
        let rc = Rc::new(RefCell::new(Inner {
            queue: VecDeque::new(),
            capacity: inbox_capacity.into(),
        }));
        self.receivers.push(Receiver(rc.clone()));
        Receiver(rc)
    }
}

/// This is a trait so we can erase the message type, and still step
pub trait Step {
    fn step(&mut self) -> Result<(), ChannelError>;
}

impl<T: Clone> Step for StepChannel<T> {
    fn step(&mut self) -> Result<(), ChannelError> {
        for s in self.senders.iter() {
            let mut s_inner = s.0.borrow_mut();

            while let Some(msg) = s_inner.queue.pop_front() {
                for r in self.receivers.iter() {
                    let mut r_inner = r.0.borrow_mut();

                    if let Some(capacity) = r_inner.capacity {
                        if r_inner.queue.len() >= capacity {
                            return Err(ChannelError::QueueFull);
                        }
                    }

                    r_inner.queue.push_back(msg.clone());
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
struct Inner<T> {
    queue: VecDeque<T>,
    capacity: Option<usize>,
}

#[derive(Debug)]
pub struct Sender<T>(Rc<RefCell<Inner<T>>>);

impl<T> Sender<T> {
    pub fn try_send(&mut self, item: T) -> Result<(), ChannelError> {
        let mut inner = self.0.borrow_mut();

        if let Some(capacity) = inner.capacity {
            if inner.queue.len() >= capacity {
                return Err(ChannelError::QueueFull);
            }
        }

        trace!("channel send");
        inner.queue.push_back(item);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.0.borrow_mut().queue.clear();
    }
}

#[derive(Debug)]
pub struct Receiver<T>(Rc<RefCell<Inner<T>>>);

impl<T> Receiver<T> {
    /// Non-blocking; `None` means nothing is waiting, whether the source
    /// is idle or gone.
    pub fn recv(&mut self) -> Option<T> {
        let msg = self.0.borrow_mut().queue.pop_front();
        if msg.is_some() {
            trace!("channel recv");
        }
        msg
    }

    pub fn clear(&mut self) {
        self.0.borrow_mut().queue.clear();
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Queue full")]
    QueueFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_wait_for_the_step() {
        let mut ch: StepChannel<u32> = StepChannel::new();
        let mut tx = ch.sender(None);
        let mut rx = ch.receiver(None);

        tx.try_send(7).unwrap();
        assert_eq!(rx.recv(), None);

        ch.step().unwrap();
        assert_eq!(rx.recv(), Some(7));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn per_source_order_is_preserved() {
        let mut ch: StepChannel<u32> = StepChannel::new();
        let mut tx = ch.sender(None);
        let mut rx = ch.receiver(None);

        for n in 0..4 {
            tx.try_send(n).unwrap();
        }
        ch.step().unwrap();
        assert_eq!((rx.recv(), rx.recv(), rx.recv(), rx.recv()), (Some(0), Some(1), Some(2), Some(3)));
    }

    #[test]
    fn every_receiver_sees_every_message() {
        let mut ch: StepChannel<&'static str> = StepChannel::new();
        let mut tx = ch.sender(None);
        let mut rx_a = ch.receiver(None);
        let mut rx_b = ch.receiver(None);

        tx.try_send("hello").unwrap();
        ch.step().unwrap();
        assert_eq!(rx_a.recv(), Some("hello"));
        assert_eq!(rx_b.recv(), Some("hello"));
    }

    #[test]
    fn outbox_capacity_is_enforced() {
        let mut ch: StepChannel<u32> = StepChannel::new();
        let mut tx = ch.sender(1);
        let _rx = ch.receiver(None);

        tx.try_send(1).unwrap();
        assert!(matches!(tx.try_send(2), Err(ChannelError::QueueFull)));
    }
}
