//! Timer / event scheduling API
//!
//! Retransmission is never a blocking wait: a station asks the scheduler
//! for a one-shot event and returns, and the event loop hands the event
//! back to the station identified in it when the delay has elapsed.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::{LinkId, Ts};

/// Handle for a scheduled one-shot event
pub type TimerId = u32;

/// Events a station may schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    /// Backoff expired for the station on the given link,
    /// deliver via [`crate::wifi::Wifi::backoff_expired`]
    Backoff(LinkId),
}

impl TimerEvent {
    /// Link the event belongs to
    pub fn link(&self) -> LinkId {
        match self {
            TimerEvent::Backoff(link) => *link,
        }
    }
}

/// Scheduler trait provides one-shot timers, driven by an external event loop.
///
/// Scheduled events always fire, there is no cancellation.
pub trait Scheduler {
    /// Schedule `event` to be delivered after `delay` time units
    fn schedule_once(&mut self, delay: Ts, event: TimerEvent) -> TimerId;
}

impl <S: Scheduler + ?Sized> Scheduler for &mut S {
    fn schedule_once(&mut self, delay: Ts, event: TimerEvent) -> TimerId {
        (**self).schedule_once(delay, event)
    }
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::Ts;
    use super::{Scheduler, TimerEvent, TimerId};

    /// Timer scheduled via [`MockScheduler`]
    #[derive(Clone, Debug, PartialEq)]
    pub struct Scheduled {
        pub id: TimerId,
        pub delay: Ts,
        pub event: TimerEvent,
    }

    #[derive(Debug, Default)]
    struct Inner {
        next_id: TimerId,
        total: usize,
        pending: VecDeque<Scheduled>,
    }

    /// Mock scheduler implementation to assist with testing.
    ///
    /// Clones share state, so a test may keep one handle while the
    /// station under test owns another.
    #[derive(Clone, Debug)]
    pub struct MockScheduler(Arc<Mutex<Inner>>);

    impl MockScheduler {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner::default())))
        }

        /// Remove the oldest scheduled timer (ie. fire it)
        pub fn pop(&mut self) -> Option<Scheduled> {
            self.0.lock().unwrap().pending.pop_front()
        }

        /// Timers scheduled but not yet popped
        pub fn pending(&self) -> usize {
            self.0.lock().unwrap().pending.len()
        }

        /// Total number of timers ever scheduled
        pub fn total(&self) -> usize {
            self.0.lock().unwrap().total
        }
    }

    impl Scheduler for MockScheduler {
        fn schedule_once(&mut self, delay: Ts, event: TimerEvent) -> TimerId {
            let mut inner = self.0.lock().unwrap();

            let id = inner.next_id;
            inner.next_id = inner.next_id.wrapping_add(1);
            inner.total += 1;
            inner.pending.push_back(Scheduled{ id, delay, event });

            id
        }
    }
}
