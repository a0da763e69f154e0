use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::state::Transition;
use crate::{FileJob, JobState};

/// Observer of job state changes.
///
/// Transitions are delivered one at a time in the order they happened, after
/// the job's transition lock has been released, on whichever thread is
/// draining the job's queue at that moment. A listener may pause, resume or
/// cancel the job; the transitions it causes are delivered once it returns.
pub trait JobListener: Send + Sync {
    fn job_state_changed(&self, job: &FileJob, previous: JobState, next: JobState);
}

#[derive(Debug, Default)]
struct Delivery {
    queue: VecDeque<Transition>,
    draining: bool,
}

/// Listeners held by weak reference; dropping the last strong handle
/// unregisters a listener implicitly.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Weak<dyn JobListener>>>,
    delivery: Mutex<Delivery>,
}

/// Clears the draining flag even if a listener panics.
struct DrainToken<'a> {
    delivery: &'a Mutex<Delivery>,
    armed: bool,
}

impl Drop for DrainToken<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.delivery).draining = false;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: JobListener + 'static>(&self, listener: &Arc<L>) {
        let listener: Arc<dyn JobListener> = Arc::clone(listener) as Arc<dyn JobListener>;
        let mut entries = self.lock_entries();
        let target = Arc::as_ptr(&listener);
        if entries
            .iter()
            .any(|entry| std::ptr::addr_eq(entry.as_ptr(), target))
        {
            return;
        }
        entries.push(Arc::downgrade(&listener));
    }

    pub fn remove<L: JobListener + 'static>(&self, listener: &Arc<L>) {
        let target = Arc::as_ptr(listener);
        self.lock_entries()
            .retain(|entry| !std::ptr::addr_eq(entry.as_ptr(), target));
    }

    /// Number of listeners still alive.
    pub fn len(&self) -> usize {
        let mut entries = self.lock_entries();
        entries.retain(|entry| entry.strong_count() > 0);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers one transition to every live listener, pruning dead entries.
    pub fn notify(&self, job: &FileJob, previous: JobState, next: JobState) {
        let live: Vec<Arc<dyn JobListener>> = {
            let mut entries = self.lock_entries();
            entries.retain(|entry| entry.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.job_state_changed(job, previous, next);
        }
    }

    /// Queues a transition for delivery. Callers hold the job's transition
    /// lock so the queue follows the order of the state changes.
    pub(crate) fn enqueue(&self, transition: Transition) {
        lock(&self.delivery).queue.push_back(transition);
    }

    /// Delivers queued transitions until the queue is empty.
    ///
    /// Only one thread drains at a time. A call made while another drain is
    /// in progress, including a nested call from a listener, returns at once
    /// and leaves its transitions to the running drain.
    pub(crate) fn deliver(&self, job: &FileJob) {
        {
            let mut delivery = lock(&self.delivery);
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }
        let mut token = DrainToken {
            delivery: &self.delivery,
            armed: true,
        };
        loop {
            let next = {
                let mut delivery = lock(&self.delivery);
                let next = delivery.queue.pop_front();
                if next.is_none() {
                    delivery.draining = false;
                }
                next
            };
            let Some(transition) = next else {
                token.armed = false;
                return;
            };
            self.notify(job, transition.previous, transition.next);
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<Weak<dyn JobListener>>> {
        lock(&self.entries)
    }
}
