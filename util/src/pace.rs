//! Cooperative yielding for long traversals.
//!
//! Aggregations that walk the whole corpus take a pacer and call
//! [`Pacer::relinquish`] at natural boundaries so a single-threaded host
//! stays responsive. The host's scheduling primitives stay behind boxed
//! closures and never appear in core types.

use std::time::Duration;

/// Yield hook threaded through long-running aggregations.
pub trait Pacer {
    /// Give the host a chance to run. May block the logical worker until
    /// the host hands control back.
    fn relinquish(&mut self);
}

/// Runs everything to completion without yielding. The default under
/// test, and for hosts that do their own scheduling.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uninterrupted;

impl Pacer for Uninterrupted {
    fn relinquish(&mut self) {}
}

/// Suspends only while the host reports pending input.
pub struct InputAware {
    is_input_pending: Box<dyn FnMut() -> bool>,
    yield_to_host: Box<dyn FnMut()>,
}

impl InputAware {
    pub fn new(
        is_input_pending: impl FnMut() -> bool + 'static,
        yield_to_host: impl FnMut() + 'static,
    ) -> Self {
        InputAware {
            is_input_pending: Box::new(is_input_pending),
            yield_to_host: Box::new(yield_to_host),
        }
    }
}

impl Pacer for InputAware {
    fn relinquish(&mut self) {
        while (self.is_input_pending)() {
            (self.yield_to_host)();
        }
    }
}

/// Works against host-granted idle deadlines: when the current deadline
/// runs out, asks the host for a new one.
pub struct IdleDeadline {
    remaining: Box<dyn FnMut() -> Duration>,
    request_deadline: Box<dyn FnMut()>,
}

impl IdleDeadline {
    pub fn new(
        remaining: impl FnMut() -> Duration + 'static,
        request_deadline: impl FnMut() + 'static,
    ) -> Self {
        IdleDeadline {
            remaining: Box::new(remaining),
            request_deadline: Box::new(request_deadline),
        }
    }
}

impl Pacer for IdleDeadline {
    fn relinquish(&mut self) {
        if (self.remaining)().is_zero() {
            (self.request_deadline)();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[test]
    fn uninterrupted_is_a_no_op() {
        let mut pacer = Uninterrupted;
        for _ in 0..1000 {
            pacer.relinquish();
        }
    }

    #[test]
    fn input_aware_yields_until_input_drains() {
        let pending = Rc::new(Cell::new(3u32));
        let yields = Rc::new(Cell::new(0u32));

        let (p, y) = (pending.clone(), yields.clone());
        let mut pacer = InputAware::new(
            move || p.get() > 0,
            move || {
                pending.set(pending.get() - 1);
                y.set(y.get() + 1);
            },
        );

        pacer.relinquish();
        assert_eq!(yields.get(), 3);
        pacer.relinquish();
        assert_eq!(yields.get(), 3);
    }

    #[test]
    fn idle_deadline_requests_on_exhaustion() {
        let left = Rc::new(Cell::new(Duration::ZERO));
        let requests = Rc::new(Cell::new(0u32));

        let (l, r) = (left.clone(), requests.clone());
        let mut pacer = IdleDeadline::new(
            move || l.get(),
            move || {
                left.set(Duration::from_millis(5));
                r.set(r.get() + 1);
            },
        );

        pacer.relinquish();
        assert_eq!(requests.get(), 1);
        // Deadline still has time left, no new request.
        pacer.relinquish();
        assert_eq!(requests.get(), 1);
    }
}
