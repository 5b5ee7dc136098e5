//! Future that stays pending for a fixed number of polls.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Resolves to `value` on poll number `polls + 1`.
///
/// Never registers a waker: the tick scheduler re-polls on every resume.
#[derive(Debug)]
pub struct Delayed<T> {
    polls_left: usize,
    value: Option<T>,
}

impl<T> Delayed<T> {
    pub fn new(polls: usize, value: T) -> Self {
        Self {
            polls_left: polls,
            value: Some(value),
        }
    }
}

impl<T> Unpin for Delayed<T> {}

impl<T> Future for Delayed<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        if this.polls_left > 0 {
            this.polls_left -= 1;
            return Poll::Pending;
        }
        Poll::Ready(this.value.take().expect("Delayed polled after completion"))
    }
}
