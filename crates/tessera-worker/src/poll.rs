use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Poll `future` once with a no-op waker.
///
/// Tasks re-poll on their next resume, so wake-ups are never needed.
pub fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin + ?Sized,
{
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    Pin::new(future).poll(&mut cx)
}
