use std::{
    future::Future,
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::task::noop_waker_ref;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Drives a future that never waits on I/O (e.g. request presigning) to completion
/// from synchronous code.
pub fn resolve_local<Fut, T, E>(future: Fut, max_polls: usize) -> Option<Result<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let mut future = Box::pin(future);
    let mut context = Context::from_waker(noop_waker_ref());

    for _ in 0..max_polls.max(1) {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(result) => {
                return Some(result);
            }
            Poll::Pending => {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::{future, pin::Pin};

    use super::*;

    struct PendingTimes(usize);

    impl Future for PendingTimes {
        type Output = Result<usize, ()>;

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            if self.0 == 0 {
                return Poll::Ready(Ok(7));
            }
            self.0 -= 1;
            Poll::Pending
        }
    }

    #[test]
    fn test_resolve_local() {
        let cases = vec![(0, 1, Some(Ok(7))), (2, 3, Some(Ok(7))), (5, 3, None)];

        for (pending, max_polls, expected) in cases {
            let result = resolve_local(PendingTimes(pending), max_polls);
            assert_eq!(result, expected, "failed for case: {}/{}", pending, max_polls);
        }
    }

    #[test]
    fn test_resolve_local_error() {
        let result = resolve_local(future::ready(Err::<(), _>("boom")), 1);
        assert_eq!(result, Some(Err("boom")));
    }
}
