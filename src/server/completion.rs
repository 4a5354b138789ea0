//! Response bodies that report when they are done.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use pin_project_lite::pin_project;

type Callback = Box<dyn FnOnce() + Send + 'static>;

pin_project! {
    /// Wraps a body stream and runs a callback exactly once, when the stream
    /// ends or when it is dropped unfinished (client disconnect).
    pub struct NotifyOnComplete<S> {
        #[pin]
        inner: S,
        callback: Option<Callback>,
    }

    impl<S> PinnedDrop for NotifyOnComplete<S> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(callback) = this.project().callback.take() {
                callback();
            }
        }
    }
}

impl<S> NotifyOnComplete<S> {
    pub fn new<F>(inner: S, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner,
            callback: Some(Box::new(callback)),
        }
    }
}

impl<S: Stream> Stream for NotifyOnComplete<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let polled = this.inner.poll_next(cx);
        if let Poll::Ready(None) = polled {
            if let Some(callback) = this.callback.take() {
                callback();
            }
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn callback_runs_once_on_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut wrapped = NotifyOnComplete::new(stream::iter(vec![1, 2]), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        while wrapped.next().await.is_some() {}
        assert!(wrapped.next().await.is_none());
        drop(wrapped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_runs_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let wrapped = NotifyOnComplete::new(stream::iter(vec![1]), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(wrapped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
