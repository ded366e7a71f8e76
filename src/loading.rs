use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::watch;

/// Shared "long-running work in progress" indicator.
///
/// Guards nest: the flag reads `true` while at least one [`LoadingGuard`] is alive and drops back
/// to `false` when the last one is released, whichever path released it.
#[derive(Clone, Debug)]
pub struct LoadingFlag {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    depth: AtomicUsize,
}

impl Default for LoadingFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                depth: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_loading(&self) -> bool {
        *self.inner.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    #[must_use = "loading is cleared as soon as the guard is dropped"]
    pub fn raise(&self) -> LoadingGuard {
        if self.inner.depth.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.tx.send_replace(true);
        }
        LoadingGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
pub struct LoadingGuard {
    inner: Arc<Inner>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.inner.depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.tx.send_replace(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_guards_clear_on_last_drop() {
        let flag = LoadingFlag::new();
        let rx = flag.subscribe();
        assert!(!flag.is_loading());

        let outer = flag.raise();
        assert!(*rx.borrow());
        let inner = flag.clone().raise();
        drop(inner);
        assert!(flag.is_loading());
        drop(outer);
        assert!(!flag.is_loading());
        assert!(!*rx.borrow());
    }

    #[test]
    fn guard_clears_during_unwind_path() {
        let flag = LoadingFlag::new();
        let res: Result<(), &str> = (|| {
            let _g = flag.raise();
            Err("boom")
        })();
        assert!(res.is_err());
        assert!(!flag.is_loading());
    }
}
