/// Runs a closure when it goes out of scope, whether by a normal return, an
/// early return or a panic.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Taken on drop, so the closure runs at most once.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
