//! Safe execution context for flash mutation
//!
//! While a sector is erased or a page programmed, the flash array cannot
//! serve reads. Any instruction fetch from flash on another core, or from
//! an interrupt handler on this one, is undefined behavior for that window.
//!
//! [`SafeExecution`] abstracts "stop everything else", and [`SuspendGuard`]
//! scopes it so the previous state is restored on every exit path.

/// Proof that other execution contexts are suspended
///
/// Only [`SuspendGuard`] can create one. Flash operations that need the
/// array to themselves take `&Suspended`.
#[derive(Debug)]
pub struct Suspended {
    _private: (),
}

/// Suspends and resumes the other execution contexts on the chip
pub trait SafeExecution {
    /// Whatever is needed to restore the prior execution state
    type State;

    /// Park other contexts and mask interrupts
    fn suspend(&mut self) -> Self::State;

    /// Undo a [`suspend`](Self::suspend)
    fn resume(&mut self, state: Self::State);

    /// Run `op` with other contexts suspended
    ///
    /// Parameters reach `op` through its captures. The prior state is
    /// restored when the guard drops, whether or not `op` succeeded.
    fn run<R, F>(&mut self, op: F) -> R
    where
        Self: Sized,
        F: FnOnce(&Suspended) -> R,
    {
        let guard = SuspendGuard::new(self);
        op(guard.token())
    }
}

impl<T: SafeExecution + ?Sized> SafeExecution for &mut T {
    type State = T::State;

    fn suspend(&mut self) -> Self::State {
        T::suspend(self)
    }

    fn resume(&mut self, state: Self::State) {
        T::resume(self, state)
    }
}

/// Scoped suspension of other execution contexts
///
/// Resumes in `Drop`.
pub struct SuspendGuard<'a, X: SafeExecution> {
    exec: &'a mut X,
    state: Option<X::State>,
    token: Suspended,
}

impl<'a, X: SafeExecution> SuspendGuard<'a, X> {
    /// Suspend `exec` until the returned guard is dropped
    pub fn new(exec: &'a mut X) -> Self {
        let state = exec.suspend();
        Self {
            exec,
            state: Some(state),
            token: Suspended { _private: () },
        }
    }

    /// Token to hand to flash operations
    pub fn token(&self) -> &Suspended {
        &self.token
    }
}

impl<X: SafeExecution> Drop for SuspendGuard<'_, X> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.exec.resume(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tracks nesting depth and what was handed back on resume
    #[derive(Default)]
    struct Counting {
        depth: u32,
        suspends: u32,
        last_restored: Option<u32>,
    }

    impl SafeExecution for Counting {
        type State = u32;

        fn suspend(&mut self) -> u32 {
            self.suspends += 1;
            self.depth += 1;
            self.suspends
        }

        fn resume(&mut self, state: u32) {
            self.depth -= 1;
            self.last_restored = Some(state);
        }
    }

    #[test]
    fn test_run_restores_after_success() {
        let mut exec = Counting::default();
        let value = exec.run(|_| 42);

        assert_eq!(value, 42);
        assert_eq!(exec.depth, 0);
        assert_eq!(exec.last_restored, Some(1));
    }

    #[test]
    fn test_run_restores_after_error() {
        let mut exec = Counting::default();
        let result: Result<(), ()> = exec.run(|_| Err(()));

        assert!(result.is_err());
        assert_eq!(exec.depth, 0);
    }

    #[test]
    fn test_guard_resumes_on_drop() {
        let mut exec = Counting::default();
        {
            let guard = SuspendGuard::new(&mut exec);
            let _token = guard.token();
        }
        assert_eq!(exec.suspends, 1);
        assert_eq!(exec.depth, 0);
    }
}
