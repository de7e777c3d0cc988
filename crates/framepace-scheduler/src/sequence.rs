//! Debug-build enforcement of the single-sequence calling contract

#[cfg(debug_assertions)]
use std::thread::{self, ThreadId};

/// Binds to the first thread that calls [`SequenceChecker::check`] and
/// asserts every later call comes from the same thread. Compiles to nothing
/// in release builds.
#[derive(Debug, Default)]
pub(crate) struct SequenceChecker {
    #[cfg(debug_assertions)]
    owner: Option<ThreadId>,
}

impl SequenceChecker {
    #[inline]
    pub(crate) fn check(&mut self) {
        #[cfg(debug_assertions)]
        {
            let current = thread::current().id();
            match self.owner {
                None => self.owner = Some(current),
                Some(owner) => debug_assert_eq!(
                    owner, current,
                    "FrameScheduler called from a second thread without detach_from_sequence()"
                ),
            }
        }
    }

    /// Forget the bound thread; the next call rebinds
    pub(crate) fn detach(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner = None;
        }
    }
}

#[cfg(all(test, debug_assertions))]
mod tests {
    use super::*;

    #[test]
    fn test_same_thread_passes() {
        let mut checker = SequenceChecker::default();
        checker.check();
        checker.check();
    }

    #[test]
    fn test_detach_allows_new_thread() {
        let mut checker = SequenceChecker::default();
        checker.check();
        checker.detach();
        let handle = std::thread::spawn(move || {
            checker.check();
            checker
        });
        assert!(handle.join().is_ok());
    }

    #[test]
    fn test_second_thread_panics() {
        let mut checker = SequenceChecker::default();
        checker.check();
        let handle = std::thread::spawn(move || checker.check());
        assert!(handle.join().is_err());
    }
}
