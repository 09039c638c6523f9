use mio::Interest;

/// Tracks which readiness interests are currently armed on a usock's
/// descriptor. On the readiness-based POSIX worker there is no separate
/// kernel-side I/O request object to track per direction — the arming
/// itself *is* the in-flight task — so this is a thin bookkeeping struct
/// rather than a queue of pending operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskIo {
    readable: bool,
    writable: bool,
}

impl TaskIo {
    pub fn arm_readable(&mut self) {
        self.readable = true;
    }

    pub fn arm_writable(&mut self) {
        self.writable = true;
    }

    pub fn disarm_readable(&mut self) {
        self.readable = false;
    }

    pub fn disarm_writable(&mut self) {
        self.writable = false;
    }

    /// Clears both interests, reporting whether either one had been armed.
    /// Used by `cancel_io`: callers raise `SHUTDOWN` only if this returns
    /// `true`, matching the "degenerate to a no-op" rule for a usock that
    /// never had I/O in flight.
    pub fn cancel(&mut self) -> bool {
        let had_any = self.readable || self.writable;
        self.readable = false;
        self.writable = false;
        had_any
    }

    pub fn is_idle(&self) -> bool {
        !self.readable && !self.writable
    }

    pub fn interest(&self) -> Option<Interest> {
        match (self.readable, self.writable) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_idle_with_no_interest() {
        let t = TaskIo::default();
        assert!(t.is_idle());
        assert_eq!(t.interest(), None);
    }

    #[test]
    fn arming_both_directions_combines_interest() {
        let mut t = TaskIo::default();
        t.arm_readable();
        t.arm_writable();
        assert!(!t.is_idle());
        assert_eq!(t.interest(), Some(Interest::READABLE | Interest::WRITABLE));
    }

    #[test]
    fn cancel_reports_whether_anything_was_armed() {
        let mut t = TaskIo::default();
        assert!(!t.cancel());
        t.arm_readable();
        assert!(t.cancel());
        assert!(t.is_idle());
        assert!(!t.cancel());
    }

    #[test]
    fn disarm_clears_only_its_own_direction() {
        let mut t = TaskIo::default();
        t.arm_readable();
        t.arm_writable();
        t.disarm_writable();
        assert_eq!(t.interest(), Some(Interest::READABLE));
        t.disarm_readable();
        assert!(t.is_idle());
    }
}
