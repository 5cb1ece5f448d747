//! Sleeper port - 待機の抽象化
//!
//! The synchronous retry loop waits through this trait so tests can record the
//! requested delays instead of blocking.

use std::time::Duration;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for Box<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}
