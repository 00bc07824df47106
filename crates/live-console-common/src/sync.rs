use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

static POISON_RECOVERIES: AtomicUsize = AtomicUsize::new(0);

/// Number of times a poisoned lock has been recovered in this process.
pub fn poison_recovery_count() -> usize {
    POISON_RECOVERIES.load(Ordering::Relaxed)
}

fn record_recovery(kind: &'static str) {
    POISON_RECOVERIES.fetch_add(1, Ordering::Relaxed);
    warn!(lock = kind, "Recovering from poisoned lock");
}

pub fn rwlock_read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        record_recovery("rwlock-read");
        poisoned.into_inner()
    })
}

pub fn rwlock_write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        record_recovery("rwlock-write");
        poisoned.into_inner()
    })
}

pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        record_recovery("mutex");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mutex_recovers_after_panic() {
        let lock = Arc::new(Mutex::new(1));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(lock.is_poisoned());
        let before = poison_recovery_count();
        let mut guard = mutex_lock_or_recover(&lock);
        *guard += 1;
        assert_eq!(*guard, 2);
        assert!(poison_recovery_count() > before);
    }

    #[test]
    fn test_rwlock_recovers_after_panic() {
        let lock = Arc::new(RwLock::new(vec![1]));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        rwlock_write_or_recover(&lock).push(2);
        assert_eq!(*rwlock_read_or_recover(&lock), vec![1, 2]);
    }
}
