// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-address mutual exclusion and per-bus serialisation of transactions.
//!
//! Two locks are in play: a reentrant per-address lock, held for the
//! duration of a whole command transaction (identity, read, calibration
//! step, ...), and a single process-wide lock guarding the shared bus
//! handle, taken only for the duration of one `ping`/`read`/`write` call.
//! The second is the minimum required to avoid kernel-level slave-address
//! races; the first is what gives a multi-step request exclusive use of an
//! address for its whole sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::bus::BusAdapter;
use crate::error::DriverError;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

struct ReentrantLock {
    state: Mutex<LockState>,
    released: std::sync::Condvar,
}

impl ReentrantLock {
    fn new() -> Self {
        ReentrantLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            released: std::sync::Condvar::new(),
        }
    }

    fn acquire(&self, timeout: Duration) -> bool {
        let this = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            match state.owner {
                Some(owner) if owner == this => {
                    state.depth += 1;
                    return true;
                }
                None => {
                    state.owner = Some(this);
                    state.depth = 1;
                    return true;
                }
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, result) =
                        self.released.wait_timeout(state, deadline - now).unwrap();
                    state = guard;
                    if result.timed_out() && state.owner.is_some() {
                        return false;
                    }
                }
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_all();
        }
    }
}

/// Arbitrates concurrent access to a shared I2C bus: one reentrant lock per
/// address, plus a single file lock for the underlying bus handle.
pub struct SessionProvider<B> {
    bus: Arc<Mutex<B>>,
    address_locks: Mutex<HashMap<u8, Arc<ReentrantLock>>>,
    default_timeout: Duration,
}

impl<B: BusAdapter> SessionProvider<B> {
    pub fn new(bus: B, default_timeout: Duration) -> Self {
        SessionProvider {
            bus: Arc::new(Mutex::new(bus)),
            address_locks: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    /// Acquire a session on `address` using the provider's default timeout.
    pub fn acquire(&self, address: u8) -> Result<Session<B>, DriverError> {
        self.acquire_with_timeout(address, self.default_timeout)
    }

    pub fn acquire_with_timeout(
        &self,
        address: u8,
        timeout: Duration,
    ) -> Result<Session<B>, DriverError> {
        let lock = {
            let mut locks = self.address_locks.lock().unwrap();
            locks
                .entry(address)
                .or_insert_with(|| Arc::new(ReentrantLock::new()))
                .clone()
        };

        if !lock.acquire(timeout) {
            return Err(DriverError::BusBusy { address });
        }

        Ok(Session {
            address,
            lock,
            bus: self.bus.clone(),
        })
    }
}

/// An exclusive session on one address. Every `ping`/`read`/`write` call
/// takes the file lock for just that one operation; the address lock is
/// held for the whole lifetime of the session and released on drop.
pub struct Session<B> {
    address: u8,
    lock: Arc<ReentrantLock>,
    bus: Arc<Mutex<B>>,
}

// `ReentrantLock`/`Mutex` don't implement `Debug`, so this is hand-written
// rather than derived; it only needs to exist to satisfy `Result::unwrap_err`'s
// `Debug` bound on the `Ok` side in tests.
impl<B> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl<B: BusAdapter> Session<B> {
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn ping(&self) -> Result<bool, DriverError> {
        self.bus.lock().unwrap().ping(self.address)
    }

    pub fn read(&self) -> Result<Vec<u8>, DriverError> {
        self.bus.lock().unwrap().read(self.address)
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), DriverError> {
        self.bus.lock().unwrap().write(self.address, bytes)
    }
}

impl<B> Drop for Session<B> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    struct RecordingBus {
        concurrent: Arc<AtomicUsize>,
        max_concurrent: Arc<AtomicUsize>,
    }

    impl BusAdapter for RecordingBus {
        fn ping(&mut self, _address: u8) -> Result<bool, DriverError> {
            Ok(true)
        }

        fn read(&mut self, _address: u8) -> Result<Vec<u8>, DriverError> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0x01, 0x00])
        }

        fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[test]
    fn same_address_never_interleaves() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(SessionProvider::new(
            RecordingBus {
                concurrent: concurrent.clone(),
                max_concurrent: max_concurrent.clone(),
            },
            Duration::from_secs(1),
        ));

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provider = provider.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let session = provider.acquire(42).unwrap();
                    session.read().unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_addresses_proceed_concurrently() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(SessionProvider::new(
            RecordingBus {
                concurrent: concurrent.clone(),
                max_concurrent: max_concurrent.clone(),
            },
            Duration::from_secs(1),
        ));

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2u8)
            .map(|addr| {
                let provider = provider.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let session = provider.acquire(addr).unwrap();
                    session.read().unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(max_concurrent.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn reentrant_acquire_from_same_thread_succeeds() {
        let provider = SessionProvider::new(
            RecordingBus {
                concurrent: Arc::new(AtomicUsize::new(0)),
                max_concurrent: Arc::new(AtomicUsize::new(0)),
            },
            Duration::from_secs(1),
        );

        let outer = provider.acquire(7).unwrap();
        let inner = provider.acquire(7).unwrap();
        inner.read().unwrap();
        drop(inner);
        outer.read().unwrap();
    }

    #[test]
    fn timeout_reports_bus_busy() {
        let provider = Arc::new(SessionProvider::new(
            RecordingBus {
                concurrent: Arc::new(AtomicUsize::new(0)),
                max_concurrent: Arc::new(AtomicUsize::new(0)),
            },
            Duration::from_millis(50),
        ));

        let held = provider.acquire(5).unwrap();
        let other = provider.clone();
        let blocked = thread::spawn(move || other.acquire(5));
        let result = blocked.join().unwrap();
        drop(held);

        assert_eq!(result.unwrap_err(), DriverError::BusBusy { address: 5 });
    }
}
