//! Lock-ordered shared state
//!
//! Every entity shared between workers sits behind exactly one
//! [`OrderedMutex`]. An operation touching several of them acquires the locks
//! in ascending [`LockRank`] and releases them in descending rank:
//!
//! | Rank | Entity            | Owner / writer                       |
//! |------|-------------------|--------------------------------------|
//! | 0    | `KeyLatch`        | debounce gate                        |
//! | 1    | `ModeState`       | mode machine                         |
//! | 2    | dirty flag        | anyone changing displayed state      |
//! | 3    | stable distance   | distance ranger                      |
//! | 4    | `Clocks`          | mode machine, clock tick             |
//! | 5    | `CapacityRange`   | mode machine (calibration)           |
//! | 6    | alarm armed       | mode machine                         |
//!
//! The order is checked at runtime by [`LockOrder`], one per operation:
//! acquiring a rank at or below one already held, or releasing anything but
//! the most recent lock, panics.

use core::cell::{Cell, RefCell};
use core::ops::{Deref, DerefMut};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use heapless::Vec;

use crate::debounce::KeyLatch;
use crate::machine::{Clocks, ModeState};
use crate::types::CapacityRange;

/// Global acquisition order of the shared entities
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockRank {
    KeyLatch = 0,
    Mode = 1,
    Dirty = 2,
    StableDistance = 3,
    Clocks = 4,
    Capacity = 5,
    AlarmArmed = 6,
}

impl LockRank {
    const fn bit(self) -> u8 {
        1 << self as u8
    }

    fn from_index(index: u8) -> LockRank {
        match index {
            0 => LockRank::KeyLatch,
            1 => LockRank::Mode,
            2 => LockRank::Dirty,
            3 => LockRank::StableDistance,
            4 => LockRank::Clocks,
            5 => LockRank::Capacity,
            _ => LockRank::AlarmArmed,
        }
    }
}

/// Capacity of the acquisition trace kept for inspection
pub const TRACE_LEN: usize = 16;

/// Lock-order checker scoped to one logical operation
pub struct LockOrder {
    held: Cell<u8>,
    trace: RefCell<Vec<LockRank, TRACE_LEN>>,
}

impl LockOrder {
    pub const fn new() -> Self {
        Self {
            held: Cell::new(0),
            trace: RefCell::new(Vec::new()),
        }
    }

    /// Highest rank currently held
    pub fn highest_held(&self) -> Option<LockRank> {
        let held = self.held.get();
        if held == 0 {
            None
        } else {
            Some(LockRank::from_index(7 - held.leading_zeros() as u8))
        }
    }

    /// Returns true if no lock is held
    pub fn is_idle(&self) -> bool {
        self.held.get() == 0
    }

    /// Ranks acquired so far, in acquisition order
    pub fn trace(&self) -> Vec<LockRank, TRACE_LEN> {
        self.trace.borrow().clone()
    }

    fn check(&self, rank: LockRank) {
        if let Some(highest) = self.highest_held() {
            if rank <= highest {
                panic!("lock order violation: {:?} acquired while holding {:?}", rank, highest);
            }
        }
    }

    fn acquired(&self, rank: LockRank) {
        self.held.set(self.held.get() | rank.bit());
        // The trace is diagnostic only; a full trace stops recording
        let _ = self.trace.borrow_mut().push(rank);
    }

    fn released(&self, rank: LockRank) {
        if self.highest_held() != Some(rank) {
            panic!("lock order violation: {:?} released before {:?}", rank, self.highest_held());
        }
        self.held.set(self.held.get() & !rank.bit());
    }
}

impl Default for LockOrder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutex that only hands out its value through a [`LockOrder`]
pub struct OrderedMutex<T> {
    rank: LockRank,
    inner: Mutex<CriticalSectionRawMutex, T>,
}

impl<T> OrderedMutex<T> {
    pub const fn new(rank: LockRank, value: T) -> Self {
        Self {
            rank,
            inner: Mutex::new(value),
        }
    }

    pub fn rank(&self) -> LockRank {
        self.rank
    }

    /// Wait for the lock
    pub async fn lock<'a>(&'a self, order: &'a LockOrder) -> OrderedGuard<'a, T> {
        order.check(self.rank);
        let guard = self.inner.lock().await;
        order.acquired(self.rank);
        OrderedGuard { guard, order, rank: self.rank }
    }

    /// Take the lock only if nobody holds it
    pub fn try_lock<'a>(&'a self, order: &'a LockOrder) -> Option<OrderedGuard<'a, T>> {
        order.check(self.rank);
        let guard = self.inner.try_lock().ok()?;
        order.acquired(self.rank);
        Some(OrderedGuard { guard, order, rank: self.rank })
    }
}

impl<T: Copy> OrderedMutex<T> {
    /// Copy the guarded value out
    pub async fn get(&self, order: &LockOrder) -> T {
        *self.lock(order).await
    }

    /// Overwrite the guarded value
    pub async fn set(&self, order: &LockOrder, value: T) {
        *self.lock(order).await = value;
    }

    /// Replace the value with `f(old)` and return the old value
    pub async fn compute_and_swap<F>(&self, order: &LockOrder, f: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        let mut guard = self.lock(order).await;
        let old = *guard;
        *guard = f(old);
        old
    }
}

/// Access to a locked entity; dropping it releases the rank
pub struct OrderedGuard<'a, T> {
    guard: MutexGuard<'a, CriticalSectionRawMutex, T>,
    order: &'a LockOrder,
    rank: LockRank,
}

impl<T> Deref for OrderedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OrderedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OrderedGuard<'_, T> {
    fn drop(&mut self) {
        self.order.released(self.rank);
    }
}

/// Every entity shared between the keypad, ranger and output workers
pub struct SharedState {
    pub key_latch: OrderedMutex<KeyLatch>,
    pub mode: OrderedMutex<ModeState>,
    pub dirty: OrderedMutex<bool>,
    pub stable_distance: OrderedMutex<u16>,
    pub clocks: OrderedMutex<Clocks>,
    pub capacity: OrderedMutex<CapacityRange>,
    pub alarm_armed: OrderedMutex<bool>,
}

impl SharedState {
    /// Power-on state: setting the clock, nothing calibrated, alarm disarmed
    pub const fn new(uncalibrated: CapacityRange) -> Self {
        Self {
            key_latch: OrderedMutex::new(LockRank::KeyLatch, KeyLatch::new()),
            mode: OrderedMutex::new(LockRank::Mode, ModeState::new()),
            dirty: OrderedMutex::new(LockRank::Dirty, true),
            stable_distance: OrderedMutex::new(LockRank::StableDistance, 0),
            clocks: OrderedMutex::new(LockRank::Clocks, Clocks::new()),
            capacity: OrderedMutex::new(LockRank::Capacity, uncalibrated),
            alarm_armed: OrderedMutex::new(LockRank::AlarmArmed, false),
        }
    }

    /// Flag the display as stale
    pub async fn mark_dirty(&self, order: &LockOrder) {
        self.dirty.set(order, true).await;
    }
}
