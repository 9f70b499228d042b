//! Snowflake-style identifier allocation for staged rows
//!
//! Ids are 64-bit values: sign bit 0, 41-bit millisecond timestamp relative
//! to 2021-01-01T00:00:00Z, 10-bit machine tag and a 12-bit sequence that
//! resets each millisecond. A single generator instance is shared across the
//! process and injected into whatever constructs staged products; ids are
//! strictly increasing in issuance order while the clock behaves.

use std::sync::Mutex;

use chrono::Utc;

use crate::domain::error::{DomainError, DomainResult};

/// Millisecond epoch: 2021-01-01T00:00:00Z.
const EPOCH_MILLIS: i64 = 1_609_459_200_000;
const MACHINE_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MACHINE_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_ID_BITS;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_MACHINE_ID: u16 = (1 << MACHINE_ID_BITS) - 1;

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

struct GeneratorState {
    last_timestamp: i64,
    sequence: i64,
}

/// Process-wide unique, time-ordered id allocator.
///
/// The whole read-compare-increment-assemble sequence runs inside one mutex
/// guard, so concurrent callers on the same instance can never collide.
pub struct IdGenerator {
    machine_id: i64,
    clock: Clock,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Create a generator reading the system clock.
    pub fn new(machine_id: u16) -> DomainResult<Self> {
        Self::with_clock(machine_id, Box::new(system_millis))
    }

    /// Create a generator with an injected millisecond clock (tests use this
    /// to simulate clock behavior).
    pub fn with_clock(machine_id: u16, clock: Clock) -> DomainResult<Self> {
        if machine_id > MAX_MACHINE_ID {
            return Err(DomainError::InvalidMachineId(machine_id));
        }
        Ok(Self {
            machine_id: i64::from(machine_id),
            clock,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        })
    }

    /// Issue the next id.
    ///
    /// Within the same millisecond the sequence increments; when it wraps
    /// past 4095 the call busy-waits for the next millisecond. A clock
    /// observed behind the last issued timestamp returns
    /// [`DomainError::ClockRegression`] instead of a value.
    pub fn next_id(&self) -> DomainResult<i64> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut timestamp = (self.clock)();

        if timestamp < state.last_timestamp {
            return Err(DomainError::ClockRegression);
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond.
                while timestamp <= state.last_timestamp {
                    timestamp = (self.clock)();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;

        Ok((timestamp << TIMESTAMP_SHIFT)
            | (self.machine_id << MACHINE_ID_SHIFT)
            | state.sequence)
    }
}

fn system_millis() -> i64 {
    Utc::now().timestamp_millis() - EPOCH_MILLIS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn rejects_out_of_range_machine_id() {
        assert!(IdGenerator::new(1023).is_ok());
        assert!(matches!(
            IdGenerator::new(1024),
            Err(DomainError::InvalidMachineId(1024))
        ));
    }

    #[test]
    fn sequence_increments_within_one_millisecond() {
        let generator = IdGenerator::with_clock(1, Box::new(|| 500)).unwrap();
        let first = generator.next_id().unwrap();
        let second = generator.next_id().unwrap();
        let third = generator.next_id().unwrap();

        assert_eq!(second, first + 1);
        assert_eq!(third, first + 2);
        assert_eq!(first >> TIMESTAMP_SHIFT, 500);
        assert_eq!((first >> MACHINE_ID_SHIFT) & 0x3FF, 1);
    }

    #[test]
    fn fails_on_clock_regression() {
        let now = Arc::new(AtomicI64::new(1_000));
        let clock = Arc::clone(&now);
        let generator =
            IdGenerator::with_clock(0, Box::new(move || clock.load(Ordering::SeqCst))).unwrap();

        let before = generator.next_id().unwrap();
        now.store(900, Ordering::SeqCst);

        assert_eq!(generator.next_id(), Err(DomainError::ClockRegression));

        // Once the clock catches up again, issuance resumes above the old id.
        now.store(1_001, Ordering::SeqCst);
        assert!(generator.next_id().unwrap() > before);
    }

    #[test]
    fn concurrent_callers_receive_unique_increasing_ids() {
        let generator = Arc::new(IdGenerator::new(7).unwrap());
        let threads = 8;
        let per_thread = 2_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    let mut ids = Vec::with_capacity(per_thread);
                    for _ in 0..per_thread {
                        ids.push(generator.next_id().unwrap());
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::with_capacity(threads * per_thread);
        for handle in handles {
            let ids = handle.join().unwrap();
            // Each caller observes monotonically increasing values.
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            all.extend(ids);
        }

        let unique: HashSet<i64> = all.iter().copied().collect();
        assert_eq!(unique.len(), threads * per_thread);
        assert!(all.iter().all(|id| *id > 0));
    }
}
