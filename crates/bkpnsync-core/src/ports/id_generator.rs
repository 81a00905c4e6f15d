//! IdGenerator port - cycle id generation.

use crate::domain::CycleId;
use crate::ports::Clock;
use ulid::Ulid;

/// Mints cycle ids.
pub trait IdGenerator: Send + Sync {
    fn generate_cycle_id(&self) -> CycleId;
}

/// ULID-based generator; the timestamp part comes from the injected clock.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_cycle_id(&self) -> CycleId {
        let timestamp_ms = self.clock.now_utc().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        CycleId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{Local, TimeZone};

    #[test]
    fn generated_ids_are_unique() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_cycle_id();
        let id2 = id_gen.generate_cycle_id();

        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("cycle-"));
    }

    #[test]
    fn fixed_clock_pins_timestamp_part() {
        let fixed = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed));

        let id1 = id_gen.generate_cycle_id();
        let id2 = id_gen.generate_cycle_id();

        // random part differs, timestamp part does not
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), id2.as_ulid().timestamp_ms());
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed.timestamp_millis() as u64);
    }
}
