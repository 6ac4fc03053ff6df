//! Nullable id generator: predictable session ids.

use std::sync::atomic::{AtomicU64, Ordering};

use kyc_types::{IdGenerator, SessionId, TypeError};

pub struct NullIdGenerator {
    mode: Mode,
}

enum Mode {
    Sequential(AtomicU64),
    Fixed(String),
}

impl NullIdGenerator {
    /// `KYC_000…001`, `KYC_000…002`, … in the same shape as real ids.
    pub fn sequential() -> Self {
        Self {
            mode: Mode::Sequential(AtomicU64::new(1)),
        }
    }

    /// The same id on every call, for collision tests.
    pub fn fixed(id: &str) -> Self {
        Self {
            mode: Mode::Fixed(id.to_string()),
        }
    }
}

impl IdGenerator for NullIdGenerator {
    fn next_id(&self) -> Result<SessionId, TypeError> {
        match &self.mode {
            Mode::Sequential(next) => {
                let n = next.fetch_add(1, Ordering::SeqCst);
                SessionId::parse(format!("{}{n:032X}", SessionId::PREFIX))
            }
            Mode::Fixed(id) => SessionId::parse(id.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_distinct_and_valid() {
        let ids = NullIdGenerator::sequential();
        let a = ids.next_id().unwrap();
        let b = ids.next_id().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "KYC_00000000000000000000000000000001");
    }

    #[test]
    fn fixed_ids_repeat() {
        let ids = NullIdGenerator::fixed("KYC_0000DEADBEEF");
        assert_eq!(ids.next_id().unwrap(), ids.next_id().unwrap());
        assert!(NullIdGenerator::fixed("bad").next_id().is_err());
    }
}
