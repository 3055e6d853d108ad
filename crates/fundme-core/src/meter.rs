use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Gas charged for every call regardless of storage traffic.
pub const BASE_CALL_GAS: u64 = 21_000;
/// Gas per persistent storage read.
pub const READ_GAS: u64 = 2_100;
/// Gas per persistent storage write.
pub const WRITE_GAS: u64 = 5_000;

/// Counts persistent storage accesses made by ledger operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMeter {
    pub reads: u64,
    pub writes: u64,
}

impl AccessMeter {
    pub fn read(&mut self) {
        self.reads += 1;
    }

    pub fn read_many(&mut self, n: u64) {
        self.reads += n;
    }

    pub fn write(&mut self) {
        self.writes += 1;
    }

    pub fn gas(&self) -> u64 {
        BASE_CALL_GAS + self.reads * READ_GAS + self.writes * WRITE_GAS
    }

    /// Return the current counts and start over from zero.
    pub fn take(&mut self) -> AccessMeter {
        std::mem::take(self)
    }
}

impl AddAssign for AccessMeter {
    fn add_assign(&mut self, rhs: Self) {
        self.reads += rhs.reads;
        self.writes += rhs.writes;
    }
}
