//! Controller status registers
//!
//! Both registers are 18 bits wide, right-justified in the storage word.

use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};
use strum::Display;

bitfield! {
    /// Status A: the command register, rewritten by host command pulses
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusA(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Function code (see FunctionCode)
        pub function: u8 @ 0..=2,

        /// Direction: 0 = forward, 1 = reverse
        pub reverse: bool @ 4,

        /// Start/stop: 1 = start tape motion
        pub go: bool @ 5,

        /// Unit select. 1..7 select transports 1..7, 10 (octal) selects
        /// transport 8; 0 and 11..17 select nothing.
        pub unit: u8 @ 12..=15,
    }
}

bitfield! {
    /// Status B: the flag/status register observed by the host
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusB(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Block end flag: the final word of a block has been serviced
        pub bef: bool @ 5,

        /// Data flag: a word is ready for (read) or wanted from (write)
        /// the host
        pub dtf: bool @ 6,

        /// Selected transport is driving or has deferred motion pending
        pub go: bool @ 10,

        /// Selected transport is moving in reverse
        pub rev: bool @ 11,

        /// Timing error: the host failed to service the data flag in time
        pub tim: bool @ 13,

        /// Select error: illegal unit, unusable drive, rejected function
        /// or off-reel runaway
        pub sel: bool @ 14,

        /// End zone error
        pub end: bool @ 15,

        /// Mark track error (never raised by this controller)
        pub mrk: bool @ 16,

        /// Error flag: OR of the specific error bits
        pub erf: bool @ 17,
    }
}

impl StatusB {
    /// The specific error bits summarized by ERF
    pub const ERROR_MASK: u32 = (1 << 13) | (1 << 14) | (1 << 15) | (1 << 16);

    /// The three interrupt sources
    const FLAG_MASK: u32 = (1 << 5) | (1 << 6) | (1 << 17);

    /// True if any interrupt condition is present
    pub fn flags_raised(self) -> bool {
        self.dtf() || self.bef() || self.erf()
    }

    /// True if any specific error bit is set
    pub fn any_error(self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }

    /// Clears DTF, BEF, ERF and the specific error bits, as MSE and MLC do
    pub fn clear_flags(&mut self) {
        self.0 &= !(Self::FLAG_MASK | Self::ERROR_MASK);
    }
}

/// The specific error conditions, each a single Status B bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, strum::IntoStaticStr)]
pub enum ErrorBit {
    EndZone,
    Timing,
    MarkTrack,
    Select,
}

impl ErrorBit {
    pub fn set_in(self, b: &mut StatusB) {
        match self {
            Self::EndZone => b.set_end(true),
            Self::Timing => b.set_tim(true),
            Self::MarkTrack => b.set_mrk(true),
            Self::Select => b.set_sel(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_a_fields() {
        let mut a = StatusA(0);
        a.set_unit(0o10);
        a.set_go(true);
        a.set_reverse(true);
        a.set_function(5);
        assert_eq!(a.0, (0o10 << 12) | (1 << 5) | (1 << 4) | 5);
    }

    #[test]
    fn status_b_flags_and_errors() {
        let mut b = StatusB(0);
        assert!(!b.flags_raised());
        b.set_dtf(true);
        assert!(b.flags_raised());

        ErrorBit::Timing.set_in(&mut b);
        b.set_erf(true);
        assert!(b.any_error());

        b.clear_flags();
        assert_eq!(b.0, 0);
    }

    #[test]
    fn dtf_bef_distinct_bits() {
        let mut b = StatusB(0);
        b.set_bef(true);
        assert!(!b.dtf());
        assert!(b.flags_raised());
    }
}
