//! CPU status register (P) flags.
//!
//! ```text
//! 7  6  5  4  3  2  1  0
//! N  V  U  B  D  I  Z  C
//! ```
//!
//! B is a phantom flag: it has no storage in the register itself and only
//! appears in the byte pushed to the stack: set by PHP/BRK, clear when an
//! NMI or IRQ pushes. U reads as 1 in every pushed byte.

use bitflags::bitflags;

bitflags! {
    /// CPU status register flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u8 {
        /// Carry.
        const C = 1 << 0;

        /// Zero.
        const Z = 1 << 1;

        /// Interrupt disable (gates IRQ; NMI is unaffected).
        const I = 1 << 2;

        /// Decimal mode. Storable on the NES variant, but ADC/SBC never
        /// consult it.
        const D = 1 << 3;

        /// Break: only meaningful in the pushed copy of P.
        const B = 1 << 4;

        /// Unused: always 1 when pushed.
        const U = 1 << 5;

        /// Overflow.
        const V = 1 << 6;

        /// Negative.
        const N = 1 << 7;
    }
}

impl Status {
    /// Power-on state: I and U set.
    pub const POWER_ON: Self = Self::I.union(Self::U);

    /// Create the power-on status register.
    #[must_use]
    pub const fn new() -> Self {
        Self::POWER_ON
    }

    /// Set or clear Z and N from a result byte.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.set_flag(Self::Z, value == 0);
        self.set_flag(Self::N, value & 0x80 != 0);
    }

    /// Set or clear a single flag.
    #[inline]
    pub fn set_flag(&mut self, flag: Self, value: bool) {
        if value {
            *self |= flag;
        } else {
            *self &= !flag;
        }
    }

    /// The byte pushed to the stack: U always set, B set only for PHP/BRK.
    #[inline]
    #[must_use]
    pub const fn to_stack_byte(self, brk: bool) -> u8 {
        let mut value = self.bits() | Self::U.bits();
        if brk {
            value |= Self::B.bits();
        }
        value
    }

    /// Rebuild P from a byte pulled off the stack: B discarded, U forced on.
    #[inline]
    #[must_use]
    pub fn from_stack_byte(value: u8) -> Self {
        Self::from_bits_truncate((value & !Self::B.bits()) | Self::U.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_status() {
        let status = Status::new();
        assert!(status.contains(Status::I));
        assert!(status.contains(Status::U));
        assert!(!status.contains(Status::C));
        assert!(!status.contains(Status::N));
    }

    #[test]
    fn test_set_zn() {
        let mut status = Status::empty();
        status.set_zn(0);
        assert!(status.contains(Status::Z));
        assert!(!status.contains(Status::N));

        status.set_zn(0x80);
        assert!(!status.contains(Status::Z));
        assert!(status.contains(Status::N));

        status.set_zn(0x42);
        assert!(!status.contains(Status::Z));
        assert!(!status.contains(Status::N));
    }

    #[test]
    fn test_stack_byte_brk_variants() {
        let status = Status::C | Status::Z;

        let with_b = status.to_stack_byte(true);
        assert_ne!(with_b & Status::B.bits(), 0);
        assert_ne!(with_b & Status::U.bits(), 0);

        let without_b = status.to_stack_byte(false);
        assert_eq!(without_b & Status::B.bits(), 0);
        assert_ne!(without_b & Status::U.bits(), 0);
    }

    #[test]
    fn test_from_stack_byte_discards_b() {
        let status = Status::from_stack_byte(0xFF);
        assert!(!status.contains(Status::B));
        assert!(status.contains(Status::U));
        assert!(status.contains(Status::C));
        assert!(status.contains(Status::N));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Push-then-pull preserves every flag that has storage; B is
            /// discarded on the pull and U is forced on, whatever was
            /// pushed.
            #[test]
            fn prop_stack_byte_round_trip(bits in any::<u8>(), brk in any::<bool>()) {
                let status = Status::from_bits_truncate(bits);
                let restored = Status::from_stack_byte(status.to_stack_byte(brk));

                let stored = !(Status::B | Status::U);
                prop_assert_eq!(restored & stored, status & stored);
                prop_assert!(restored.contains(Status::U));
                prop_assert!(!restored.contains(Status::B));
            }

            /// Z and N from a value are mutually exclusive and depend only
            /// on the value.
            #[test]
            fn prop_set_zn_consistent(initial in any::<u8>(), value in any::<u8>()) {
                let mut status = Status::from_bits_truncate(initial);
                status.set_zn(value);
                prop_assert_eq!(status.contains(Status::Z), value == 0);
                prop_assert_eq!(status.contains(Status::N), value & 0x80 != 0);
            }
        }
    }
}
