//! Nametable mirroring.
//!
//! The PPU address space has four logical 1 KiB nametables at $2000-$2FFF
//! but the console only has 2 KiB of nametable RAM. The cartridge decides
//! how the four logical tables fold onto the physical banks; four-screen
//! carts supply two extra banks of their own.

/// Nametable mirroring mode, fixed by the cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirroring {
    /// Horizontal mirroring (vertical arrangement): $2000/$2400 share,
    /// $2800/$2C00 share.
    #[default]
    Horizontal,
    /// Vertical mirroring (horizontal arrangement): $2000/$2800 share,
    /// $2400/$2C00 share.
    Vertical,
    /// Four distinct nametables (extra RAM on the cartridge).
    FourScreen,
}

impl Mirroring {
    /// Fold a nametable address ($2000-$2FFF, pre-masked to 12 bits) into
    /// an index into nametable RAM.
    ///
    /// Horizontal and vertical produce indices 0-$7FF; four-screen produces
    /// 0-$FFF and the caller must have 4 KiB backing.
    #[inline]
    #[must_use]
    pub fn nametable_index(self, addr: u16) -> usize {
        let addr = addr & 0x0FFF;
        match self {
            // Bit 11 selects the physical bank; $2000/$2400 collapse.
            Self::Horizontal => {
                let bank = (addr >> 11) & 1;
                let offset = addr & 0x03FF;
                (bank << 10 | offset) as usize
            }
            // Bit 10 selects the physical bank; $2000/$2800 collapse.
            Self::Vertical => {
                let bank = (addr >> 10) & 1;
                let offset = addr & 0x03FF;
                (bank << 10 | offset) as usize
            }
            Self::FourScreen => addr as usize,
        }
    }

    /// Bytes of nametable RAM this mode requires.
    #[inline]
    #[must_use]
    pub const fn nametable_ram_size(self) -> usize {
        match self {
            Self::Horizontal | Self::Vertical => 0x0800,
            Self::FourScreen => 0x1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_pairs() {
        let m = Mirroring::Horizontal;
        // $2000 and $2400 share the first bank
        assert_eq!(m.nametable_index(0x2000), m.nametable_index(0x2400));
        // $2800 and $2C00 share the second bank
        assert_eq!(m.nametable_index(0x2800), m.nametable_index(0x2C00));
        assert_ne!(m.nametable_index(0x2000), m.nametable_index(0x2800));
    }

    #[test]
    fn test_vertical_pairs() {
        let m = Mirroring::Vertical;
        assert_eq!(m.nametable_index(0x2000), m.nametable_index(0x2800));
        assert_eq!(m.nametable_index(0x2400), m.nametable_index(0x2C00));
        assert_ne!(m.nametable_index(0x2000), m.nametable_index(0x2400));
    }

    #[test]
    fn test_four_screen_distinct() {
        let m = Mirroring::FourScreen;
        let indices = [
            m.nametable_index(0x2000),
            m.nametable_index(0x2400),
            m.nametable_index(0x2800),
            m.nametable_index(0x2C00),
        ];
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(indices[i], indices[j]);
            }
        }
        assert_eq!(m.nametable_ram_size(), 0x1000);
    }

    #[test]
    fn test_offset_preserved() {
        assert_eq!(Mirroring::Horizontal.nametable_index(0x2123), 0x123);
        assert_eq!(Mirroring::Vertical.nametable_index(0x2423), 0x423);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Every nametable address folds to an index inside the RAM
            /// the mode declares, with the in-table offset untouched.
            #[test]
            fn prop_index_in_range_with_offset_kept(addr in 0x2000u16..0x3000) {
                for mode in [
                    Mirroring::Horizontal,
                    Mirroring::Vertical,
                    Mirroring::FourScreen,
                ] {
                    let index = mode.nametable_index(addr);
                    prop_assert!(index < mode.nametable_ram_size());
                    prop_assert_eq!(index & 0x3FF, usize::from(addr & 0x3FF));
                }
            }

            /// The two-screen modes fold their mirror pairs to the same
            /// physical bank for any in-table offset.
            #[test]
            fn prop_mirror_pairs_collapse(offset in 0u16..0x400) {
                let h = Mirroring::Horizontal;
                prop_assert_eq!(
                    h.nametable_index(0x2000 + offset),
                    h.nametable_index(0x2400 + offset)
                );
                let v = Mirroring::Vertical;
                prop_assert_eq!(
                    v.nametable_index(0x2000 + offset),
                    v.nametable_index(0x2800 + offset)
                );
            }
        }
    }
}
