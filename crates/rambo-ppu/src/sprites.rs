//! Sprite evaluation and the per-scanline sprite shifters.
//!
//! Evaluation walks primary OAM during dots 65-256 looking for sprites in
//! range of the *next* scanline. After eight are found the hardware's
//! broken overflow scan takes over: the OAM byte index increments
//! diagonally (both sprite and byte-within-sprite), so the "Y" it tests is
//! usually a tile index or attribute. Games depend on the false positives
//! this produces, so the bug is reproduced exactly.

use crate::oam::{Oam, SecondaryOam};

/// Evaluation phase across a scanline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EvalPhase {
    /// Searching for up to eight in-range sprites.
    #[default]
    Scanning,
    /// Eight found: the diagonal overflow scan.
    OverflowScan,
    /// All 64 sprites considered (or overflow found).
    Done,
}

/// Incremental sprite evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteEvaluator {
    /// Sprite index (n).
    n: u8,
    /// Byte-within-sprite index (m), only advanced by the overflow bug.
    m: u8,
    phase: EvalPhase,
    overflow: bool,
}

impl SpriteEvaluator {
    /// Create an idle evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin evaluation for a new scanline (dot 65).
    pub fn start(&mut self) {
        self.n = 0;
        self.m = 0;
        self.phase = EvalPhase::Scanning;
        self.overflow = false;
    }

    /// Evaluate one sprite (called once per evaluation step during dots
    /// 65-256). `scanline` is the line being evaluated *for* (current + 1).
    pub fn step(
        &mut self,
        oam: &Oam,
        scanline: u16,
        sprite_height: u16,
        secondary: &mut SecondaryOam,
    ) {
        match self.phase {
            EvalPhase::Scanning => {
                if self.n >= 64 {
                    self.phase = EvalPhase::Done;
                    return;
                }
                let base = self.n.wrapping_mul(4);
                let y = oam.byte(base);
                if in_range(scanline, y, sprite_height) {
                    if secondary.count() < 8 {
                        secondary.push(
                            [
                                oam.byte(base),
                                oam.byte(base.wrapping_add(1)),
                                oam.byte(base.wrapping_add(2)),
                                oam.byte(base.wrapping_add(3)),
                            ],
                            self.n == 0,
                        );
                        self.n += 1;
                        if secondary.count() == 8 {
                            self.phase = EvalPhase::OverflowScan;
                        }
                    }
                } else {
                    self.n += 1;
                }
            }
            EvalPhase::OverflowScan => {
                if self.n >= 64 {
                    self.phase = EvalPhase::Done;
                    return;
                }
                // The bug: the byte tested as Y is oam[4n + m], and a miss
                // increments both n and m.
                let index = self.n.wrapping_mul(4).wrapping_add(self.m);
                let y = oam.byte(index);
                if in_range(scanline, y, sprite_height) {
                    self.overflow = true;
                    self.phase = EvalPhase::Done;
                } else {
                    self.n += 1;
                    self.m = (self.m + 1) & 0x03;
                }
            }
            EvalPhase::Done => {}
        }
    }

    /// True once the (possibly bogus) ninth in-range sprite was seen.
    #[must_use]
    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// Raw state (snapshots): n, m, phase index, overflow.
    #[must_use]
    pub fn raw(&self) -> [u8; 4] {
        let phase = match self.phase {
            EvalPhase::Scanning => 0,
            EvalPhase::OverflowScan => 1,
            EvalPhase::Done => 2,
        };
        [self.n, self.m, phase, u8::from(self.overflow)]
    }

    /// Restore from snapshot state.
    pub fn set_raw(&mut self, raw: [u8; 4]) {
        self.n = raw[0];
        self.m = raw[1];
        self.phase = match raw[2] {
            0 => EvalPhase::Scanning,
            1 => EvalPhase::OverflowScan,
            _ => EvalPhase::Done,
        };
        self.overflow = raw[3] != 0;
    }
}

#[inline]
fn in_range(scanline: u16, sprite_y: u8, height: u16) -> bool {
    let y = u16::from(sprite_y);
    scanline >= y && scanline < y + height
}

/// One of the eight per-scanline sprite shifter units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteUnit {
    /// Pattern shift registers.
    pub pattern_lo: u8,
    /// Pattern shift registers.
    pub pattern_hi: u8,
    /// Attribute byte (palette, priority, flips).
    pub attributes: u8,
    /// X counter; the unit activates when it reaches zero.
    pub x: u8,
    /// Slot is populated for this scanline.
    pub active: bool,
    /// This unit carries primary sprite 0.
    pub is_sprite_zero: bool,
}

/// The eight sprite output units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteRenderer {
    units: [SpriteUnit; 8],
}

impl SpriteRenderer {
    /// Create an empty renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivate all units (start of sprite fetch for a new scanline).
    pub fn clear(&mut self) {
        self.units = [SpriteUnit::default(); 8];
    }

    /// Load one unit with fetched pattern data.
    pub fn load(
        &mut self,
        slot: u8,
        pattern_lo: u8,
        pattern_hi: u8,
        attributes: u8,
        x: u8,
        is_sprite_zero: bool,
    ) {
        self.units[slot as usize] = SpriteUnit {
            pattern_lo,
            pattern_hi,
            attributes,
            x,
            active: true,
            is_sprite_zero,
        };
    }

    /// Advance all units one dot: count down X, then shift active ones.
    #[inline]
    pub fn tick(&mut self) {
        for unit in &mut self.units {
            if !unit.active {
                continue;
            }
            if unit.x > 0 {
                unit.x -= 1;
            } else {
                unit.pattern_lo <<= 1;
                unit.pattern_hi <<= 1;
            }
        }
    }

    /// The first opaque sprite pixel at the current dot, if any:
    /// (color index, palette select, behind-background, is-sprite-zero).
    #[inline]
    #[must_use]
    pub fn pixel(&self) -> Option<(u8, u8, bool, bool)> {
        for unit in &self.units {
            if !unit.active || unit.x > 0 {
                continue;
            }
            let color = ((unit.pattern_hi >> 7) << 1) | (unit.pattern_lo >> 7);
            if color != 0 {
                return Some((
                    color,
                    unit.attributes & 0x03,
                    unit.attributes & 0x20 != 0,
                    unit.is_sprite_zero,
                ));
            }
        }
        None
    }

    /// Direct unit access for snapshots.
    #[must_use]
    pub fn units(&self) -> &[SpriteUnit; 8] {
        &self.units
    }

    /// Restore units (snapshot restore).
    pub fn set_units(&mut self, units: [SpriteUnit; 8]) {
        self.units = units;
    }
}
