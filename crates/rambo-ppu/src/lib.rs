//! Ricoh 2C02 PPU emulation for the RAMBO NES core.
//!
//! The PPU steps one dot per master cycle. It owns the scanline/dot/frame
//! counters, nametable and palette RAM, OAM, and both rendering pipelines.
//! VBlank arbitration is deliberately *not* here: [`Ppu::step`] reports the
//! dots where VBlank events fire as [`DotEffects`] and the driver feeds
//! them into its event ledger after the CPU sub-step, so a $2002 read and
//! the flag-set racing on the same master cycle resolve the way hardware
//! resolves them.

mod background;
mod oam;
mod palette;
mod ppu;
mod registers;
mod scroll;
mod sprites;
mod timing;
mod vram;

pub use oam::{Oam, SecondaryOam};
pub use palette::PALETTE_RGBA;
pub use ppu::{CtrlWriteEffect, DotEffects, Ppu, FRAME_HEIGHT, FRAME_PIXELS, FRAME_WIDTH};
pub use registers::{PpuCtrl, PpuMask, PpuStatus};
pub use scroll::Scroll;
pub use timing::Timing;
pub use vram::Vram;
