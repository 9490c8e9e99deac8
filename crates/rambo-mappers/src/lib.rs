//! Cartridge handling for the RAMBO NES core.
//!
//! This crate parses iNES / NES 2.0 ROM images and exposes the parsed
//! cartridge behind a tagged [`Cartridge`] enum. Every CPU or PPU access to
//! the cartridge region goes through a pattern match on that enum, so mapper
//! dispatch compiles down to a jump on the discriminant with every arm
//! inlinable. Adding a mapper is a new variant plus match arms here; the
//! CPU, PPU, and bus never change.

mod cartridge;
mod mirroring;
mod nrom;
mod rom;

pub use cartridge::Cartridge;
pub use mirroring::Mirroring;
pub use nrom::Nrom;
pub use rom::{Rom, RomError, RomHeader};
