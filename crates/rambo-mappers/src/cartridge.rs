//! Tagged-enum cartridge dispatch.
//!
//! The cartridge region is the hottest indirection in the whole core: the
//! CPU reads through it every instruction fetch and the PPU reads through
//! it four times per background tile. Dispatch is therefore a match on an
//! enum discriminant rather than a virtual call, so each mapper's accessors
//! inline into the bus.

use crate::{Mirroring, Nrom, Rom, RomError};

/// A loaded cartridge, tagged by mapper.
///
/// Adding mapper support means adding a variant here plus arms in the five
/// match expressions below. Nothing outside this module changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cartridge {
    /// Mapper 0 (NROM).
    Nrom(Nrom),
}

impl Cartridge {
    /// Build a cartridge from a parsed ROM.
    ///
    /// # Errors
    ///
    /// Returns [`RomError::UnsupportedMapper`] when the header names a
    /// mapper this core does not implement.
    pub fn from_rom(rom: &Rom) -> Result<Self, RomError> {
        match rom.header.mapper_number {
            0 => Ok(Self::Nrom(Nrom::new(rom))),
            n => {
                log::warn!("refusing ROM with unimplemented mapper {n}");
                Err(RomError::UnsupportedMapper(n))
            }
        }
    }

    /// Parse a raw ROM image and build a cartridge in one step.
    ///
    /// # Errors
    ///
    /// Propagates header/size errors from [`Rom::load`] and the
    /// unsupported-mapper error from [`Cartridge::from_rom`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, RomError> {
        let rom = Rom::load(data)?;
        Self::from_rom(&rom)
    }

    /// Read from the CPU address space ($4020-$FFFF).
    ///
    /// `None` means the address is unmapped on this board and the bus
    /// should return its open-bus latch.
    #[inline]
    #[must_use]
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        match self {
            Self::Nrom(nrom) => nrom.cpu_read(addr),
        }
    }

    /// Write to the CPU address space ($4020-$FFFF).
    #[inline]
    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        match self {
            Self::Nrom(nrom) => nrom.cpu_write(addr, value),
        }
    }

    /// Read CHR memory (PPU $0000-$1FFF).
    #[inline]
    #[must_use]
    pub fn ppu_read(&self, addr: u16) -> u8 {
        match self {
            Self::Nrom(nrom) => nrom.ppu_read(addr),
        }
    }

    /// Write CHR memory (PPU $0000-$1FFF).
    #[inline]
    pub fn ppu_write(&mut self, addr: u16, value: u8) {
        match self {
            Self::Nrom(nrom) => nrom.ppu_write(addr, value),
        }
    }

    /// Nametable mirroring mode.
    #[inline]
    #[must_use]
    pub fn mirroring(&self) -> Mirroring {
        match self {
            Self::Nrom(nrom) => nrom.mirroring(),
        }
    }

    /// iNES mapper number.
    #[must_use]
    pub fn mapper_number(&self) -> u16 {
        match self {
            Self::Nrom(_) => 0,
        }
    }

    /// Level-triggered IRQ line from the mapper (none of the supported
    /// boards generate one yet).
    #[inline]
    #[must_use]
    pub fn irq_line(&self) -> bool {
        match self {
            Self::Nrom(_) => false,
        }
    }
}
