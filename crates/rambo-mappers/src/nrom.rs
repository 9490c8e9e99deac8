//! Mapper 0: NROM.
//!
//! No bank switching. 16 KiB PRG ROM mirrored across $8000-$FFFF, or 32 KiB
//! mapped flat. 8 KiB of PRG RAM is always present at $6000-$7FFF
//! regardless of what the header claims, since commercial NROM boards with
//! work RAM exist and the header byte is unreliable. CHR is an 8 KiB ROM or
//! an 8 KiB RAM.

use crate::{Mirroring, Rom};

/// NROM mapper state (Mapper 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nrom {
    /// PRG-ROM data (16 KiB or 32 KiB).
    prg_rom: Vec<u8>,

    /// PRG-RAM at $6000-$7FFF, always allocated and zero-initialized.
    prg_ram: Vec<u8>,

    /// CHR data (ROM image or zero-initialized RAM).
    chr: Vec<u8>,

    /// True if `chr` is writable RAM.
    chr_writable: bool,

    /// Nametable mirroring mode, fixed by the header.
    mirroring: Mirroring,
}

impl Nrom {
    /// Size of the always-present PRG RAM.
    const PRG_RAM_SIZE: usize = 8192;

    /// Build an NROM cartridge from a parsed ROM.
    ///
    /// A 512-byte trainer, when present, is installed at $7000 in PRG RAM
    /// the way the original loaders placed it.
    #[must_use]
    pub fn new(rom: &Rom) -> Self {
        let chr_writable = rom.chr_rom.is_empty();
        let chr = if chr_writable {
            vec![0; 8192]
        } else {
            rom.chr_rom.clone()
        };

        let mut prg_ram = vec![0; Self::PRG_RAM_SIZE];
        if let Some(trainer) = &rom.trainer {
            prg_ram[0x1000..0x1000 + trainer.len()].copy_from_slice(trainer);
        }

        Self {
            prg_rom: rom.prg_rom.clone(),
            prg_ram,
            chr,
            chr_writable,
            mirroring: rom.header.mirroring,
        }
    }

    /// Read from the CPU address space ($4020-$FFFF).
    ///
    /// Returns `None` for the unmapped $4020-$5FFF region so the bus can
    /// substitute the open-bus latch.
    #[inline]
    #[must_use]
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        match addr {
            0x6000..=0x7FFF => Some(self.prg_ram[(addr - 0x6000) as usize]),
            0x8000..=0xFFFF => {
                let offset = (addr - 0x8000) as usize;
                // A single 16 KiB bank is mirrored to fill the 32 KiB window.
                let masked = if self.prg_rom.len() == 16384 {
                    offset & 0x3FFF
                } else {
                    offset
                };
                Some(self.prg_rom[masked])
            }
            _ => None,
        }
    }

    /// Write to the CPU address space. PRG ROM writes are ignored.
    #[inline]
    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        if let 0x6000..=0x7FFF = addr {
            self.prg_ram[(addr - 0x6000) as usize] = value;
        }
    }

    /// Read CHR memory (PPU $0000-$1FFF).
    #[inline]
    #[must_use]
    pub fn ppu_read(&self, addr: u16) -> u8 {
        self.chr[(addr & 0x1FFF) as usize]
    }

    /// Write CHR memory. Ignored for CHR ROM.
    #[inline]
    pub fn ppu_write(&mut self, addr: u16, value: u8) {
        if self.chr_writable {
            self.chr[(addr & 0x1FFF) as usize] = value;
        }
    }

    /// Nametable mirroring mode.
    #[inline]
    #[must_use]
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    /// PRG-ROM size in bytes.
    #[must_use]
    pub fn prg_size(&self) -> usize {
        self.prg_rom.len()
    }

    /// True if the cartridge carries CHR RAM rather than CHR ROM.
    #[must_use]
    pub fn has_chr_ram(&self) -> bool {
        self.chr_writable
    }

    /// Borrow the PRG RAM (for snapshots).
    #[must_use]
    pub fn prg_ram(&self) -> &[u8] {
        &self.prg_ram
    }

    /// Replace the PRG RAM contents (for snapshot restore).
    pub fn set_prg_ram(&mut self, data: &[u8]) {
        self.prg_ram.copy_from_slice(data);
    }

    /// Borrow the CHR memory (for snapshots).
    #[must_use]
    pub fn chr(&self) -> &[u8] {
        &self.chr
    }

    /// Replace CHR contents (for snapshot restore; only meaningful for CHR RAM).
    pub fn set_chr(&mut self, data: &[u8]) {
        if self.chr_writable {
            self.chr.copy_from_slice(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RomHeader;

    fn create_test_rom(prg_size: usize, chr_size: usize, mirroring: Mirroring) -> Rom {
        Rom {
            header: RomHeader {
                prg_rom_size: prg_size,
                chr_rom_size: chr_size,
                mapper_number: 0,
                submapper: 0,
                mirroring,
                has_battery: false,
                has_trainer: false,
                nes2_format: false,
            },
            trainer: None,
            prg_rom: vec![0; prg_size],
            chr_rom: if chr_size > 0 {
                vec![0; chr_size]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn test_nrom_256_flat() {
        let mut rom = create_test_rom(32768, 8192, Mirroring::Horizontal);
        rom.prg_rom[0x0000] = 0x42;
        rom.prg_rom[0x7FFF] = 0x55;

        let nrom = Nrom::new(&rom);
        assert_eq!(nrom.cpu_read(0x8000), Some(0x42));
        assert_eq!(nrom.cpu_read(0xFFFF), Some(0x55));
    }

    #[test]
    fn test_nrom_128_mirroring() {
        let mut rom = create_test_rom(16384, 8192, Mirroring::Vertical);
        rom.prg_rom[0x0000] = 0x42;
        rom.prg_rom[0x3FFF] = 0x55;

        let nrom = Nrom::new(&rom);
        assert_eq!(nrom.cpu_read(0x8000), Some(0x42));
        assert_eq!(nrom.cpu_read(0xBFFF), Some(0x55));
        // Mirrored upper bank
        assert_eq!(nrom.cpu_read(0xC000), Some(0x42));
        assert_eq!(nrom.cpu_read(0xFFFF), Some(0x55));
    }

    #[test]
    fn test_prg_ram_always_present() {
        let rom = create_test_rom(16384, 8192, Mirroring::Horizontal);
        let mut nrom = Nrom::new(&rom);

        // Zero-initialized regardless of header
        assert_eq!(nrom.cpu_read(0x6000), Some(0));

        nrom.cpu_write(0x6000, 0xAB);
        nrom.cpu_write(0x7FFF, 0xCD);
        assert_eq!(nrom.cpu_read(0x6000), Some(0xAB));
        assert_eq!(nrom.cpu_read(0x7FFF), Some(0xCD));
    }

    #[test]
    fn test_unmapped_region_is_open_bus() {
        let rom = create_test_rom(16384, 8192, Mirroring::Horizontal);
        let nrom = Nrom::new(&rom);
        assert_eq!(nrom.cpu_read(0x4020), None);
        assert_eq!(nrom.cpu_read(0x5FFF), None);
    }

    #[test]
    fn test_prg_rom_write_ignored() {
        let mut rom = create_test_rom(32768, 8192, Mirroring::Horizontal);
        rom.prg_rom[0] = 0xAA;
        let mut nrom = Nrom::new(&rom);

        nrom.cpu_write(0x8000, 0x42);
        assert_eq!(nrom.cpu_read(0x8000), Some(0xAA));
    }

    #[test]
    fn test_chr_rom_read_write() {
        let mut rom = create_test_rom(16384, 8192, Mirroring::Horizontal);
        rom.chr_rom[0x0000] = 0xAA;
        rom.chr_rom[0x1FFF] = 0xBB;

        let mut nrom = Nrom::new(&rom);
        assert_eq!(nrom.ppu_read(0x0000), 0xAA);
        assert_eq!(nrom.ppu_read(0x1FFF), 0xBB);

        // CHR ROM writes are ignored
        nrom.ppu_write(0x0000, 0x42);
        assert_eq!(nrom.ppu_read(0x0000), 0xAA);
    }

    #[test]
    fn test_chr_ram_read_write() {
        let rom = create_test_rom(16384, 0, Mirroring::Horizontal);
        let mut nrom = Nrom::new(&rom);
        assert!(nrom.has_chr_ram());

        nrom.ppu_write(0x0000, 0x42);
        nrom.ppu_write(0x1FFF, 0x55);
        assert_eq!(nrom.ppu_read(0x0000), 0x42);
        assert_eq!(nrom.ppu_read(0x1FFF), 0x55);
    }

    #[test]
    fn test_trainer_installed_at_7000() {
        let mut rom = create_test_rom(16384, 8192, Mirroring::Horizontal);
        rom.header.has_trainer = true;
        rom.trainer = Some(vec![0x5A; 512]);

        let nrom = Nrom::new(&rom);
        assert_eq!(nrom.cpu_read(0x7000), Some(0x5A));
        assert_eq!(nrom.cpu_read(0x71FF), Some(0x5A));
        assert_eq!(nrom.cpu_read(0x7200), Some(0x00));
    }
}
