//! NES ROM file format parsing (iNES and NES 2.0).
//!
//! The 16-byte header is followed by an optional 512-byte trainer, then
//! PRG ROM and CHR ROM. A CHR size of zero means the cartridge carries
//! CHR RAM instead.

use crate::Mirroring;

/// Errors that can occur when parsing NES ROM files.
#[derive(Debug, thiserror::Error)]
pub enum RomError {
    /// ROM file is too small to contain a valid header.
    #[error("ROM file too small: expected at least 16 bytes, got {0}")]
    FileTooSmall(usize),

    /// Invalid iNES magic number in header.
    #[error("invalid iNES magic number: expected [4E 45 53 1A], got {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// PRG-ROM size field is zero.
    #[error("PRG-ROM size cannot be 0")]
    ZeroPrgRomSize,

    /// ROM file size doesn't match header specifications.
    #[error("ROM file size mismatch: expected {expected} bytes, got {actual} bytes")]
    FileSizeMismatch {
        /// Expected file size in bytes.
        expected: usize,
        /// Actual file size in bytes.
        actual: usize,
    },

    /// Header declares a format revision this core does not read.
    #[error("unsupported ROM format revision")]
    UnsupportedVersion,

    /// Mapper number with no implementation in this core.
    #[error("unsupported mapper: {0}")]
    UnsupportedMapper(u16),
}

/// iNES/NES 2.0 ROM header.
///
/// ```text
/// Byte 0-3:   Magic "NES" + MS-DOS EOF (0x4E 0x45 0x53 0x1A)
/// Byte 4:     PRG-ROM size in 16 KiB units (LSB in NES 2.0)
/// Byte 5:     CHR-ROM size in 8 KiB units (LSB in NES 2.0; 0 = CHR RAM)
/// Byte 6:     mirroring, battery, trainer, four-screen, mapper low nibble
/// Byte 7:     console type, NES 2.0 identifier (bits 2-3 == 10), mapper high nibble
/// Byte 8:     mapper MSB + submapper (NES 2.0)
/// Byte 9:     PRG/CHR size MSBs (NES 2.0)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    /// PRG-ROM size in bytes.
    pub prg_rom_size: usize,

    /// CHR-ROM size in bytes (0 indicates CHR RAM).
    pub chr_rom_size: usize,

    /// Mapper number (0-4095 for NES 2.0, 0-255 for iNES 1.0).
    pub mapper_number: u16,

    /// Submapper number (0-15, NES 2.0 only).
    pub submapper: u8,

    /// Nametable mirroring mode.
    pub mirroring: Mirroring,

    /// Battery-backed PRG-RAM present.
    pub has_battery: bool,

    /// 512-byte trainer present before PRG-ROM.
    pub has_trainer: bool,

    /// True if this is NES 2.0 format.
    pub nes2_format: bool,
}

/// PRG-ROM bank granularity (byte 4 counts these).
const PRG_BANK: usize = 16 * 1024;
/// CHR-ROM bank granularity (byte 5 counts these).
const CHR_BANK: usize = 8 * 1024;

impl RomHeader {
    /// iNES magic number: "NES" followed by MS-DOS EOF.
    const MAGIC: [u8; 4] = [0x4E, 0x45, 0x53, 0x1A];

    /// Parse a ROM header from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is shorter than 16 bytes, the magic is
    /// wrong, the format revision is unreadable, or the PRG size is zero.
    pub fn parse(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < 16 {
            return Err(RomError::FileTooSmall(data.len()));
        }

        let magic = [data[0], data[1], data[2], data[3]];
        if magic != Self::MAGIC {
            return Err(RomError::InvalidMagic(magic));
        }

        // Byte 7 bits 2-3: 10 = NES 2.0, 00 = iNES 1.0, 01/11 = archaic
        // variants this core does not read.
        let nes2_format = match (data[7] >> 2) & 0x03 {
            0b00 => false,
            0b10 => true,
            _ => return Err(RomError::UnsupportedVersion),
        };

        let (mapper_number, submapper) = mapper_fields(data, nes2_format);

        // NES 2.0 widens each bank count with a nibble from byte 9;
        // plain iNES leaves those nibbles as zero.
        let (prg_extra, chr_extra) = if nes2_format {
            (data[9] & 0x0F, data[9] >> 4)
        } else {
            (0, 0)
        };
        let prg_rom_size = rom_area_size(data[4], prg_extra, PRG_BANK);
        if prg_rom_size == 0 {
            return Err(RomError::ZeroPrgRomSize);
        }
        let chr_rom_size = rom_area_size(data[5], chr_extra, CHR_BANK);

        let mirroring = match (data[6] & 0x08 != 0, data[6] & 0x01 != 0) {
            (true, _) => Mirroring::FourScreen,
            (false, true) => Mirroring::Vertical,
            (false, false) => Mirroring::Horizontal,
        };

        Ok(Self {
            prg_rom_size,
            chr_rom_size,
            mapper_number,
            submapper,
            mirroring,
            has_battery: (data[6] & 0x02) != 0,
            has_trainer: (data[6] & 0x04) != 0,
            nes2_format,
        })
    }
}

/// Mapper number and submapper from flag bytes 6-8.
///
/// Both formats spread the mapper across the upper nibbles of bytes 6 and
/// 7; NES 2.0 adds four more bits and the submapper in byte 8.
fn mapper_fields(data: &[u8], nes2: bool) -> (u16, u8) {
    let mut mapper = u16::from(data[6] >> 4) | (u16::from(data[7] >> 4) << 4);
    if !nes2 {
        return (mapper, 0);
    }
    mapper |= u16::from(data[8] & 0x0F) << 8;
    (mapper, data[8] >> 4)
}

/// Size in bytes of one ROM area from its bank-count field.
///
/// `count` is the iNES bank count byte; `extra` is the NES 2.0 widening
/// nibble (zero for iNES). An `extra` of $F repurposes `count` as
/// exponent notation: an odd multiplier in the low two bits scaling a
/// power of two from the rest.
fn rom_area_size(count: u8, extra: u8, bank_bytes: usize) -> usize {
    if extra == 0x0F {
        let multiplier = usize::from(count & 0x03) * 2 + 1;
        return multiplier << (count >> 2);
    }
    ((usize::from(extra) << 8) | usize::from(count)) * bank_bytes
}

/// Parsed NES ROM file.
#[derive(Debug, Clone)]
pub struct Rom {
    /// ROM header information.
    pub header: RomHeader,

    /// 512-byte trainer data (if present).
    pub trainer: Option<Vec<u8>>,

    /// PRG-ROM data (program code).
    pub prg_rom: Vec<u8>,

    /// CHR-ROM data (graphics), or empty if CHR RAM.
    pub chr_rom: Vec<u8>,
}

impl Rom {
    /// Load a ROM from raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or the file is shorter
    /// than the sizes the header declares.
    pub fn load(data: &[u8]) -> Result<Self, RomError> {
        let header = RomHeader::parse(data)?;

        // Validate the whole layout up front, then slice it apart.
        let trainer_len = if header.has_trainer { 512 } else { 0 };
        let expected = 16 + trainer_len + header.prg_rom_size + header.chr_rom_size;
        if data.len() < expected {
            return Err(RomError::FileSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut cursor = 16;
        let mut section = |len: usize| {
            let bytes = data[cursor..cursor + len].to_vec();
            cursor += len;
            bytes
        };

        let trainer = header.has_trainer.then(|| section(512));
        let prg_rom = section(header.prg_rom_size);
        let chr_rom = section(header.chr_rom_size);

        Ok(Self {
            header,
            trainer,
            prg_rom,
            chr_rom,
        })
    }
}
