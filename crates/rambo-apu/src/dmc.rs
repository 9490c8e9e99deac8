//! DMC (delta modulation) channel.
//!
//! The output unit shifts 1-bit deltas out of fetched sample bytes,
//! stepping a 7-bit level up or down. Sample bytes arrive through the
//! driver's DMA unit: when the buffer empties and bytes remain, the
//! channel raises a fetch request carrying the target address; the DMA
//! executes the stolen-cycle read and hands the byte back via
//! [`Dmc::load_sample`].

/// Fetch rate in CPU cycles, indexed by the 4-bit rate field (NTSC).
const RATE_TABLE: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// DMC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dmc {
    irq_enabled: bool,
    looping: bool,
    period: u16,
    timer: u16,

    /// 7-bit output level.
    output_level: u8,
    shift_register: u8,
    bits_remaining: u8,
    silence: bool,

    /// Fetched byte waiting to enter the shift register.
    sample_buffer: Option<u8>,

    /// Sample start address ($C000 + value * 64).
    sample_address: u16,
    /// Sample length in bytes (value * 16 + 1).
    sample_length: u16,
    /// Current fetch address.
    current_address: u16,
    bytes_remaining: u16,

    /// IRQ flag (cleared by $4015 write or $4010 IRQ disable).
    irq_flag: bool,
}

impl Dmc {
    /// Create a silent DMC channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            irq_enabled: false,
            looping: false,
            period: RATE_TABLE[0],
            timer: 0,
            output_level: 0,
            shift_register: 0,
            bits_remaining: 8,
            silence: true,
            sample_buffer: None,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            irq_flag: false,
        }
    }

    /// $4010: IRQ enable, loop, rate.
    pub fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0x80 != 0;
        self.looping = value & 0x40 != 0;
        self.period = RATE_TABLE[(value & 0x0F) as usize];
        if !self.irq_enabled {
            self.irq_flag = false;
        }
    }

    /// $4011: direct 7-bit load of the output level.
    pub fn write_direct_load(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    /// $4012: sample start address.
    pub fn write_sample_address(&mut self, value: u8) {
        self.sample_address = 0xC000 + u16::from(value) * 64;
    }

    /// $4013: sample length.
    pub fn write_sample_length(&mut self, value: u8) {
        self.sample_length = u16::from(value) * 16 + 1;
    }

    /// $4015 bit 4: start or stop the sample.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.bytes_remaining == 0 {
                self.restart_sample();
            }
        } else {
            self.bytes_remaining = 0;
        }
    }

    fn restart_sample(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    /// Bytes remaining in the current sample ($4015 status bit 4).
    #[must_use]
    pub fn bytes_remaining(&self) -> u16 {
        self.bytes_remaining
    }

    /// IRQ flag state.
    #[must_use]
    pub fn irq_flag(&self) -> bool {
        self.irq_flag
    }

    /// Clear the IRQ flag ($4015 write).
    pub fn clear_irq(&mut self) {
        self.irq_flag = false;
    }

    /// Address to fetch next, when the channel wants a DMA.
    ///
    /// Returns `Some(address)` while the sample buffer is empty and bytes
    /// remain; the driver's DMA unit performs the read and calls
    /// [`Dmc::load_sample`].
    #[must_use]
    pub fn pending_fetch(&self) -> Option<u16> {
        if self.sample_buffer.is_none() && self.bytes_remaining > 0 {
            Some(self.current_address)
        } else {
            None
        }
    }

    /// Deliver a fetched sample byte (DMA completion).
    pub fn load_sample(&mut self, value: u8) {
        if self.bytes_remaining == 0 {
            return;
        }
        self.sample_buffer = Some(value);

        // Address wraps from $FFFF back into the sample region.
        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };
        self.bytes_remaining -= 1;

        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart_sample();
            } else if self.irq_enabled {
                log::debug!("DMC sample exhausted, raising IRQ");
                self.irq_flag = true;
            }
        }
    }

    /// Timer clock (every CPU cycle).
    pub fn clock_timer(&mut self) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        self.timer = self.period - 1;

        // Output unit: step the level by the next delta bit.
        if !self.silence {
            if self.shift_register & 1 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift_register >>= 1;

        if self.bits_remaining > 1 {
            self.bits_remaining -= 1;
        } else {
            // New output cycle: swallow the buffer or go silent.
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(byte) => {
                    self.shift_register = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    /// Current 7-bit output level.
    #[must_use]
    pub fn output(&self) -> u8 {
        self.output_level
    }

    /// Append raw state (snapshots).
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.push(u8::from(self.irq_enabled));
        out.push(u8::from(self.looping));
        out.extend_from_slice(&self.period.to_le_bytes());
        out.extend_from_slice(&self.timer.to_le_bytes());
        out.push(self.output_level);
        out.push(self.shift_register);
        out.push(self.bits_remaining);
        out.push(u8::from(self.silence));
        match self.sample_buffer {
            Some(byte) => {
                out.push(1);
                out.push(byte);
            }
            None => {
                out.push(0);
                out.push(0);
            }
        }
        out.extend_from_slice(&self.sample_address.to_le_bytes());
        out.extend_from_slice(&self.sample_length.to_le_bytes());
        out.extend_from_slice(&self.current_address.to_le_bytes());
        out.extend_from_slice(&self.bytes_remaining.to_le_bytes());
        out.push(u8::from(self.irq_flag));
    }

    /// Restore raw state.
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        let take = |pos: &mut usize| -> Option<u8> {
            let b = *data.get(*pos)?;
            *pos += 1;
            Some(b)
        };
        self.irq_enabled = take(pos)? != 0;
        self.looping = take(pos)? != 0;
        self.period = u16::from_le_bytes([take(pos)?, take(pos)?]);
        self.timer = u16::from_le_bytes([take(pos)?, take(pos)?]);
        self.output_level = take(pos)?;
        self.shift_register = take(pos)?;
        self.bits_remaining = take(pos)?;
        self.silence = take(pos)? != 0;
        let has_buffer = take(pos)? != 0;
        let buffer_byte = take(pos)?;
        self.sample_buffer = has_buffer.then_some(buffer_byte);
        self.sample_address = u16::from_le_bytes([take(pos)?, take(pos)?]);
        self.sample_length = u16::from_le_bytes([take(pos)?, take(pos)?]);
        self.current_address = u16::from_le_bytes([take(pos)?, take(pos)?]);
        self.bytes_remaining = u16::from_le_bytes([take(pos)?, take(pos)?]);
        self.irq_flag = take(pos)? != 0;
        Some(())
    }
}

impl Default for Dmc {
    fn default() -> Self {
        Self::new()
    }
}
