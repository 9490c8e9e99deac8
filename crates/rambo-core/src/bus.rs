//! The CPU-visible system bus: $0000-$FFFF address decode.
//!
//! Every defined read refreshes the open-bus latch with the byte it
//! returned, except $4015, which the hardware leaves undriven on the
//! shared bus. Reads of unmapped space return the latch.
//!
//! The bus owns the PPU, APU, cartridge, controllers, and the VBlank
//! ledger, because CPU bus cycles are where their register side effects
//! happen; the driver owns the bus.

use rambo_apu::Apu;
use rambo_cpu::Bus;
use rambo_mappers::Cartridge;
use rambo_ppu::Ppu;

use crate::input::Controller;
use crate::ledger::VblankLedger;
use crate::open_bus::OpenBus;

/// System bus and the components hanging off it.
pub struct SystemBus {
    /// 2 KiB internal RAM, mirrored 4x across $0000-$1FFF.
    pub ram: [u8; 0x0800],
    /// CPU data-bus latch.
    pub open_bus: OpenBus,
    /// Picture processing unit.
    pub ppu: Ppu,
    /// Audio processing unit.
    pub apu: Apu,
    /// Loaded cartridge, if any.
    pub cartridge: Option<Cartridge>,
    /// Controller port 1.
    pub controller1: Controller,
    /// Controller port 2.
    pub controller2: Controller,
    /// VBlank/NMI event ledger.
    pub ledger: VblankLedger,
    /// Master-cycle timestamp, refreshed by the driver every tick so
    /// register side effects record against the right cycle.
    pub master_cycle: u64,
    /// Page latched by a $4014 write; the driver turns it into an OAM DMA.
    pub oam_dma_request: Option<u8>,
    /// Test-harness RAM standing in for the cartridge region.
    cartridge_override: Option<Vec<u8>>,
}

impl SystemBus {
    /// Create a bus with no cartridge.
    #[must_use]
    pub fn new(enforce_warmup: bool) -> Self {
        Self {
            ram: [0; 0x0800],
            open_bus: OpenBus::new(),
            ppu: Ppu::new(enforce_warmup),
            apu: Apu::new(),
            cartridge: None,
            controller1: Controller::new(),
            controller2: Controller::new(),
            ledger: VblankLedger::new(),
            master_cycle: 0,
            oam_dma_request: None,
            cartridge_override: None,
        }
    }

    /// Insert a cartridge; the PPU adopts its mirroring.
    pub fn attach_cartridge(&mut self, cartridge: Cartridge) {
        self.ppu.set_mirroring(cartridge.mirroring());
        self.cartridge = Some(cartridge);
    }

    /// Install 64 KiB of flat RAM over the cartridge region ($4020-$FFFF)
    /// for tests that need writable vectors and code without a ROM image.
    pub fn install_cartridge_override(&mut self) {
        self.cartridge_override = Some(vec![0; 0x1_0000]);
    }

    /// Write a byte into the test override.
    pub fn write_override(&mut self, addr: u16, value: u8) {
        if let Some(ram) = &mut self.cartridge_override {
            ram[addr as usize] = value;
        }
    }

    /// Reset components that live on the bus.
    pub fn reset(&mut self) {
        self.ppu.reset();
        self.apu.reset();
        self.controller1.reset();
        self.controller2.reset();
        self.ledger.reset();
        self.open_bus = OpenBus::new();
        self.oam_dma_request = None;
    }

    /// The $2002 VBlank bit as a read on this cycle would see it,
    /// accounting for a set landing on this very cycle (the CPU sub-step
    /// runs before the post-cycle set is recorded).
    fn vblank_bit_visible(&self) -> bool {
        if self.ledger.is_readable_flag_set(self.master_cycle) {
            return true;
        }
        self.ppu.scanline() == 241
            && self.ppu.dot() == 1
            && !self.ledger.is_set_prevented(self.master_cycle)
    }

    fn read_ppu_register(&mut self, addr: u16) -> u8 {
        match addr & 0x07 {
            // Write-only registers float the PPU's own latch.
            0 | 1 | 3 | 5 | 6 => self.ppu.open_bus(),
            2 => {
                // A read one dot before the set point suppresses the
                // set for this frame.
                if self.ppu.scanline() == 241 && self.ppu.dot() == 0 {
                    self.ledger.arm_set_prevention(self.master_cycle + 1);
                }
                let visible = self.vblank_bit_visible();
                let base = self.ppu.read_status();
                self.ledger.record_status_read(self.master_cycle);
                (base & 0x7F) | (u8::from(visible) << 7)
            }
            4 => self.ppu.read_oam_data(),
            7 => match self.cartridge.as_ref() {
                Some(cart) => self.ppu.read_data(cart),
                None => self.open_bus.get(),
            },
            _ => unreachable!(),
        }
    }

    fn write_ppu_register(&mut self, addr: u16, value: u8) {
        match addr & 0x07 {
            0 => {
                if let Some(effect) = self.ppu.write_ctrl(value) {
                    self.ledger.record_ctrl_toggle(
                        self.master_cycle,
                        effect.old_nmi_enable,
                        effect.new_nmi_enable,
                    );
                }
            }
            1 => self.ppu.write_mask(value),
            2 => {} // PPUSTATUS is read-only
            3 => self.ppu.write_oam_addr(value),
            4 => self.ppu.write_oam_data(value),
            5 => self.ppu.write_scroll(value),
            6 => self.ppu.write_addr(value),
            7 => {
                if let Some(cart) = self.cartridge.as_mut() {
                    self.ppu.write_data(cart, value);
                }
            }
            _ => unreachable!(),
        }
    }

    fn read_cartridge_region(&self, addr: u16) -> u8 {
        if let Some(ram) = &self.cartridge_override {
            return ram[addr as usize];
        }
        self.cartridge
            .as_ref()
            .and_then(|cart| cart.cpu_read(addr))
            .unwrap_or_else(|| self.open_bus.get())
    }
}

impl Bus for SystemBus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => self.read_ppu_register(addr),
            0x4015 => {
                // Hardware quirk: this read does not drive the shared
                // bus, so the latch keeps its old value.
                return self.apu.read_status();
            }
            0x4016 => self.controller1.read() | (((addr >> 8) as u8) & 0xE0),
            0x4017 => self.controller2.read() | (((addr >> 8) as u8) & 0xE0),
            // Write-only APU/IO registers and the disabled test range.
            0x4000..=0x4014 | 0x4018..=0x401F => self.open_bus.get(),
            0x4020..=0xFFFF => self.read_cartridge_region(addr),
        };

        self.open_bus.set(value);
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.open_bus.set(value);

        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize] = value,
            0x2000..=0x3FFF => self.write_ppu_register(addr, value),
            0x4014 => self.oam_dma_request = Some(value),
            0x4016 => {
                self.controller1.write_strobe(value);
                self.controller2.write_strobe(value);
            }
            0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.write(addr, value),
            0x4018..=0x401F => {}
            0x4020..=0xFFFF => {
                if let Some(ram) = &mut self.cartridge_override {
                    ram[addr as usize] = value;
                } else if let Some(cart) = self.cartridge.as_mut() {
                    cart.cpu_write(addr, value);
                }
            }
        }
    }

    fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => match addr & 0x07 {
                2 => {
                    (self.ppu.sprite_status_bits() | (self.ppu.open_bus() & 0x1F))
                        | (u8::from(self.vblank_bit_visible()) << 7)
                }
                _ => self.ppu.open_bus(),
            },
            0x4015 => self.apu.peek_status(),
            0x4016 => self.controller1.peek() | 0x40,
            0x4017 => self.controller2.peek() | 0x40,
            0x4000..=0x4014 | 0x4018..=0x401F => self.open_bus.get(),
            0x4020..=0xFFFF => self.read_cartridge_region(addr),
        }
    }
}
