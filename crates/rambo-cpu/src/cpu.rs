//! 6502 CPU core: registers, the per-cycle state machine, and interrupts.
//!
//! [`Cpu::tick`] advances exactly one bus cycle. The driver calls it only
//! on master cycles where the clock says the CPU runs, so the CPU has no
//! cycle counter of its own; derived CPU time lives on the master clock.
//!
//! Interrupts: NMI is edge-triggered (the line is sampled every tick and a
//! 0-to-1 transition latches), IRQ is level-triggered and gated by the I
//! flag with the one-instruction latency of I-flag changes. A BRK or IRQ
//! sequence that sees the NMI latch before its vector fetch is hijacked
//! onto the NMI vector.

use crate::addressing::AddressingMode;
use crate::bus::Bus;
use crate::instructions;
use crate::opcodes::{Mnemonic, OPCODE_TABLE};
use crate::state::{ExecState, InstructionKind};
use crate::status::Status;

/// NMI vector address.
pub const NMI_VECTOR: u16 = 0xFFFA;
/// RESET vector address.
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector address.
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// NES 6502 CPU.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)] // hardware lines and latches are bools
pub struct Cpu {
    /// Accumulator.
    pub a: u8,
    /// X index register.
    pub x: u8,
    /// Y index register.
    pub y: u8,
    /// Program counter.
    pub pc: u16,
    /// Stack pointer (offset into page $01).
    pub sp: u8,
    /// Status flags.
    pub status: Status,
    /// CPU jammed by a KIL opcode; only reset recovers.
    pub halted: bool,

    // ===== Interrupt lines and latches =====
    /// Current NMI line level (driven by the VBlank arbitration).
    nmi_line: bool,
    /// Edge latch: set on a 0->1 NMI line transition, cleared when serviced.
    nmi_edge_latched: bool,
    /// Current IRQ line level (APU frame, DMC, cartridge).
    irq_line: bool,
    /// I flag sampled at the previous instruction boundary; IRQ polling
    /// uses this to model the one-instruction CLI/SEI/PLP latency.
    prev_irq_inhibit: bool,
    /// Set when an NMI sequence begins; the driver takes it to acknowledge
    /// the ledger.
    nmi_ack: bool,

    // ===== Per-instruction execution state =====
    state: ExecState,
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    kind: InstructionKind,
    /// Bus-cycle index within the current instruction (0 = opcode fetch).
    instruction_cycle: u8,
    operand_lo: u8,
    operand_hi: u8,
    /// Zero-page or indirect pointer under construction.
    pointer: u16,
    /// Pre-index base address, kept for page-cross fixup reads.
    base_addr: u16,
    effective_addr: u16,
    page_crossed: bool,
    /// RMW original value / read temporary.
    temp: u8,
    branch_offset: i8,
    /// Vector the in-flight interrupt sequence will fetch (hijackable).
    interrupt_vector: u16,
    /// True when the in-flight sequence is BRK (B set in the pushed P).
    interrupt_is_brk: bool,
}

impl Cpu {
    /// Create a CPU in power-on state.
    ///
    /// SP is $FD (as if RESET already pulled three bytes), P is I+U, and
    /// PC is zero until [`Cpu::reset`] fetches the vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFD,
            status: Status::POWER_ON,
            halted: false,
            nmi_line: false,
            nmi_edge_latched: false,
            irq_line: false,
            prev_irq_inhibit: true,
            nmi_ack: false,
            state: ExecState::FetchOpcode,
            opcode: 0,
            mnemonic: Mnemonic::Nop,
            mode: AddressingMode::Implied,
            kind: InstructionKind::Implied,
            instruction_cycle: 0,
            operand_lo: 0,
            operand_hi: 0,
            pointer: 0,
            base_addr: 0,
            effective_addr: 0,
            page_crossed: false,
            temp: 0,
            branch_offset: 0,
            interrupt_vector: 0,
            interrupt_is_brk: false,
        }
    }

    /// Run the RESET sequence: SP drops by 3 without stack writes, I is
    /// set, PC loads from $FFFC.
    pub fn reset(&mut self, bus: &mut impl Bus) {
        self.sp = self.sp.wrapping_sub(3);
        self.status.insert(Status::I);
        self.pc = bus.read_u16(RESET_VECTOR);
        self.halted = false;
        self.nmi_line = false;
        self.nmi_edge_latched = false;
        self.irq_line = false;
        self.prev_irq_inhibit = true;
        self.nmi_ack = false;
        self.state = ExecState::FetchOpcode;
        self.instruction_cycle = 0;
    }

    /// Drive the NMI line level. A 0->1 transition latches the edge.
    #[inline]
    pub fn set_nmi_line(&mut self, level: bool) {
        if level && !self.nmi_line {
            self.nmi_edge_latched = true;
        }
        self.nmi_line = level;
    }

    /// Drive the IRQ line level (level-triggered).
    #[inline]
    pub fn set_irq_line(&mut self, level: bool) {
        self.irq_line = level;
    }

    /// True while an NMI edge is latched and unserviced.
    #[must_use]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_edge_latched
    }

    /// Take the NMI-serviced marker (set when an NMI sequence begins).
    pub fn take_nmi_ack(&mut self) -> bool {
        core::mem::take(&mut self.nmi_ack)
    }

    /// True at an instruction boundary (next tick fetches an opcode).
    #[must_use]
    pub fn at_instruction_boundary(&self) -> bool {
        self.state == ExecState::FetchOpcode
    }

    /// Bus-cycle index within the current instruction.
    #[must_use]
    pub fn instruction_cycle(&self) -> u8 {
        self.instruction_cycle
    }

    /// Execute exactly one bus cycle.
    ///
    /// Returns true when the cycle completed an instruction (the next tick
    /// will poll interrupts and fetch an opcode). A jammed CPU consumes the
    /// cycle without bus traffic and never completes.
    pub fn tick(&mut self, bus: &mut impl Bus) -> bool {
        if self.halted {
            return false;
        }

        self.instruction_cycle = self.instruction_cycle.wrapping_add(1);

        let done = match self.state {
            ExecState::FetchOpcode => self.tick_fetch_opcode(bus),
            ExecState::FetchOperandLo => self.tick_fetch_operand_lo(bus),
            ExecState::FetchOperandHi => self.tick_fetch_operand_hi(bus),
            ExecState::IndexZeroPage => self.tick_index_zero_page(bus),
            ExecState::IndexFixup => self.tick_index_fixup(bus),
            ExecState::FetchPointerLo => self.tick_fetch_pointer_lo(bus),
            ExecState::FetchPointerHi => self.tick_fetch_pointer_hi(bus),
            ExecState::ReadData => self.tick_read_data(bus),
            ExecState::WriteData => self.tick_write_data(bus),
            ExecState::RmwRead => self.tick_rmw_read(bus),
            ExecState::RmwDummyWrite => self.tick_rmw_dummy_write(bus),
            ExecState::RmwWrite => self.tick_rmw_write(bus),
            ExecState::ImpliedExecute => self.tick_implied_execute(bus),
            ExecState::BranchTaken => self.tick_branch_taken(bus),
            ExecState::BranchFixup => self.tick_branch_fixup(bus),
            ExecState::DummyFetch => self.tick_dummy_fetch(bus),
            ExecState::StackDummy => self.tick_stack_dummy(bus),
            ExecState::PushData => self.tick_push_data(bus),
            ExecState::PullData => self.tick_pull_data(bus),
            ExecState::JsrInternal => self.tick_jsr_internal(bus),
            ExecState::JsrPushPcHi => self.tick_jsr_push_pc_hi(bus),
            ExecState::JsrPushPcLo => self.tick_jsr_push_pc_lo(bus),
            ExecState::JsrFetchHi => self.tick_jsr_fetch_hi(bus),
            ExecState::RtsPopPcLo => self.tick_rts_pop_pc_lo(bus),
            ExecState::RtsPopPcHi => self.tick_rts_pop_pc_hi(bus),
            ExecState::RtsIncrement => self.tick_rts_increment(bus),
            ExecState::RtiPopStatus => self.tick_rti_pop_status(bus),
            ExecState::RtiPopPcLo => self.tick_rti_pop_pc_lo(bus),
            ExecState::RtiPopPcHi => self.tick_rti_pop_pc_hi(bus),
            ExecState::BrkPadding => self.tick_brk_padding(bus),
            ExecState::InterruptDummy => self.tick_interrupt_dummy(bus),
            ExecState::InterruptPushPcHi => self.tick_interrupt_push_pc_hi(bus),
            ExecState::InterruptPushPcLo => self.tick_interrupt_push_pc_lo(bus),
            ExecState::InterruptPushStatus => self.tick_interrupt_push_status(bus),
            ExecState::InterruptFetchVectorLo => self.tick_interrupt_fetch_vector_lo(bus),
            ExecState::InterruptFetchVectorHi => self.tick_interrupt_fetch_vector_hi(bus),
        };

        if done {
            self.instruction_cycle = 0;
        }
        done
    }

    // =====================================================================
    // Stack helpers
    // =====================================================================

    #[inline]
    fn push(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    #[inline]
    fn pop(&mut self, bus: &mut impl Bus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | u16::from(self.sp))
    }

    #[inline]
    fn next_state_by_kind(&self) -> ExecState {
        match self.kind {
            InstructionKind::Write => ExecState::WriteData,
            InstructionKind::ReadModifyWrite => ExecState::RmwRead,
            _ => ExecState::ReadData,
        }
    }

    // =====================================================================
    // Fetch and decode
    // =====================================================================

    fn tick_fetch_opcode(&mut self, bus: &mut impl Bus) -> bool {
        let current_inhibit = self.status.contains(Status::I);

        // NMI first: unaffected by I.
        if self.nmi_edge_latched {
            self.nmi_edge_latched = false;
            self.nmi_ack = true;
            self.prev_irq_inhibit = true;
            self.interrupt_vector = NMI_VECTOR;
            self.interrupt_is_brk = false;
            let _ = bus.read(self.pc);
            self.state = ExecState::InterruptDummy;
            return false;
        }

        // IRQ uses the I flag from the previous boundary (CLI/SEI latency).
        if self.irq_line && !self.prev_irq_inhibit {
            self.prev_irq_inhibit = true;
            self.interrupt_vector = IRQ_VECTOR;
            self.interrupt_is_brk = false;
            let _ = bus.read(self.pc);
            self.state = ExecState::InterruptDummy;
            return false;
        }

        self.prev_irq_inhibit = current_inhibit;

        self.opcode = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        let info = OPCODE_TABLE[self.opcode as usize];
        self.mnemonic = info.mnemonic;
        self.mode = info.mode;
        self.kind = info.mnemonic.kind(info.mode);

        self.operand_lo = 0;
        self.operand_hi = 0;
        self.pointer = 0;
        self.base_addr = 0;
        self.effective_addr = 0;
        self.page_crossed = false;
        self.temp = 0;
        self.branch_offset = 0;

        self.state = match self.kind {
            InstructionKind::Implied
            | InstructionKind::Accumulator
            | InstructionKind::Jam => ExecState::ImpliedExecute,
            InstructionKind::Push | InstructionKind::Pull
            | InstructionKind::ReturnSubroutine
            | InstructionKind::ReturnInterrupt => ExecState::DummyFetch,
            InstructionKind::Break => ExecState::BrkPadding,
            _ => ExecState::FetchOperandLo,
        };
        false
    }

    fn tick_fetch_operand_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_lo = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        match self.mode {
            AddressingMode::Immediate => {
                // Execute against the fetched byte; two-cycle instruction.
                let mnemonic = self.mnemonic;
                let value = self.operand_lo;
                instructions::execute_read(self, mnemonic, value);
                self.state = ExecState::FetchOpcode;
                return true;
            }
            AddressingMode::ZeroPage => {
                self.effective_addr = u16::from(self.operand_lo);
                self.state = self.next_state_by_kind();
            }
            AddressingMode::ZeroPageX | AddressingMode::ZeroPageY => {
                self.pointer = u16::from(self.operand_lo);
                self.state = ExecState::IndexZeroPage;
            }
            AddressingMode::IndexedIndirectX => {
                self.pointer = u16::from(self.operand_lo);
                self.state = ExecState::IndexZeroPage;
            }
            AddressingMode::IndirectIndexedY => {
                self.pointer = u16::from(self.operand_lo);
                self.state = ExecState::FetchPointerLo;
            }
            AddressingMode::Relative => {
                self.branch_offset = self.operand_lo as i8;
                if instructions::branch_taken(self, self.mnemonic) {
                    self.state = ExecState::BranchTaken;
                } else {
                    self.state = ExecState::FetchOpcode;
                    return true;
                }
            }
            // Absolute, AbsoluteX/Y, Indirect, and JSR all need the high byte.
            _ => {
                self.state = if self.kind == InstructionKind::JumpSubroutine {
                    ExecState::JsrInternal
                } else {
                    ExecState::FetchOperandHi
                };
            }
        }
        false
    }

    fn tick_fetch_operand_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        let addr = u16::from_le_bytes([self.operand_lo, self.operand_hi]);

        match self.mode {
            AddressingMode::Absolute => {
                if self.kind == InstructionKind::JumpAbsolute {
                    self.pc = addr;
                    self.state = ExecState::FetchOpcode;
                    return true;
                }
                self.effective_addr = addr;
                self.state = self.next_state_by_kind();
            }
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => {
                let index = if self.mode == AddressingMode::AbsoluteX {
                    self.x
                } else {
                    self.y
                };
                self.base_addr = addr;
                self.effective_addr = addr.wrapping_add(u16::from(index));
                self.page_crossed = (addr & 0xFF00) != (self.effective_addr & 0xFF00);

                // Writes and RMW always take the fixup cycle; reads only on
                // a page cross.
                self.state = if self.kind == InstructionKind::Read && !self.page_crossed {
                    ExecState::ReadData
                } else {
                    ExecState::IndexFixup
                };
            }
            AddressingMode::Indirect => {
                self.pointer = addr;
                self.state = ExecState::FetchPointerLo;
            }
            _ => unreachable!("high operand byte with mode {:?}", self.mode),
        }
        false
    }

    fn tick_index_zero_page(&mut self, bus: &mut impl Bus) -> bool {
        // The hardware reads the unindexed address while the adder works.
        let _ = bus.read(self.pointer);

        match self.mode {
            AddressingMode::ZeroPageX => {
                self.effective_addr = u16::from(self.operand_lo.wrapping_add(self.x));
                self.state = self.next_state_by_kind();
            }
            AddressingMode::ZeroPageY => {
                self.effective_addr = u16::from(self.operand_lo.wrapping_add(self.y));
                self.state = self.next_state_by_kind();
            }
            AddressingMode::IndexedIndirectX => {
                self.pointer = u16::from(self.operand_lo.wrapping_add(self.x));
                self.state = ExecState::FetchPointerLo;
            }
            _ => unreachable!("zero-page index with mode {:?}", self.mode),
        }
        false
    }

    fn tick_index_fixup(&mut self, bus: &mut impl Bus) -> bool {
        // Dummy read at the address before the page carry is applied.
        let unfixed = (self.base_addr & 0xFF00) | (self.effective_addr & 0x00FF);
        let _ = bus.read(unfixed);
        self.state = self.next_state_by_kind();
        false
    }

    fn tick_fetch_pointer_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_lo = bus.read(self.pointer);
        self.state = ExecState::FetchPointerHi;
        false
    }

    fn tick_fetch_pointer_hi(&mut self, bus: &mut impl Bus) -> bool {
        match self.mode {
            AddressingMode::IndexedIndirectX => {
                let hi_addr = u16::from((self.pointer as u8).wrapping_add(1));
                self.operand_hi = bus.read(hi_addr);
                self.effective_addr = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.state = self.next_state_by_kind();
            }
            AddressingMode::IndirectIndexedY => {
                let hi_addr = u16::from((self.pointer as u8).wrapping_add(1));
                self.operand_hi = bus.read(hi_addr);
                let base = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.base_addr = base;
                self.effective_addr = base.wrapping_add(u16::from(self.y));
                self.page_crossed = (base & 0xFF00) != (self.effective_addr & 0xFF00);

                self.state = if self.kind == InstructionKind::Read && !self.page_crossed {
                    ExecState::ReadData
                } else {
                    ExecState::IndexFixup
                };
            }
            AddressingMode::Indirect => {
                // JMP (ind) pointer bug: the high byte never carries into
                // the next page.
                let hi_addr = if self.pointer & 0x00FF == 0x00FF {
                    self.pointer & 0xFF00
                } else {
                    self.pointer.wrapping_add(1)
                };
                self.operand_hi = bus.read(hi_addr);
                self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.state = ExecState::FetchOpcode;
                return true;
            }
            _ => unreachable!("pointer fetch with mode {:?}", self.mode),
        }
        false
    }

    // =====================================================================
    // Data cycles
    // =====================================================================

    fn tick_read_data(&mut self, bus: &mut impl Bus) -> bool {
        let value = bus.read(self.effective_addr);
        let mnemonic = self.mnemonic;
        instructions::execute_read(self, mnemonic, value);
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_write_data(&mut self, bus: &mut impl Bus) -> bool {
        let mnemonic = self.mnemonic;
        let addr = self.effective_addr;
        let value = instructions::write_value(self, mnemonic, addr);
        bus.write(self.effective_addr, value);
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_rmw_read(&mut self, bus: &mut impl Bus) -> bool {
        self.temp = bus.read(self.effective_addr);
        self.state = ExecState::RmwDummyWrite;
        false
    }

    fn tick_rmw_dummy_write(&mut self, bus: &mut impl Bus) -> bool {
        // The hardware writes the unmodified value back first.
        bus.write(self.effective_addr, self.temp);
        self.state = ExecState::RmwWrite;
        false
    }

    fn tick_rmw_write(&mut self, bus: &mut impl Bus) -> bool {
        let mnemonic = self.mnemonic;
        let original = self.temp;
        let result = instructions::execute_rmw(self, mnemonic, original);
        bus.write(self.effective_addr, result);
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_implied_execute(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.pc);

        match self.kind {
            InstructionKind::Jam => {
                log::warn!("CPU jammed by opcode ${:02X} at ${:04X}", self.opcode, self.pc);
                self.halted = true;
            }
            InstructionKind::Accumulator => {
                let mnemonic = self.mnemonic;
                instructions::execute_accumulator(self, mnemonic);
            }
            _ => {
                let mnemonic = self.mnemonic;
                instructions::execute_implied(self, mnemonic);
            }
        }
        self.state = ExecState::FetchOpcode;
        true
    }

    // =====================================================================
    // Branches
    // =====================================================================

    fn tick_branch_taken(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.pc);

        let target = self.pc.wrapping_add(self.branch_offset as u16);
        self.page_crossed = (self.pc & 0xFF00) != (target & 0xFF00);
        self.effective_addr = target;
        // Only PCL updates this cycle; the carry into PCH costs another.
        self.pc = (self.pc & 0xFF00) | (target & 0x00FF);

        if self.page_crossed {
            self.state = ExecState::BranchFixup;
            false
        } else {
            self.state = ExecState::FetchOpcode;
            true
        }
    }

    fn tick_branch_fixup(&mut self, bus: &mut impl Bus) -> bool {
        // Dummy read at the not-yet-fixed PC.
        let _ = bus.read(self.pc);
        self.pc = self.effective_addr;
        self.state = ExecState::FetchOpcode;
        true
    }

    // =====================================================================
    // Stack instructions
    // =====================================================================

    fn tick_dummy_fetch(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.pc);
        self.state = match self.kind {
            InstructionKind::Push => ExecState::PushData,
            _ => ExecState::StackDummy,
        };
        false
    }

    fn tick_stack_dummy(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(0x0100 | u16::from(self.sp));
        self.state = match self.kind {
            InstructionKind::Pull => ExecState::PullData,
            InstructionKind::ReturnSubroutine => ExecState::RtsPopPcLo,
            _ => ExecState::RtiPopStatus,
        };
        false
    }

    fn tick_push_data(&mut self, bus: &mut impl Bus) -> bool {
        let value = if self.mnemonic == Mnemonic::Php {
            self.status.to_stack_byte(true)
        } else {
            self.a
        };
        self.push(bus, value);
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_pull_data(&mut self, bus: &mut impl Bus) -> bool {
        let value = self.pop(bus);
        if self.mnemonic == Mnemonic::Plp {
            self.status = Status::from_stack_byte(value);
        } else {
            self.a = value;
            self.status.set_zn(value);
        }
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_jsr_internal(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(0x0100 | u16::from(self.sp));
        self.state = ExecState::JsrPushPcHi;
        false
    }

    fn tick_jsr_push_pc_hi(&mut self, bus: &mut impl Bus) -> bool {
        // PC currently addresses the high operand byte; the pushed return
        // address is that of the instruction's last byte.
        self.push(bus, (self.pc >> 8) as u8);
        self.state = ExecState::JsrPushPcLo;
        false
    }

    fn tick_jsr_push_pc_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.push(bus, (self.pc & 0xFF) as u8);
        self.state = ExecState::JsrFetchHi;
        false
    }

    fn tick_jsr_fetch_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = bus.read(self.pc);
        self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_rts_pop_pc_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_lo = self.pop(bus);
        self.state = ExecState::RtsPopPcHi;
        false
    }

    fn tick_rts_pop_pc_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = self.pop(bus);
        self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
        self.state = ExecState::RtsIncrement;
        false
    }

    fn tick_rts_increment(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.state = ExecState::FetchOpcode;
        true
    }

    fn tick_rti_pop_status(&mut self, bus: &mut impl Bus) -> bool {
        let value = self.pop(bus);
        self.status = Status::from_stack_byte(value);
        self.state = ExecState::RtiPopPcLo;
        false
    }

    fn tick_rti_pop_pc_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_lo = self.pop(bus);
        self.state = ExecState::RtiPopPcHi;
        false
    }

    fn tick_rti_pop_pc_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = self.pop(bus);
        self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
        // RTI restores I immediately: no one-instruction IRQ latency.
        self.prev_irq_inhibit = self.status.contains(Status::I);
        self.state = ExecState::FetchOpcode;
        true
    }

    // =====================================================================
    // Interrupt sequences
    // =====================================================================

    fn tick_brk_padding(&mut self, bus: &mut impl Bus) -> bool {
        // BRK reads and skips a padding byte.
        let _ = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.interrupt_vector = IRQ_VECTOR;
        self.interrupt_is_brk = true;
        self.state = ExecState::InterruptPushPcHi;
        false
    }

    fn tick_interrupt_dummy(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.pc);
        self.state = ExecState::InterruptPushPcHi;
        false
    }

    fn tick_interrupt_push_pc_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.push(bus, (self.pc >> 8) as u8);
        self.state = ExecState::InterruptPushPcLo;
        false
    }

    fn tick_interrupt_push_pc_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.push(bus, (self.pc & 0xFF) as u8);
        self.state = ExecState::InterruptPushStatus;
        false
    }

    fn tick_interrupt_push_status(&mut self, bus: &mut impl Bus) -> bool {
        let value = self.status.to_stack_byte(self.interrupt_is_brk);
        self.push(bus, value);
        self.state = ExecState::InterruptFetchVectorLo;
        false
    }

    fn tick_interrupt_fetch_vector_lo(&mut self, bus: &mut impl Bus) -> bool {
        // NMI hijack: a BRK or IRQ sequence that reaches the vector fetch
        // with the NMI latch set takes the NMI vector instead.
        if self.interrupt_vector == IRQ_VECTOR && self.nmi_edge_latched {
            self.nmi_edge_latched = false;
            self.nmi_ack = true;
            self.interrupt_vector = NMI_VECTOR;
        }
        self.status.insert(Status::I);
        self.operand_lo = bus.read(self.interrupt_vector);
        self.state = ExecState::InterruptFetchVectorHi;
        false
    }

    fn tick_interrupt_fetch_vector_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = bus.read(self.interrupt_vector.wrapping_add(1));
        self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
        self.prev_irq_inhibit = true;
        self.state = ExecState::FetchOpcode;
        true
    }

    // =====================================================================
    // Snapshot support
    // =====================================================================

    /// Append the complete CPU state to `out` in a fixed byte order.
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.push(self.a);
        out.push(self.x);
        out.push(self.y);
        out.push(self.sp);
        out.push(self.status.bits());
        out.extend_from_slice(&self.pc.to_le_bytes());
        out.push(u8::from(self.halted));
        out.push(u8::from(self.nmi_line));
        out.push(u8::from(self.nmi_edge_latched));
        out.push(u8::from(self.irq_line));
        out.push(u8::from(self.prev_irq_inhibit));
        out.push(u8::from(self.nmi_ack));
        out.push(self.state.index());
        out.push(self.opcode);
        out.push(self.instruction_cycle);
        out.push(self.operand_lo);
        out.push(self.operand_hi);
        out.extend_from_slice(&self.pointer.to_le_bytes());
        out.extend_from_slice(&self.base_addr.to_le_bytes());
        out.extend_from_slice(&self.effective_addr.to_le_bytes());
        out.push(u8::from(self.page_crossed));
        out.push(self.temp);
        out.push(self.branch_offset as u8);
        out.extend_from_slice(&self.interrupt_vector.to_le_bytes());
        out.push(u8::from(self.interrupt_is_brk));
    }

    /// Restore state previously written by [`Cpu::save_state`].
    ///
    /// Returns `None` if the data is truncated or names an unknown
    /// execution state.
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        let take = |pos: &mut usize| -> Option<u8> {
            let b = *data.get(*pos)?;
            *pos += 1;
            Some(b)
        };
        let take_u16 = |pos: &mut usize| -> Option<u16> {
            let lo = *data.get(*pos)?;
            let hi = *data.get(*pos + 1)?;
            *pos += 2;
            Some(u16::from_le_bytes([lo, hi]))
        };

        self.a = take(pos)?;
        self.x = take(pos)?;
        self.y = take(pos)?;
        self.sp = take(pos)?;
        self.status = Status::from_bits_truncate(take(pos)?);
        self.pc = take_u16(pos)?;
        self.halted = take(pos)? != 0;
        self.nmi_line = take(pos)? != 0;
        self.nmi_edge_latched = take(pos)? != 0;
        self.irq_line = take(pos)? != 0;
        self.prev_irq_inhibit = take(pos)? != 0;
        self.nmi_ack = take(pos)? != 0;
        self.state = ExecState::from_index(take(pos)?)?;
        self.opcode = take(pos)?;
        self.instruction_cycle = take(pos)?;
        self.operand_lo = take(pos)?;
        self.operand_hi = take(pos)?;
        self.pointer = take_u16(pos)?;
        self.base_addr = take_u16(pos)?;
        self.effective_addr = take_u16(pos)?;
        self.page_crossed = take(pos)? != 0;
        self.temp = take(pos)?;
        self.branch_offset = take(pos)? as i8;
        self.interrupt_vector = take_u16(pos)?;
        self.interrupt_is_brk = take(pos)? != 0;

        // Decode fields are pure functions of the opcode.
        let info = OPCODE_TABLE[self.opcode as usize];
        self.mnemonic = info.mnemonic;
        self.mode = info.mode;
        self.kind = info.mnemonic.kind(info.mode);
        Some(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat-RAM bus that records every transaction for trace assertions.
    struct TraceBus {
        ram: Vec<u8>,
        trace: Vec<(u16, u8, bool)>, // (addr, value, is_write)
    }

    impl TraceBus {
        fn new() -> Self {
            Self {
                ram: vec![0; 0x10000],
                trace: Vec::new(),
            }
        }

        fn load(program: &[u8], at: u16) -> Self {
            let mut bus = Self::new();
            bus.ram[at as usize..at as usize + program.len()].copy_from_slice(program);
            bus.ram[0xFFFC] = (at & 0xFF) as u8;
            bus.ram[0xFFFD] = (at >> 8) as u8;
            bus
        }

        fn writes(&self) -> Vec<(u16, u8)> {
            self.trace
                .iter()
                .filter(|(_, _, w)| *w)
                .map(|(a, v, _)| (*a, *v))
                .collect()
        }
    }

    impl Bus for TraceBus {
        fn read(&mut self, addr: u16) -> u8 {
            let value = self.ram[addr as usize];
            self.trace.push((addr, value, false));
            value
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.ram[addr as usize] = value;
            self.trace.push((addr, value, true));
        }

        fn peek(&self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }
    }

    fn run_cycles(cpu: &mut Cpu, bus: &mut TraceBus, n: usize) {
        for _ in 0..n {
            cpu.tick(bus);
        }
    }

    /// Run one full instruction, returning the cycles it took.
    fn run_instruction(cpu: &mut Cpu, bus: &mut TraceBus) -> u8 {
        let mut cycles = 0;
        loop {
            cycles += 1;
            if cpu.tick(bus) {
                return cycles;
            }
            assert!(cycles < 10, "instruction never completed");
        }
    }

    #[test]
    fn test_nop_two_cycles() {
        let mut bus = TraceBus::load(&[0xEA, 0xEA], 0x8000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
        assert_eq!(cpu.pc, 0x8001);
    }

    #[test]
    fn test_lda_immediate() {
        let mut bus = TraceBus::load(&[0xA9, 0x42], 0x8000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
        assert_eq!(cpu.a, 0x42);
        assert!(!cpu.status.contains(Status::Z));
    }

    #[test]
    fn test_lda_zero_page() {
        let mut bus = TraceBus::load(&[0xA5, 0x10], 0x8000);
        bus.ram[0x10] = 0x99;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        assert_eq!(run_instruction(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.a, 0x99);
        assert!(cpu.status.contains(Status::N));
    }

    #[test]
    fn test_lda_absolute_x_page_cross() {
        // LDA $80FF,X with X=1 crosses into $8100.
        let mut bus = TraceBus::load(&[0xBD, 0xFF, 0x80], 0x8000);
        bus.ram[0x8100] = 0x55;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.x = 1;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.a, 0x55);

        // The dummy read hit the unfixed address $8000 (in addition to the
        // opcode fetch that also lives there).
        let reads_at_8000 = bus
            .trace
            .iter()
            .filter(|&&(a, _, w)| a == 0x8000 && !w)
            .count();
        assert_eq!(reads_at_8000, 2);
    }

    #[test]
    fn test_lda_absolute_x_no_cross() {
        let mut bus = TraceBus::load(&[0xBD, 0x00, 0x20], 0x8000);
        bus.ram[0x2005] = 0x77;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.x = 5;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.a, 0x77);
    }

    #[test]
    fn test_sta_absolute_x_always_five_cycles() {
        let mut bus = TraceBus::load(&[0x9D, 0x00, 0x20], 0x8000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.a = 0xAB;
        cpu.x = 5;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
        assert_eq!(bus.ram[0x2005], 0xAB);
    }

    #[test]
    fn test_rmw_double_write() {
        // INC $10: the trace must show the original value written back
        // before the incremented one.
        let mut bus = TraceBus::load(&[0xE6, 0x10], 0x8000);
        bus.ram[0x10] = 0x41;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
        assert_eq!(bus.writes(), vec![(0x0010, 0x41), (0x0010, 0x42)]);
    }

    #[test]
    fn test_rmw_absolute_x_seven_cycles() {
        let mut bus = TraceBus::load(&[0xFE, 0x00, 0x20], 0x8000);
        bus.ram[0x2001] = 9;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.x = 1;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 7);
        assert_eq!(bus.ram[0x2001], 10);
    }

    #[test]
    fn test_jmp_indirect_page_bug() {
        // Pointer at $10FF: high byte fetched from $1000, not $1100.
        let mut bus = TraceBus::load(&[0x6C, 0xFF, 0x10], 0x8000);
        bus.ram[0x10FF] = 0x34;
        bus.ram[0x1100] = 0x56; // correct high byte, never read
        bus.ram[0x1000] = 0x12; // bug target
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        assert_eq!(run_instruction(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn test_indexed_indirect_x() {
        // LDA ($20,X) with X=4: pointer at $24/$25.
        let mut bus = TraceBus::load(&[0xA1, 0x20], 0x8000);
        bus.ram[0x24] = 0x00;
        bus.ram[0x25] = 0x30;
        bus.ram[0x3000] = 0x5A;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.x = 4;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.a, 0x5A);
    }

    #[test]
    fn test_indirect_indexed_y_cross() {
        // LDA ($20),Y with pointer $30FF and Y=1: crosses to $3100.
        let mut bus = TraceBus::load(&[0xB1, 0x20], 0x8000);
        bus.ram[0x20] = 0xFF;
        bus.ram[0x21] = 0x30;
        bus.ram[0x3100] = 0x66;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.y = 1;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.a, 0x66);
    }

    #[test]
    fn test_branch_timing() {
        // BEQ not taken: 2 cycles.
        let mut bus = TraceBus::load(&[0xF0, 0x10, 0xEA], 0x8000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.status.remove(Status::Z);
        assert_eq!(run_instruction(&mut cpu, &mut bus), 2);
        assert_eq!(cpu.pc, 0x8002);

        // BEQ taken, same page: 3 cycles.
        let mut bus = TraceBus::load(&[0xF0, 0x10], 0x8000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.status.insert(Status::Z);
        assert_eq!(run_instruction(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.pc, 0x8012);

        // BEQ taken across a page: 4 cycles.
        let mut bus = TraceBus::load(&[0xF0, 0x7F], 0x80F0);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.status.insert(Status::Z);
        assert_eq!(run_instruction(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.pc, 0x8171);
    }

    #[test]
    fn test_jsr_rts_round_trip() {
        let mut bus = TraceBus::load(&[0x20, 0x00, 0x90], 0x8000); // JSR $9000
        bus.ram[0x9000] = 0x60; // RTS
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        let sp_before = cpu.sp;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.pc, 0x9000);
        assert_eq!(cpu.sp, sp_before.wrapping_sub(2));
        // Return address on the stack is the last byte of the JSR.
        assert_eq!(bus.ram[0x0100 + usize::from(sp_before)], 0x80);
        assert_eq!(bus.ram[0x0100 + usize::from(sp_before) - 1], 0x02);

        assert_eq!(run_instruction(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.pc, 0x8003);
        assert_eq!(cpu.sp, sp_before);
    }

    #[test]
    fn test_brk_pushes_b_and_vectors() {
        let mut bus = TraceBus::load(&[0x00, 0xFF], 0x8000);
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x90;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        let sp_before = cpu.sp;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 7);
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.status.contains(Status::I));
        // Three stack bytes: PCH, PCL, P with B set.
        assert_eq!(cpu.sp, sp_before.wrapping_sub(3));
        let pushed_p = bus.ram[0x0100 + usize::from(sp_before) - 2];
        assert_ne!(pushed_p & Status::B.bits(), 0);
        // Return address skips the padding byte.
        assert_eq!(bus.ram[0x0100 + usize::from(sp_before)], 0x80);
        assert_eq!(bus.ram[0x0100 + usize::from(sp_before) - 1], 0x02);
    }

    #[test]
    fn test_nmi_sequence() {
        let mut bus = TraceBus::load(&[0xEA, 0xEA, 0xEA], 0x8000);
        bus.ram[0xFFFA] = 0x00;
        bus.ram[0xFFFB] = 0x95;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        let sp_before = cpu.sp;

        // Finish one NOP, then raise NMI.
        run_instruction(&mut cpu, &mut bus);
        cpu.set_nmi_line(true);

        // 7-cycle sequence.
        assert_eq!(run_instruction(&mut cpu, &mut bus), 7);
        assert_eq!(cpu.pc, 0x9500);
        assert!(cpu.take_nmi_ack());
        assert_eq!(cpu.sp, sp_before.wrapping_sub(3));
        // B clear in the pushed status.
        let pushed_p = bus.ram[0x0100 + usize::from(sp_before) - 2];
        assert_eq!(pushed_p & Status::B.bits(), 0);
    }

    #[test]
    fn test_nmi_edge_not_level() {
        let mut bus = TraceBus::load(&[0xEA, 0xEA, 0xEA, 0xEA], 0x8000);
        bus.ram[0xFFFA] = 0x00;
        bus.ram[0xFFFB] = 0x95;
        bus.ram[0x9500] = 0xEA;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        cpu.set_nmi_line(true);
        run_instruction(&mut cpu, &mut bus); // NOP
        run_instruction(&mut cpu, &mut bus); // NMI sequence
        assert_eq!(cpu.pc, 0x9500);

        // Line still high: no second edge, no re-entry.
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x9501);
    }

    #[test]
    fn test_irq_respects_i_flag() {
        let mut bus = TraceBus::load(&[0xEA, 0xEA], 0x8000);
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x95;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        // Reset leaves I set.
        cpu.set_irq_line(true);

        run_instruction(&mut cpu, &mut bus);
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x8002); // both NOPs executed, no IRQ
    }

    #[test]
    fn test_irq_taken_when_enabled() {
        let mut bus = TraceBus::load(&[0x58, 0xEA, 0xEA], 0x8000); // CLI; NOP
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x95;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.set_irq_line(true);

        run_instruction(&mut cpu, &mut bus); // CLI
        // One-instruction latency: the next instruction still runs.
        run_instruction(&mut cpu, &mut bus); // NOP at $8001
        assert_eq!(cpu.pc, 0x8002);
        // Now the IRQ is serviced.
        assert_eq!(run_instruction(&mut cpu, &mut bus), 7);
        assert_eq!(cpu.pc, 0x9500);
        assert!(cpu.status.contains(Status::I));
    }

    #[test]
    fn test_brk_hijacked_by_nmi() {
        let mut bus = TraceBus::load(&[0x00, 0xFF], 0x8000);
        bus.ram[0xFFFA] = 0x00;
        bus.ram[0xFFFB] = 0x95; // NMI handler
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x90; // IRQ handler
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        // Start BRK, assert NMI mid-sequence (before the vector fetch).
        run_cycles(&mut cpu, &mut bus, 3);
        cpu.set_nmi_line(true);
        run_cycles(&mut cpu, &mut bus, 4);

        // Hijacked: BRK lands on the NMI vector.
        assert_eq!(cpu.pc, 0x9500);
        assert!(cpu.take_nmi_ack());
    }

    #[test]
    fn test_jam_halts() {
        let mut bus = TraceBus::load(&[0x02, 0xEA], 0x8000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        run_cycles(&mut cpu, &mut bus, 2);
        assert!(cpu.halted);

        let pc = cpu.pc;
        run_cycles(&mut cpu, &mut bus, 10);
        assert_eq!(cpu.pc, pc); // no further progress

        cpu.reset(&mut bus);
        assert!(!cpu.halted);
    }

    #[test]
    fn test_reset_sp_drop_without_writes() {
        let mut bus = TraceBus::load(&[0xEA], 0x8000);
        let mut cpu = Cpu::new();
        let sp_before = cpu.sp;
        bus.trace.clear();
        cpu.reset(&mut bus);

        assert_eq!(cpu.sp, sp_before.wrapping_sub(3));
        assert!(bus.writes().is_empty());
        assert_eq!(cpu.pc, 0x8000);
    }

    #[test]
    fn test_php_sets_b_in_pushed_byte() {
        let mut bus = TraceBus::load(&[0x08], 0x8000); // PHP
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        let sp_before = cpu.sp;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 3);
        let pushed = bus.ram[0x0100 + usize::from(sp_before)];
        assert_ne!(pushed & Status::B.bits(), 0);
        assert_ne!(pushed & Status::U.bits(), 0);
    }

    #[test]
    fn test_pla_timing_and_flags() {
        let mut bus = TraceBus::load(&[0x68], 0x8000); // PLA
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        bus.ram[0x0100 + usize::from(cpu.sp) + 1] = 0x80;

        assert_eq!(run_instruction(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.status.contains(Status::N));
    }

    #[test]
    fn test_all_opcode_cycle_counts() {
        // Every opcode (except the branch/jam special cases) must consume
        // exactly its classified base cycle count when no page is crossed.
        for opcode in 0u16..=255 {
            let opcode = opcode as u8;
            let info = OPCODE_TABLE[opcode as usize];
            let kind = info.mnemonic.kind(info.mode);
            if matches!(
                kind,
                InstructionKind::Branch | InstructionKind::Jam
            ) {
                continue;
            }

            // Program at $8000 with zeroed operands: no page crossing.
            let mut bus = TraceBus::load(&[opcode, 0x00, 0x00], 0x8000);
            let mut cpu = Cpu::new();
            cpu.reset(&mut bus);
            // X/Y zero keeps indexed modes on-page.
            let cycles = run_instruction(&mut cpu, &mut bus);
            assert_eq!(
                cycles,
                kind.base_cycles(info.mode),
                "opcode ${opcode:02X} ({:?} {:?})",
                info.mnemonic,
                info.mode
            );
        }
    }

    #[test]
    fn test_save_restore_mid_instruction() {
        let mut bus = TraceBus::load(&[0xFE, 0x00, 0x20], 0x8000); // INC $2000,X
        bus.ram[0x2001] = 9;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.x = 1;

        // Stop partway through the instruction.
        run_cycles(&mut cpu, &mut bus, 4);

        let mut saved = Vec::new();
        cpu.save_state(&mut saved);

        let mut restored = Cpu::new();
        let mut pos = 0;
        restored.load_state(&saved, &mut pos).unwrap();
        assert_eq!(pos, saved.len());

        // Both CPUs finish identically.
        while !cpu.tick(&mut bus) {}
        let mut bus2 = TraceBus::load(&[0xFE, 0x00, 0x20], 0x8000);
        bus2.ram[0x2001] = 9;
        while !restored.tick(&mut bus2) {}

        assert_eq!(cpu.pc, restored.pc);
        assert_eq!(cpu.status, restored.status);
        assert_eq!(bus.ram[0x2001], bus2.ram[0x2001]);
    }
}
