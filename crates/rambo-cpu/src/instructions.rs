//! Instruction bodies: the register/flag effects of every mnemonic.
//!
//! The state machine in `cpu.rs` owns all bus traffic and timing; the free
//! functions here operate purely on registers and the value the machine
//! handed them. Unofficial opcodes use the behavior commercial games rely
//! on; the unstable immediates (XAA, LXA) use the conventional $EE magic
//! constant.

use crate::cpu::Cpu;
use crate::opcodes::Mnemonic;
use crate::status::Status;

/// Execute a read-class instruction against the fetched operand value.
pub(crate) fn execute_read(cpu: &mut Cpu, mnemonic: Mnemonic, value: u8) {
    match mnemonic {
        Mnemonic::Lda => {
            cpu.a = value;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Ldx => {
            cpu.x = value;
            cpu.status.set_zn(cpu.x);
        }
        Mnemonic::Ldy => {
            cpu.y = value;
            cpu.status.set_zn(cpu.y);
        }
        Mnemonic::Lax => {
            cpu.a = value;
            cpu.x = value;
            cpu.status.set_zn(value);
        }
        Mnemonic::Adc => adc(cpu, value),
        Mnemonic::Sbc => adc(cpu, value ^ 0xFF),
        Mnemonic::And => {
            cpu.a &= value;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Ora => {
            cpu.a |= value;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Eor => {
            cpu.a ^= value;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Cmp => {
            let a = cpu.a;
            compare(cpu, a, value);
        }
        Mnemonic::Cpx => {
            let x = cpu.x;
            compare(cpu, x, value);
        }
        Mnemonic::Cpy => {
            let y = cpu.y;
            compare(cpu, y, value);
        }
        Mnemonic::Bit => {
            cpu.status.set_flag(Status::Z, cpu.a & value == 0);
            cpu.status.set_flag(Status::N, value & 0x80 != 0);
            cpu.status.set_flag(Status::V, value & 0x40 != 0);
        }
        Mnemonic::Anc => {
            cpu.a &= value;
            cpu.status.set_zn(cpu.a);
            let negative = cpu.status.contains(Status::N);
            cpu.status.set_flag(Status::C, negative);
        }
        Mnemonic::Alr => {
            let anded = cpu.a & value;
            cpu.a = lsr(cpu, anded);
        }
        Mnemonic::Arr => arr(cpu, value),
        Mnemonic::Xaa => {
            cpu.a = (cpu.a | 0xEE) & cpu.x & value;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Lxa => {
            cpu.a = (cpu.a | 0xEE) & value;
            cpu.x = cpu.a;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Axs => {
            let base = cpu.a & cpu.x;
            cpu.status.set_flag(Status::C, base >= value);
            cpu.x = base.wrapping_sub(value);
            cpu.status.set_zn(cpu.x);
        }
        Mnemonic::Las => {
            let result = value & cpu.sp;
            cpu.a = result;
            cpu.x = result;
            cpu.sp = result;
            cpu.status.set_zn(result);
        }
        // Multi-byte NOPs read and discard.
        Mnemonic::Nop => {}
        _ => {}
    }
}

/// The value a write-class instruction puts on the bus.
///
/// The SHA/SHX/SHY/TAS group ANDs the register with the high byte of the
/// target address plus one; TAS additionally loads SP first.
pub(crate) fn write_value(cpu: &mut Cpu, mnemonic: Mnemonic, addr: u16) -> u8 {
    let addr_hi_plus_1 = ((addr >> 8) as u8).wrapping_add(1);
    match mnemonic {
        Mnemonic::Sta => cpu.a,
        Mnemonic::Stx => cpu.x,
        Mnemonic::Sty => cpu.y,
        Mnemonic::Sax => cpu.a & cpu.x,
        Mnemonic::Sha => cpu.a & cpu.x & addr_hi_plus_1,
        Mnemonic::Shx => cpu.x & addr_hi_plus_1,
        Mnemonic::Shy => cpu.y & addr_hi_plus_1,
        Mnemonic::Tas => {
            cpu.sp = cpu.a & cpu.x;
            cpu.sp & addr_hi_plus_1
        }
        _ => 0,
    }
}

/// Execute a read-modify-write instruction; returns the modified value the
/// machine will write back.
pub(crate) fn execute_rmw(cpu: &mut Cpu, mnemonic: Mnemonic, value: u8) -> u8 {
    match mnemonic {
        Mnemonic::Asl => asl(cpu, value),
        Mnemonic::Lsr => lsr(cpu, value),
        Mnemonic::Rol => rol(cpu, value),
        Mnemonic::Ror => ror(cpu, value),
        Mnemonic::Inc => {
            let result = value.wrapping_add(1);
            cpu.status.set_zn(result);
            result
        }
        Mnemonic::Dec => {
            let result = value.wrapping_sub(1);
            cpu.status.set_zn(result);
            result
        }
        Mnemonic::Slo => {
            let result = asl(cpu, value);
            cpu.a |= result;
            cpu.status.set_zn(cpu.a);
            result
        }
        Mnemonic::Rla => {
            let result = rol(cpu, value);
            cpu.a &= result;
            cpu.status.set_zn(cpu.a);
            result
        }
        Mnemonic::Sre => {
            let result = lsr(cpu, value);
            cpu.a ^= result;
            cpu.status.set_zn(cpu.a);
            result
        }
        Mnemonic::Rra => {
            let result = ror(cpu, value);
            adc(cpu, result);
            result
        }
        Mnemonic::Dcp => {
            let result = value.wrapping_sub(1);
            let a = cpu.a;
            compare(cpu, a, result);
            result
        }
        Mnemonic::Isc => {
            let result = value.wrapping_add(1);
            adc(cpu, result ^ 0xFF);
            result
        }
        _ => value,
    }
}

/// Execute an implied (register-only) instruction.
pub(crate) fn execute_implied(cpu: &mut Cpu, mnemonic: Mnemonic) {
    match mnemonic {
        Mnemonic::Tax => {
            cpu.x = cpu.a;
            cpu.status.set_zn(cpu.x);
        }
        Mnemonic::Tay => {
            cpu.y = cpu.a;
            cpu.status.set_zn(cpu.y);
        }
        Mnemonic::Txa => {
            cpu.a = cpu.x;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Tya => {
            cpu.a = cpu.y;
            cpu.status.set_zn(cpu.a);
        }
        Mnemonic::Tsx => {
            cpu.x = cpu.sp;
            cpu.status.set_zn(cpu.x);
        }
        // TXS does not touch flags.
        Mnemonic::Txs => cpu.sp = cpu.x,
        Mnemonic::Inx => {
            cpu.x = cpu.x.wrapping_add(1);
            cpu.status.set_zn(cpu.x);
        }
        Mnemonic::Iny => {
            cpu.y = cpu.y.wrapping_add(1);
            cpu.status.set_zn(cpu.y);
        }
        Mnemonic::Dex => {
            cpu.x = cpu.x.wrapping_sub(1);
            cpu.status.set_zn(cpu.x);
        }
        Mnemonic::Dey => {
            cpu.y = cpu.y.wrapping_sub(1);
            cpu.status.set_zn(cpu.y);
        }
        Mnemonic::Clc => cpu.status.remove(Status::C),
        Mnemonic::Sec => cpu.status.insert(Status::C),
        Mnemonic::Cli => cpu.status.remove(Status::I),
        Mnemonic::Sei => cpu.status.insert(Status::I),
        Mnemonic::Clv => cpu.status.remove(Status::V),
        Mnemonic::Cld => cpu.status.remove(Status::D),
        Mnemonic::Sed => cpu.status.insert(Status::D),
        Mnemonic::Nop => {}
        _ => {}
    }
}

/// Execute a shift/rotate on the accumulator.
pub(crate) fn execute_accumulator(cpu: &mut Cpu, mnemonic: Mnemonic) {
    let a = cpu.a;
    cpu.a = match mnemonic {
        Mnemonic::Asl => asl(cpu, a),
        Mnemonic::Lsr => lsr(cpu, a),
        Mnemonic::Rol => rol(cpu, a),
        Mnemonic::Ror => ror(cpu, a),
        _ => a,
    };
}

/// Branch condition for the given branch mnemonic.
pub(crate) fn branch_taken(cpu: &Cpu, mnemonic: Mnemonic) -> bool {
    match mnemonic {
        Mnemonic::Bpl => !cpu.status.contains(Status::N),
        Mnemonic::Bmi => cpu.status.contains(Status::N),
        Mnemonic::Bvc => !cpu.status.contains(Status::V),
        Mnemonic::Bvs => cpu.status.contains(Status::V),
        Mnemonic::Bcc => !cpu.status.contains(Status::C),
        Mnemonic::Bcs => cpu.status.contains(Status::C),
        Mnemonic::Bne => !cpu.status.contains(Status::Z),
        Mnemonic::Beq => cpu.status.contains(Status::Z),
        _ => false,
    }
}

/// Add with carry. Decimal mode is never applied (NES 2A03 variant).
fn adc(cpu: &mut Cpu, value: u8) {
    let carry_in = u16::from(cpu.status.contains(Status::C));
    let sum = u16::from(cpu.a) + u16::from(value) + carry_in;
    let result = sum as u8;

    cpu.status.set_flag(Status::C, sum > 0xFF);
    cpu.status
        .set_flag(Status::V, (cpu.a ^ result) & (value ^ result) & 0x80 != 0);
    cpu.a = result;
    cpu.status.set_zn(result);
}

fn compare(cpu: &mut Cpu, register: u8, value: u8) {
    cpu.status.set_flag(Status::C, register >= value);
    cpu.status.set_zn(register.wrapping_sub(value));
}

fn asl(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.status.set_flag(Status::C, value & 0x80 != 0);
    let result = value << 1;
    cpu.status.set_zn(result);
    result
}

fn lsr(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.status.set_flag(Status::C, value & 0x01 != 0);
    let result = value >> 1;
    cpu.status.set_zn(result);
    result
}

fn rol(cpu: &mut Cpu, value: u8) -> u8 {
    let carry_in = u8::from(cpu.status.contains(Status::C));
    cpu.status.set_flag(Status::C, value & 0x80 != 0);
    let result = (value << 1) | carry_in;
    cpu.status.set_zn(result);
    result
}

fn ror(cpu: &mut Cpu, value: u8) -> u8 {
    let carry_in = u8::from(cpu.status.contains(Status::C));
    cpu.status.set_flag(Status::C, value & 0x01 != 0);
    let result = (value >> 1) | (carry_in << 7);
    cpu.status.set_zn(result);
    result
}

/// ARR: AND then ROR A, with C taken from bit 6 of the result and V from
/// bit 6 xor bit 5.
fn arr(cpu: &mut Cpu, value: u8) {
    let carry_in = u8::from(cpu.status.contains(Status::C));
    let anded = cpu.a & value;
    let result = (anded >> 1) | (carry_in << 7);
    cpu.a = result;
    cpu.status.set_zn(result);
    cpu.status.set_flag(Status::C, result & 0x40 != 0);
    cpu.status
        .set_flag(Status::V, ((result >> 6) ^ (result >> 5)) & 1 != 0);
}
