//! The 256-entry opcode table.
//!
//! Every opcode, official and unofficial, decodes to a mnemonic plus an
//! addressing mode; the pair classifies into an [`InstructionKind`] that
//! selects the cycle sequence. Unofficial opcodes that commercial games
//! depend on (LAX, SAX, the RMW combos, the immediate ALU oddities, the
//! unstable SHA/SHX/SHY/TAS group) are first-class citizens here.

use crate::addressing::AddressingMode;
use crate::state::InstructionKind;

/// Instruction mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // the 6502 manual is the documentation
pub enum Mnemonic {
    // Official
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
    // Unofficial
    Anc, Alr, Arr, Axs, Dcp, Isc, Las, Lax, Lxa, Rla, Rra, Sax, Sha,
    Shx, Shy, Slo, Sre, Tas, Xaa, Jam,
}

impl Mnemonic {
    /// Classify a (mnemonic, mode) pair into its execution pattern.
    #[must_use]
    pub const fn kind(self, mode: AddressingMode) -> InstructionKind {
        use AddressingMode as M;
        use Mnemonic::*;
        match self {
            Bcc | Bcs | Beq | Bmi | Bne | Bpl | Bvc | Bvs => InstructionKind::Branch,
            Brk => InstructionKind::Break,
            Jsr => InstructionKind::JumpSubroutine,
            Rts => InstructionKind::ReturnSubroutine,
            Rti => InstructionKind::ReturnInterrupt,
            Jmp => match mode {
                M::Indirect => InstructionKind::JumpIndirect,
                _ => InstructionKind::JumpAbsolute,
            },
            Pha | Php => InstructionKind::Push,
            Pla | Plp => InstructionKind::Pull,
            Asl | Lsr | Rol | Ror => match mode {
                M::Accumulator => InstructionKind::Accumulator,
                _ => InstructionKind::ReadModifyWrite,
            },
            Inc | Dec | Slo | Rla | Sre | Rra | Dcp | Isc => InstructionKind::ReadModifyWrite,
            Sta | Stx | Sty | Sax | Sha | Shx | Shy | Tas => InstructionKind::Write,
            Tax | Tay | Tsx | Txa | Txs | Tya | Inx | Iny | Dex | Dey | Clc | Cld | Cli
            | Clv | Sec | Sed | Sei => InstructionKind::Implied,
            Nop => match mode {
                M::Implied => InstructionKind::Implied,
                _ => InstructionKind::Read,
            },
            Jam => InstructionKind::Jam,
            _ => InstructionKind::Read,
        }
    }
}

/// A decoded opcode table entry.
#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    /// Instruction mnemonic.
    pub mnemonic: Mnemonic,
    /// Addressing mode.
    pub mode: AddressingMode,
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode) -> Opcode {
    Opcode { mnemonic, mode }
}

use AddressingMode::{
    Absolute as Abs, AbsoluteX as AbX, AbsoluteY as AbY, Accumulator as Acc, Immediate as Imm,
    Implied as Imp, IndexedIndirectX as IzX, Indirect as Ind, IndirectIndexedY as IzY,
    Relative as Rel, ZeroPage as Zp, ZeroPageX as ZpX, ZeroPageY as ZpY,
};
use Mnemonic::*;

/// Complete decode table, indexed by opcode byte.
#[rustfmt::skip]
pub const OPCODE_TABLE: [Opcode; 256] = [
    // $00-$0F
    op(Brk, Imp), op(Ora, IzX), op(Jam, Imp), op(Slo, IzX),
    op(Nop, Zp),  op(Ora, Zp),  op(Asl, Zp),  op(Slo, Zp),
    op(Php, Imp), op(Ora, Imm), op(Asl, Acc), op(Anc, Imm),
    op(Nop, Abs), op(Ora, Abs), op(Asl, Abs), op(Slo, Abs),
    // $10-$1F
    op(Bpl, Rel), op(Ora, IzY), op(Jam, Imp), op(Slo, IzY),
    op(Nop, ZpX), op(Ora, ZpX), op(Asl, ZpX), op(Slo, ZpX),
    op(Clc, Imp), op(Ora, AbY), op(Nop, Imp), op(Slo, AbY),
    op(Nop, AbX), op(Ora, AbX), op(Asl, AbX), op(Slo, AbX),
    // $20-$2F
    op(Jsr, Abs), op(And, IzX), op(Jam, Imp), op(Rla, IzX),
    op(Bit, Zp),  op(And, Zp),  op(Rol, Zp),  op(Rla, Zp),
    op(Plp, Imp), op(And, Imm), op(Rol, Acc), op(Anc, Imm),
    op(Bit, Abs), op(And, Abs), op(Rol, Abs), op(Rla, Abs),
    // $30-$3F
    op(Bmi, Rel), op(And, IzY), op(Jam, Imp), op(Rla, IzY),
    op(Nop, ZpX), op(And, ZpX), op(Rol, ZpX), op(Rla, ZpX),
    op(Sec, Imp), op(And, AbY), op(Nop, Imp), op(Rla, AbY),
    op(Nop, AbX), op(And, AbX), op(Rol, AbX), op(Rla, AbX),
    // $40-$4F
    op(Rti, Imp), op(Eor, IzX), op(Jam, Imp), op(Sre, IzX),
    op(Nop, Zp),  op(Eor, Zp),  op(Lsr, Zp),  op(Sre, Zp),
    op(Pha, Imp), op(Eor, Imm), op(Lsr, Acc), op(Alr, Imm),
    op(Jmp, Abs), op(Eor, Abs), op(Lsr, Abs), op(Sre, Abs),
    // $50-$5F
    op(Bvc, Rel), op(Eor, IzY), op(Jam, Imp), op(Sre, IzY),
    op(Nop, ZpX), op(Eor, ZpX), op(Lsr, ZpX), op(Sre, ZpX),
    op(Cli, Imp), op(Eor, AbY), op(Nop, Imp), op(Sre, AbY),
    op(Nop, AbX), op(Eor, AbX), op(Lsr, AbX), op(Sre, AbX),
    // $60-$6F
    op(Rts, Imp), op(Adc, IzX), op(Jam, Imp), op(Rra, IzX),
    op(Nop, Zp),  op(Adc, Zp),  op(Ror, Zp),  op(Rra, Zp),
    op(Pla, Imp), op(Adc, Imm), op(Ror, Acc), op(Arr, Imm),
    op(Jmp, Ind), op(Adc, Abs), op(Ror, Abs), op(Rra, Abs),
    // $70-$7F
    op(Bvs, Rel), op(Adc, IzY), op(Jam, Imp), op(Rra, IzY),
    op(Nop, ZpX), op(Adc, ZpX), op(Ror, ZpX), op(Rra, ZpX),
    op(Sei, Imp), op(Adc, AbY), op(Nop, Imp), op(Rra, AbY),
    op(Nop, AbX), op(Adc, AbX), op(Ror, AbX), op(Rra, AbX),
    // $80-$8F
    op(Nop, Imm), op(Sta, IzX), op(Nop, Imm), op(Sax, IzX),
    op(Sty, Zp),  op(Sta, Zp),  op(Stx, Zp),  op(Sax, Zp),
    op(Dey, Imp), op(Nop, Imm), op(Txa, Imp), op(Xaa, Imm),
    op(Sty, Abs), op(Sta, Abs), op(Stx, Abs), op(Sax, Abs),
    // $90-$9F
    op(Bcc, Rel), op(Sta, IzY), op(Jam, Imp), op(Sha, IzY),
    op(Sty, ZpX), op(Sta, ZpX), op(Stx, ZpY), op(Sax, ZpY),
    op(Tya, Imp), op(Sta, AbY), op(Txs, Imp), op(Tas, AbY),
    op(Shy, AbX), op(Sta, AbX), op(Shx, AbY), op(Sha, AbY),
    // $A0-$AF
    op(Ldy, Imm), op(Lda, IzX), op(Ldx, Imm), op(Lax, IzX),
    op(Ldy, Zp),  op(Lda, Zp),  op(Ldx, Zp),  op(Lax, Zp),
    op(Tay, Imp), op(Lda, Imm), op(Tax, Imp), op(Lxa, Imm),
    op(Ldy, Abs), op(Lda, Abs), op(Ldx, Abs), op(Lax, Abs),
    // $B0-$BF
    op(Bcs, Rel), op(Lda, IzY), op(Jam, Imp), op(Lax, IzY),
    op(Ldy, ZpX), op(Lda, ZpX), op(Ldx, ZpY), op(Lax, ZpY),
    op(Clv, Imp), op(Lda, AbY), op(Tsx, Imp), op(Las, AbY),
    op(Ldy, AbX), op(Lda, AbX), op(Ldx, AbY), op(Lax, AbY),
    // $C0-$CF
    op(Cpy, Imm), op(Cmp, IzX), op(Nop, Imm), op(Dcp, IzX),
    op(Cpy, Zp),  op(Cmp, Zp),  op(Dec, Zp),  op(Dcp, Zp),
    op(Iny, Imp), op(Cmp, Imm), op(Dex, Imp), op(Axs, Imm),
    op(Cpy, Abs), op(Cmp, Abs), op(Dec, Abs), op(Dcp, Abs),
    // $D0-$DF
    op(Bne, Rel), op(Cmp, IzY), op(Jam, Imp), op(Dcp, IzY),
    op(Nop, ZpX), op(Cmp, ZpX), op(Dec, ZpX), op(Dcp, ZpX),
    op(Cld, Imp), op(Cmp, AbY), op(Nop, Imp), op(Dcp, AbY),
    op(Nop, AbX), op(Cmp, AbX), op(Dec, AbX), op(Dcp, AbX),
    // $E0-$EF
    op(Cpx, Imm), op(Sbc, IzX), op(Nop, Imm), op(Isc, IzX),
    op(Cpx, Zp),  op(Sbc, Zp),  op(Inc, Zp),  op(Isc, Zp),
    op(Inx, Imp), op(Sbc, Imm), op(Nop, Imp), op(Sbc, Imm),
    op(Cpx, Abs), op(Sbc, Abs), op(Inc, Abs), op(Isc, Abs),
    // $F0-$FF
    op(Beq, Rel), op(Sbc, IzY), op(Jam, Imp), op(Isc, IzY),
    op(Nop, ZpX), op(Sbc, ZpX), op(Inc, ZpX), op(Isc, ZpX),
    op(Sed, Imp), op(Sbc, AbY), op(Nop, Imp), op(Isc, AbY),
    op(Nop, AbX), op(Sbc, AbX), op(Inc, AbX), op(Isc, AbX),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_official_decodes() {
        assert_eq!(OPCODE_TABLE[0xA9].mnemonic, Lda);
        assert_eq!(OPCODE_TABLE[0xA9].mode, Imm);
        assert_eq!(OPCODE_TABLE[0x8D].mnemonic, Sta);
        assert_eq!(OPCODE_TABLE[0x8D].mode, Abs);
        assert_eq!(OPCODE_TABLE[0x6C].mnemonic, Jmp);
        assert_eq!(OPCODE_TABLE[0x6C].mode, Ind);
        assert_eq!(OPCODE_TABLE[0x00].mnemonic, Brk);
        assert_eq!(OPCODE_TABLE[0xEA].mnemonic, Nop);
    }

    #[test]
    fn test_unofficial_decodes() {
        assert_eq!(OPCODE_TABLE[0xA7].mnemonic, Lax);
        assert_eq!(OPCODE_TABLE[0x87].mnemonic, Sax);
        assert_eq!(OPCODE_TABLE[0x07].mnemonic, Slo);
        assert_eq!(OPCODE_TABLE[0xEB].mnemonic, Sbc); // USBC
        assert_eq!(OPCODE_TABLE[0xCB].mnemonic, Axs);
        assert_eq!(OPCODE_TABLE[0x02].mnemonic, Jam);
        assert_eq!(OPCODE_TABLE[0x9E].mnemonic, Shx);
    }

    #[test]
    fn test_kind_classification() {
        use crate::state::InstructionKind;

        assert_eq!(Lda.kind(Imm), InstructionKind::Read);
        assert_eq!(Sta.kind(Abs), InstructionKind::Write);
        assert_eq!(Asl.kind(Acc), InstructionKind::Accumulator);
        assert_eq!(Asl.kind(Zp), InstructionKind::ReadModifyWrite);
        assert_eq!(Nop.kind(Imp), InstructionKind::Implied);
        assert_eq!(Nop.kind(Imm), InstructionKind::Read);
        assert_eq!(Jmp.kind(Ind), InstructionKind::JumpIndirect);
        assert_eq!(Jmp.kind(Abs), InstructionKind::JumpAbsolute);
        assert_eq!(Jam.kind(Imp), InstructionKind::Jam);
    }

    #[test]
    fn test_every_jam_slot() {
        for opcode in [0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2] {
            assert_eq!(OPCODE_TABLE[opcode as usize].mnemonic, Jam, "opcode {opcode:02X}");
        }
    }
}
