//! Flat decode table for all 256 2A03 opcodes.
//!
//! Every byte decodes to something: undocumented opcodes have entries too and
//! are flagged `official == false`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    pub const fn operand_len(self) -> u16 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::IndirectX
            | AddressingMode::IndirectY
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
        }
    }

    /// Modes whose effective address can land on a different page than the
    /// base address.
    pub const fn is_indexed_across_pages(self) -> bool {
        matches!(
            self,
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY | AddressingMode::IndirectY
        )
    }

    pub const fn read_cycles(self) -> u8 {
        match self {
            AddressingMode::Implied
            | AddressingMode::Accumulator
            | AddressingMode::Immediate
            | AddressingMode::Relative => 2,
            AddressingMode::ZeroPage => 3,
            AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY => 4,
            AddressingMode::Indirect | AddressingMode::IndirectY => 5,
            AddressingMode::IndirectX => 6,
        }
    }

    /// Stores always pay for the indexed dummy read, so there is no
    /// conditional penalty; the extra cycle is folded into the base.
    pub const fn write_cycles(self) -> u8 {
        match self {
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => 5,
            AddressingMode::IndirectY => 6,
            mode => mode.read_cycles(),
        }
    }

    pub const fn modify_cycles(self) -> u8 {
        match self {
            AddressingMode::Accumulator => 2,
            AddressingMode::ZeroPage => 5,
            AddressingMode::ZeroPageX | AddressingMode::Absolute => 6,
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => 7,
            AddressingMode::IndirectX | AddressingMode::IndirectY => 8,
            mode => mode.read_cycles(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    // Undocumented.
    Alr,
    Anc,
    Arr,
    Axs,
    Dcp,
    Isb,
    Jam,
    Las,
    Lax,
    Lxa,
    Rla,
    Rra,
    Sax,
    Sha,
    Shx,
    Shy,
    Slo,
    Sre,
    Tas,
    Xaa,
}

/// How the instruction touches its effective address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    None,
    Read,
    Write,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub code: u8,
    pub mnemonic: &'static str,
    pub operation: Operation,
    pub mode: AddressingMode,
    pub access: Access,
    pub cycles: u8,
    pub page_penalty: bool,
    pub official: bool,
}

impl Opcode {
    pub const fn size(&self) -> u16 {
        1 + self.mode.operand_len()
    }

    pub const fn is_branch(&self) -> bool {
        matches!(self.mode, AddressingMode::Relative)
    }

    const fn unofficial(mut self) -> Self {
        self.official = false;
        self
    }
}

const fn read(
    code: u8,
    mnemonic: &'static str,
    operation: Operation,
    mode: AddressingMode,
) -> Opcode {
    Opcode {
        code,
        mnemonic,
        operation,
        mode,
        access: Access::Read,
        cycles: mode.read_cycles(),
        page_penalty: mode.is_indexed_across_pages(),
        official: true,
    }
}

const fn write(
    code: u8,
    mnemonic: &'static str,
    operation: Operation,
    mode: AddressingMode,
) -> Opcode {
    Opcode {
        code,
        mnemonic,
        operation,
        mode,
        access: Access::Write,
        cycles: mode.write_cycles(),
        page_penalty: false,
        official: true,
    }
}

const fn modify(
    code: u8,
    mnemonic: &'static str,
    operation: Operation,
    mode: AddressingMode,
) -> Opcode {
    Opcode {
        code,
        mnemonic,
        operation,
        mode,
        access: Access::Modify,
        cycles: mode.modify_cycles(),
        page_penalty: false,
        official: true,
    }
}

const fn fixed(
    code: u8,
    mnemonic: &'static str,
    operation: Operation,
    mode: AddressingMode,
    cycles: u8,
) -> Opcode {
    Opcode {
        code,
        mnemonic,
        operation,
        mode,
        access: Access::None,
        cycles,
        page_penalty: false,
        official: true,
    }
}

const fn implied(code: u8, mnemonic: &'static str, operation: Operation) -> Opcode {
    fixed(code, mnemonic, operation, AddressingMode::Implied, 2)
}

const fn branch(code: u8, mnemonic: &'static str, operation: Operation) -> Opcode {
    fixed(code, mnemonic, operation, AddressingMode::Relative, 2)
}

pub const OPCODES: [Opcode; 256] = {
    use AddressingMode::*;
    use Operation::*;

    let mut ops = [fixed(0x02, "JAM", Jam, Implied, 2).unofficial(); 256];

    ops[0x00] = fixed(0x00, "BRK", Brk, Implied, 7);
    ops[0x01] = read(0x01, "ORA", Ora, IndirectX);
    ops[0x05] = read(0x05, "ORA", Ora, ZeroPage);
    ops[0x06] = modify(0x06, "ASL", Asl, ZeroPage);
    ops[0x08] = fixed(0x08, "PHP", Php, Implied, 3);
    ops[0x09] = read(0x09, "ORA", Ora, Immediate);
    ops[0x0A] = modify(0x0A, "ASL", Asl, Accumulator);
    ops[0x0D] = read(0x0D, "ORA", Ora, Absolute);
    ops[0x0E] = modify(0x0E, "ASL", Asl, Absolute);
    ops[0x10] = branch(0x10, "BPL", Bpl);
    ops[0x11] = read(0x11, "ORA", Ora, IndirectY);
    ops[0x15] = read(0x15, "ORA", Ora, ZeroPageX);
    ops[0x16] = modify(0x16, "ASL", Asl, ZeroPageX);
    ops[0x18] = implied(0x18, "CLC", Clc);
    ops[0x19] = read(0x19, "ORA", Ora, AbsoluteY);
    ops[0x1D] = read(0x1D, "ORA", Ora, AbsoluteX);
    ops[0x1E] = modify(0x1E, "ASL", Asl, AbsoluteX);

    ops[0x20] = fixed(0x20, "JSR", Jsr, Absolute, 6);
    ops[0x21] = read(0x21, "AND", And, IndirectX);
    ops[0x24] = read(0x24, "BIT", Bit, ZeroPage);
    ops[0x25] = read(0x25, "AND", And, ZeroPage);
    ops[0x26] = modify(0x26, "ROL", Rol, ZeroPage);
    ops[0x28] = fixed(0x28, "PLP", Plp, Implied, 4);
    ops[0x29] = read(0x29, "AND", And, Immediate);
    ops[0x2A] = modify(0x2A, "ROL", Rol, Accumulator);
    ops[0x2C] = read(0x2C, "BIT", Bit, Absolute);
    ops[0x2D] = read(0x2D, "AND", And, Absolute);
    ops[0x2E] = modify(0x2E, "ROL", Rol, Absolute);
    ops[0x30] = branch(0x30, "BMI", Bmi);
    ops[0x31] = read(0x31, "AND", And, IndirectY);
    ops[0x35] = read(0x35, "AND", And, ZeroPageX);
    ops[0x36] = modify(0x36, "ROL", Rol, ZeroPageX);
    ops[0x38] = implied(0x38, "SEC", Sec);
    ops[0x39] = read(0x39, "AND", And, AbsoluteY);
    ops[0x3D] = read(0x3D, "AND", And, AbsoluteX);
    ops[0x3E] = modify(0x3E, "ROL", Rol, AbsoluteX);

    ops[0x40] = fixed(0x40, "RTI", Rti, Implied, 6);
    ops[0x41] = read(0x41, "EOR", Eor, IndirectX);
    ops[0x45] = read(0x45, "EOR", Eor, ZeroPage);
    ops[0x46] = modify(0x46, "LSR", Lsr, ZeroPage);
    ops[0x48] = fixed(0x48, "PHA", Pha, Implied, 3);
    ops[0x49] = read(0x49, "EOR", Eor, Immediate);
    ops[0x4A] = modify(0x4A, "LSR", Lsr, Accumulator);
    ops[0x4C] = fixed(0x4C, "JMP", Jmp, Absolute, 3);
    ops[0x4D] = read(0x4D, "EOR", Eor, Absolute);
    ops[0x4E] = modify(0x4E, "LSR", Lsr, Absolute);
    ops[0x50] = branch(0x50, "BVC", Bvc);
    ops[0x51] = read(0x51, "EOR", Eor, IndirectY);
    ops[0x55] = read(0x55, "EOR", Eor, ZeroPageX);
    ops[0x56] = modify(0x56, "LSR", Lsr, ZeroPageX);
    ops[0x58] = implied(0x58, "CLI", Cli);
    ops[0x59] = read(0x59, "EOR", Eor, AbsoluteY);
    ops[0x5D] = read(0x5D, "EOR", Eor, AbsoluteX);
    ops[0x5E] = modify(0x5E, "LSR", Lsr, AbsoluteX);

    ops[0x60] = fixed(0x60, "RTS", Rts, Implied, 6);
    ops[0x61] = read(0x61, "ADC", Adc, IndirectX);
    ops[0x65] = read(0x65, "ADC", Adc, ZeroPage);
    ops[0x66] = modify(0x66, "ROR", Ror, ZeroPage);
    ops[0x68] = fixed(0x68, "PLA", Pla, Implied, 4);
    ops[0x69] = read(0x69, "ADC", Adc, Immediate);
    ops[0x6A] = modify(0x6A, "ROR", Ror, Accumulator);
    ops[0x6C] = fixed(0x6C, "JMP", Jmp, Indirect, 5);
    ops[0x6D] = read(0x6D, "ADC", Adc, Absolute);
    ops[0x6E] = modify(0x6E, "ROR", Ror, Absolute);
    ops[0x70] = branch(0x70, "BVS", Bvs);
    ops[0x71] = read(0x71, "ADC", Adc, IndirectY);
    ops[0x75] = read(0x75, "ADC", Adc, ZeroPageX);
    ops[0x76] = modify(0x76, "ROR", Ror, ZeroPageX);
    ops[0x78] = implied(0x78, "SEI", Sei);
    ops[0x79] = read(0x79, "ADC", Adc, AbsoluteY);
    ops[0x7D] = read(0x7D, "ADC", Adc, AbsoluteX);
    ops[0x7E] = modify(0x7E, "ROR", Ror, AbsoluteX);

    ops[0x81] = write(0x81, "STA", Sta, IndirectX);
    ops[0x84] = write(0x84, "STY", Sty, ZeroPage);
    ops[0x85] = write(0x85, "STA", Sta, ZeroPage);
    ops[0x86] = write(0x86, "STX", Stx, ZeroPage);
    ops[0x88] = implied(0x88, "DEY", Dey);
    ops[0x8A] = implied(0x8A, "TXA", Txa);
    ops[0x8C] = write(0x8C, "STY", Sty, Absolute);
    ops[0x8D] = write(0x8D, "STA", Sta, Absolute);
    ops[0x8E] = write(0x8E, "STX", Stx, Absolute);
    ops[0x90] = branch(0x90, "BCC", Bcc);
    ops[0x91] = write(0x91, "STA", Sta, IndirectY);
    ops[0x94] = write(0x94, "STY", Sty, ZeroPageX);
    ops[0x95] = write(0x95, "STA", Sta, ZeroPageX);
    ops[0x96] = write(0x96, "STX", Stx, ZeroPageY);
    ops[0x98] = implied(0x98, "TYA", Tya);
    ops[0x99] = write(0x99, "STA", Sta, AbsoluteY);
    ops[0x9A] = implied(0x9A, "TXS", Txs);
    ops[0x9D] = write(0x9D, "STA", Sta, AbsoluteX);

    ops[0xA0] = read(0xA0, "LDY", Ldy, Immediate);
    ops[0xA1] = read(0xA1, "LDA", Lda, IndirectX);
    ops[0xA2] = read(0xA2, "LDX", Ldx, Immediate);
    ops[0xA4] = read(0xA4, "LDY", Ldy, ZeroPage);
    ops[0xA5] = read(0xA5, "LDA", Lda, ZeroPage);
    ops[0xA6] = read(0xA6, "LDX", Ldx, ZeroPage);
    ops[0xA8] = implied(0xA8, "TAY", Tay);
    ops[0xA9] = read(0xA9, "LDA", Lda, Immediate);
    ops[0xAA] = implied(0xAA, "TAX", Tax);
    ops[0xAC] = read(0xAC, "LDY", Ldy, Absolute);
    ops[0xAD] = read(0xAD, "LDA", Lda, Absolute);
    ops[0xAE] = read(0xAE, "LDX", Ldx, Absolute);
    ops[0xB0] = branch(0xB0, "BCS", Bcs);
    ops[0xB1] = read(0xB1, "LDA", Lda, IndirectY);
    ops[0xB4] = read(0xB4, "LDY", Ldy, ZeroPageX);
    ops[0xB5] = read(0xB5, "LDA", Lda, ZeroPageX);
    ops[0xB6] = read(0xB6, "LDX", Ldx, ZeroPageY);
    ops[0xB8] = implied(0xB8, "CLV", Clv);
    ops[0xB9] = read(0xB9, "LDA", Lda, AbsoluteY);
    ops[0xBA] = implied(0xBA, "TSX", Tsx);
    ops[0xBC] = read(0xBC, "LDY", Ldy, AbsoluteX);
    ops[0xBD] = read(0xBD, "LDA", Lda, AbsoluteX);
    ops[0xBE] = read(0xBE, "LDX", Ldx, AbsoluteY);

    ops[0xC0] = read(0xC0, "CPY", Cpy, Immediate);
    ops[0xC1] = read(0xC1, "CMP", Cmp, IndirectX);
    ops[0xC4] = read(0xC4, "CPY", Cpy, ZeroPage);
    ops[0xC5] = read(0xC5, "CMP", Cmp, ZeroPage);
    ops[0xC6] = modify(0xC6, "DEC", Dec, ZeroPage);
    ops[0xC8] = implied(0xC8, "INY", Iny);
    ops[0xC9] = read(0xC9, "CMP", Cmp, Immediate);
    ops[0xCA] = implied(0xCA, "DEX", Dex);
    ops[0xCC] = read(0xCC, "CPY", Cpy, Absolute);
    ops[0xCD] = read(0xCD, "CMP", Cmp, Absolute);
    ops[0xCE] = modify(0xCE, "DEC", Dec, Absolute);
    ops[0xD0] = branch(0xD0, "BNE", Bne);
    ops[0xD1] = read(0xD1, "CMP", Cmp, IndirectY);
    ops[0xD5] = read(0xD5, "CMP", Cmp, ZeroPageX);
    ops[0xD6] = modify(0xD6, "DEC", Dec, ZeroPageX);
    ops[0xD8] = implied(0xD8, "CLD", Cld);
    ops[0xD9] = read(0xD9, "CMP", Cmp, AbsoluteY);
    ops[0xDD] = read(0xDD, "CMP", Cmp, AbsoluteX);
    ops[0xDE] = modify(0xDE, "DEC", Dec, AbsoluteX);

    ops[0xE0] = read(0xE0, "CPX", Cpx, Immediate);
    ops[0xE1] = read(0xE1, "SBC", Sbc, IndirectX);
    ops[0xE4] = read(0xE4, "CPX", Cpx, ZeroPage);
    ops[0xE5] = read(0xE5, "SBC", Sbc, ZeroPage);
    ops[0xE6] = modify(0xE6, "INC", Inc, ZeroPage);
    ops[0xE8] = implied(0xE8, "INX", Inx);
    ops[0xE9] = read(0xE9, "SBC", Sbc, Immediate);
    ops[0xEA] = implied(0xEA, "NOP", Nop);
    ops[0xEC] = read(0xEC, "CPX", Cpx, Absolute);
    ops[0xED] = read(0xED, "SBC", Sbc, Absolute);
    ops[0xEE] = modify(0xEE, "INC", Inc, Absolute);
    ops[0xF0] = branch(0xF0, "BEQ", Beq);
    ops[0xF1] = read(0xF1, "SBC", Sbc, IndirectY);
    ops[0xF5] = read(0xF5, "SBC", Sbc, ZeroPageX);
    ops[0xF6] = modify(0xF6, "INC", Inc, ZeroPageX);
    ops[0xF8] = implied(0xF8, "SED", Sed);
    ops[0xF9] = read(0xF9, "SBC", Sbc, AbsoluteY);
    ops[0xFD] = read(0xFD, "SBC", Sbc, AbsoluteX);
    ops[0xFE] = modify(0xFE, "INC", Inc, AbsoluteX);

    // Undocumented NOPs. The operand forms still perform their reads.
    ops[0x1A] = implied(0x1A, "NOP", Nop).unofficial();
    ops[0x3A] = implied(0x3A, "NOP", Nop).unofficial();
    ops[0x5A] = implied(0x5A, "NOP", Nop).unofficial();
    ops[0x7A] = implied(0x7A, "NOP", Nop).unofficial();
    ops[0xDA] = implied(0xDA, "NOP", Nop).unofficial();
    ops[0xFA] = implied(0xFA, "NOP", Nop).unofficial();
    ops[0x80] = read(0x80, "NOP", Nop, Immediate).unofficial();
    ops[0x82] = read(0x82, "NOP", Nop, Immediate).unofficial();
    ops[0x89] = read(0x89, "NOP", Nop, Immediate).unofficial();
    ops[0xC2] = read(0xC2, "NOP", Nop, Immediate).unofficial();
    ops[0xE2] = read(0xE2, "NOP", Nop, Immediate).unofficial();
    ops[0x04] = read(0x04, "NOP", Nop, ZeroPage).unofficial();
    ops[0x44] = read(0x44, "NOP", Nop, ZeroPage).unofficial();
    ops[0x64] = read(0x64, "NOP", Nop, ZeroPage).unofficial();
    ops[0x14] = read(0x14, "NOP", Nop, ZeroPageX).unofficial();
    ops[0x34] = read(0x34, "NOP", Nop, ZeroPageX).unofficial();
    ops[0x54] = read(0x54, "NOP", Nop, ZeroPageX).unofficial();
    ops[0x74] = read(0x74, "NOP", Nop, ZeroPageX).unofficial();
    ops[0xD4] = read(0xD4, "NOP", Nop, ZeroPageX).unofficial();
    ops[0xF4] = read(0xF4, "NOP", Nop, ZeroPageX).unofficial();
    ops[0x0C] = read(0x0C, "NOP", Nop, Absolute).unofficial();
    ops[0x1C] = read(0x1C, "NOP", Nop, AbsoluteX).unofficial();
    ops[0x3C] = read(0x3C, "NOP", Nop, AbsoluteX).unofficial();
    ops[0x5C] = read(0x5C, "NOP", Nop, AbsoluteX).unofficial();
    ops[0x7C] = read(0x7C, "NOP", Nop, AbsoluteX).unofficial();
    ops[0xDC] = read(0xDC, "NOP", Nop, AbsoluteX).unofficial();
    ops[0xFC] = read(0xFC, "NOP", Nop, AbsoluteX).unofficial();

    ops[0xA3] = read(0xA3, "LAX", Lax, IndirectX).unofficial();
    ops[0xA7] = read(0xA7, "LAX", Lax, ZeroPage).unofficial();
    ops[0xAF] = read(0xAF, "LAX", Lax, Absolute).unofficial();
    ops[0xB3] = read(0xB3, "LAX", Lax, IndirectY).unofficial();
    ops[0xB7] = read(0xB7, "LAX", Lax, ZeroPageY).unofficial();
    ops[0xBF] = read(0xBF, "LAX", Lax, AbsoluteY).unofficial();
    ops[0xBB] = read(0xBB, "LAS", Las, AbsoluteY).unofficial();

    ops[0x83] = write(0x83, "SAX", Sax, IndirectX).unofficial();
    ops[0x87] = write(0x87, "SAX", Sax, ZeroPage).unofficial();
    ops[0x8F] = write(0x8F, "SAX", Sax, Absolute).unofficial();
    ops[0x97] = write(0x97, "SAX", Sax, ZeroPageY).unofficial();
    ops[0x93] = write(0x93, "SHA", Sha, IndirectY).unofficial();
    ops[0x9F] = write(0x9F, "SHA", Sha, AbsoluteY).unofficial();
    ops[0x9E] = write(0x9E, "SHX", Shx, AbsoluteY).unofficial();
    ops[0x9C] = write(0x9C, "SHY", Shy, AbsoluteX).unofficial();
    ops[0x9B] = write(0x9B, "TAS", Tas, AbsoluteY).unofficial();

    ops[0x0B] = read(0x0B, "ANC", Anc, Immediate).unofficial();
    ops[0x2B] = read(0x2B, "ANC", Anc, Immediate).unofficial();
    ops[0x4B] = read(0x4B, "ALR", Alr, Immediate).unofficial();
    ops[0x6B] = read(0x6B, "ARR", Arr, Immediate).unofficial();
    ops[0x8B] = read(0x8B, "XAA", Xaa, Immediate).unofficial();
    ops[0xAB] = read(0xAB, "LXA", Lxa, Immediate).unofficial();
    ops[0xCB] = read(0xCB, "AXS", Axs, Immediate).unofficial();
    ops[0xEB] = read(0xEB, "SBC", Sbc, Immediate).unofficial();

    // Combined read-modify-write groups share one column layout.
    let rmw_groups: [(u8, &'static str, Operation); 6] = [
        (0x03, "SLO", Slo),
        (0x23, "RLA", Rla),
        (0x43, "SRE", Sre),
        (0x63, "RRA", Rra),
        (0xC3, "DCP", Dcp),
        (0xE3, "ISB", Isb),
    ];
    let rmw_modes: [(u8, AddressingMode); 7] = [
        (0x00, IndirectX),
        (0x04, ZeroPage),
        (0x0C, Absolute),
        (0x10, IndirectY),
        (0x14, ZeroPageX),
        (0x18, AbsoluteY),
        (0x1C, AbsoluteX),
    ];
    let mut g = 0;
    while g < rmw_groups.len() {
        let (base, mnemonic, operation) = rmw_groups[g];
        let mut m = 0;
        while m < rmw_modes.len() {
            let (offset, mode) = rmw_modes[m];
            let code = base + offset;
            ops[code as usize] = modify(code, mnemonic, operation, mode).unofficial();
            m += 1;
        }
        g += 1;
    }

    // Remaining slots keep the JAM default but need their own code byte.
    let mut i = 0;
    while i < 256 {
        if matches!(ops[i].operation, Jam) {
            ops[i].code = i as u8;
        }
        i += 1;
    }

    ops
};

pub fn decode(code: u8) -> &'static Opcode {
    &OPCODES[code as usize]
}
