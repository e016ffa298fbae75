//! nestest-style execution trace.
//!
//! A record is taken just before an instruction executes, so the register
//! and cycle columns show the state the instruction starts from.

use std::fmt;

use serde::Serialize;

use super::bus::CpuBus;
use super::cpu::{Cpu, CpuRegisters};
use super::opcodes::{AddressingMode, Opcode, Operation, decode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub pc: u16,
    pub bytes: Vec<u8>,
    pub mnemonic: &'static str,
    pub official: bool,
    pub operand: String,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub scanline: u16,
    pub dot: u16,
    pub cycles: u64,
}

impl TraceRecord {
    /// Snapshot of the instruction at the CPU's PC. Memory is only peeked.
    pub fn capture<B: CpuBus>(cpu: &Cpu, bus: &B, scanline: u16, dot: u16) -> Self {
        let regs = cpu.registers();
        let pc = regs.pc;
        let opcode = decode(bus.peek(pc));
        let bytes: Vec<u8> = (0..opcode.size())
            .map(|i| bus.peek(pc.wrapping_add(i)))
            .collect();
        let operands = [
            bytes.get(1).copied().unwrap_or(0),
            bytes.get(2).copied().unwrap_or(0),
        ];

        Self {
            pc,
            operand: operand_text(bus, opcode, pc, operands, &regs),
            bytes,
            mnemonic: opcode.mnemonic,
            official: opcode.official,
            a: regs.a,
            x: regs.x,
            y: regs.y,
            p: regs.status.bits(),
            sp: regs.sp,
            scanline,
            dot,
            cycles: cpu.total_cycles(),
        }
    }

    /// Disassembly column only, e.g. `C000  4C F5 C5  JMP $C5F5`.
    pub fn disassembly(&self) -> String {
        let bytes = self
            .bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        let marker = if self.official { ' ' } else { '*' };
        format!(
            "{:04X}  {:<8} {}{} {}",
            self.pc, bytes, marker, self.mnemonic, self.operand
        )
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<47} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{:>3},{:>3} CYC:{}",
            self.disassembly(),
            self.a,
            self.x,
            self.y,
            self.p,
            self.sp,
            self.scanline,
            self.dot,
            self.cycles
        )
    }
}

fn operand_text<B: CpuBus>(
    bus: &B,
    opcode: &Opcode,
    pc: u16,
    operands: [u8; 2],
    regs: &CpuRegisters,
) -> String {
    let [lo, _] = operands;
    let word = u16::from_le_bytes(operands);

    match opcode.mode {
        AddressingMode::Implied => String::new(),
        AddressingMode::Accumulator => "A".to_string(),
        AddressingMode::Immediate => format!("#${lo:02X}"),
        AddressingMode::ZeroPage => format!("${lo:02X} = {:02X}", bus.peek(lo as u16)),
        AddressingMode::ZeroPageX => {
            let addr = lo.wrapping_add(regs.x);
            format!("${lo:02X},X @ {addr:02X} = {:02X}", bus.peek(addr as u16))
        }
        AddressingMode::ZeroPageY => {
            let addr = lo.wrapping_add(regs.y);
            format!("${lo:02X},Y @ {addr:02X} = {:02X}", bus.peek(addr as u16))
        }
        AddressingMode::Absolute => match opcode.operation {
            Operation::Jmp | Operation::Jsr => format!("${word:04X}"),
            _ => format!("${word:04X} = {:02X}", bus.peek(word)),
        },
        AddressingMode::AbsoluteX => {
            let addr = word.wrapping_add(regs.x as u16);
            format!("${word:04X},X @ {addr:04X} = {:02X}", bus.peek(addr))
        }
        AddressingMode::AbsoluteY => {
            let addr = word.wrapping_add(regs.y as u16);
            format!("${word:04X},Y @ {addr:04X} = {:02X}", bus.peek(addr))
        }
        AddressingMode::Indirect => {
            // Same page-wrap as the JMP ($xxFF) hardware bug.
            let hi_addr = (word & 0xFF00) | (word.wrapping_add(1) & 0x00FF);
            let target = u16::from_le_bytes([bus.peek(word), bus.peek(hi_addr)]);
            format!("(${word:04X}) = {target:04X}")
        }
        AddressingMode::IndirectX => {
            let ptr = lo.wrapping_add(regs.x);
            let addr = peek_zp_u16(bus, ptr);
            format!(
                "(${lo:02X},X) @ {ptr:02X} = {addr:04X} = {:02X}",
                bus.peek(addr)
            )
        }
        AddressingMode::IndirectY => {
            let base = peek_zp_u16(bus, lo);
            let addr = base.wrapping_add(regs.y as u16);
            format!(
                "(${lo:02X}),Y = {base:04X} @ {addr:04X} = {:02X}",
                bus.peek(addr)
            )
        }
        AddressingMode::Relative => {
            let target = pc.wrapping_add(2).wrapping_add(lo as i8 as u16);
            format!("${target:04X}")
        }
    }
}

fn peek_zp_u16<B: CpuBus>(bus: &B, ptr: u8) -> u16 {
    u16::from_le_bytes([bus.peek(ptr as u16), bus.peek(ptr.wrapping_add(1) as u16)])
}
