use super::bus::CpuBus;
use super::opcodes::{Access, AddressingMode, Opcode, Operation, decode};
use super::status::StatusRegister;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;
pub const STACK_BASE: u16 = 0x0100;
pub const STARTUP_CYCLES: u64 = 7;
pub const INTERRUPT_CYCLES: u64 = 7;

pub const OAMADDR: u16 = 0x2003;
pub const OAMDATA: u16 = 0x2004;
pub const OAM_DMA_BYTES: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub pc: u16,
    pub sp: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub status: StatusRegister,
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            pc: 0,
            sp: 0xFD,
            a: 0,
            x: 0,
            y: 0,
            status: StatusRegister {
                interrupt_disable: true,
                ..StatusRegister::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// Between boundaries; the current instruction's cycles are elapsing.
    FetchWait,
    /// The next tick dispatches an instruction or interrupt.
    Execute,
    Dma,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Nmi,
    Irq,
}

/// One decoded instruction, as retired.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub pc: u16,
    pub opcode: &'static Opcode,
    pub operands: [u8; 2],
    pub page_crossed: bool,
    pub cycles: u8,
}

#[derive(Debug, Clone, Copy)]
pub enum CpuEvent {
    Retired(Instruction),
    Interrupt(Interrupt),
    DmaFinished { page: u8 },
    Jammed { pc: u16, opcode: u8 },
}

/// OAM DMA in flight. Each step is one CPU cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OamDma {
    pub page: u8,
    pub step: u16,
    pub length: u16,
    latch: u8,
}

impl OamDma {
    /// 513 cycles when started on an odd CPU cycle, 514 on an even one.
    pub fn new(page: u8, start_cycle: u64) -> Self {
        let length = if start_cycle % 2 == 0 { 514 } else { 513 };
        Self {
            page,
            step: 0,
            length,
            latch: 0,
        }
    }

    fn alignment(&self) -> u16 {
        self.length - OAM_DMA_BYTES * 2
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Implied,
    Accumulator,
    Immediate(u8),
    Memory { addr: u16, base: u16 },
    Branch(u16),
}

pub struct Cpu {
    pub(crate) regs: CpuRegisters,
    cycles: u64,
    next_instruction_cycle: u64,
    nmi_latched: bool,
    irq_latched: bool,
    dma: Option<OamDma>,
    halted: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: CpuRegisters::default(),
            cycles: 0,
            next_instruction_cycle: STARTUP_CYCLES,
            nmi_latched: false,
            irq_latched: false,
            dma: None,
            halted: false,
        }
    }

    pub fn reset<B: CpuBus>(&mut self, bus: &mut B) {
        self.regs.sp = 0xFD;
        self.regs.status.interrupt_disable = true;
        self.regs.pc = read_u16(bus, RESET_VECTOR);
        self.cycles = 0;
        self.next_instruction_cycle = STARTUP_CYCLES;
        self.nmi_latched = false;
        self.irq_latched = false;
        self.dma = None;
        self.halted = false;
    }

    pub fn registers(&self) -> CpuRegisters {
        self.regs
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    pub fn total_cycles(&self) -> u64 {
        self.cycles
    }

    pub fn next_instruction_cycle(&self) -> u64 {
        self.next_instruction_cycle
    }

    pub fn nmi(&mut self) {
        self.nmi_latched = true;
    }

    pub fn irq(&mut self) {
        self.irq_latched = true;
    }

    pub fn clear_irq(&mut self) {
        self.irq_latched = false;
    }

    pub fn nmi_latched(&self) -> bool {
        self.nmi_latched
    }

    pub fn irq_latched(&self) -> bool {
        self.irq_latched
    }

    pub fn dma(&self) -> Option<OamDma> {
        self.dma
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn state(&self) -> CpuState {
        if self.halted {
            CpuState::Halted
        } else if self.dma.is_some() {
            CpuState::Dma
        } else if self.cycles == self.next_instruction_cycle {
            CpuState::Execute
        } else {
            CpuState::FetchWait
        }
    }

    /// True when the next tick fetches and executes a real opcode.
    pub fn about_to_fetch(&self) -> bool {
        self.state() == CpuState::Execute
            && !self.nmi_latched
            && !(self.irq_latched && !self.regs.status.interrupt_disable)
    }

    /// Advances one CPU cycle.
    pub fn clock<B: CpuBus>(&mut self, bus: &mut B) -> Option<CpuEvent> {
        if self.halted || self.cycles != self.next_instruction_cycle {
            self.cycles += 1;
            return None;
        }

        let event = if self.dma.is_some() {
            self.next_instruction_cycle += 1;
            self.step_dma(bus)
        } else if self.nmi_latched {
            self.nmi_latched = false;
            self.service_interrupt(bus, NMI_VECTOR);
            self.next_instruction_cycle += INTERRUPT_CYCLES;
            Some(CpuEvent::Interrupt(Interrupt::Nmi))
        } else if self.irq_latched && !self.regs.status.interrupt_disable {
            self.irq_latched = false;
            self.service_interrupt(bus, IRQ_VECTOR);
            self.next_instruction_cycle += INTERRUPT_CYCLES;
            Some(CpuEvent::Interrupt(Interrupt::Irq))
        } else {
            let instruction = self.execute(bus);
            self.next_instruction_cycle += instruction.cycles as u64;
            if instruction.opcode.operation == Operation::Jam {
                self.halted = true;
                Some(CpuEvent::Jammed {
                    pc: instruction.pc,
                    opcode: instruction.opcode.code,
                })
            } else {
                Some(CpuEvent::Retired(instruction))
            }
        };

        if let Some(page) = bus.take_dma_request() {
            self.dma = Some(OamDma::new(page, self.next_instruction_cycle));
        }

        self.cycles += 1;
        event
    }

    fn step_dma<B: CpuBus>(&mut self, bus: &mut B) -> Option<CpuEvent> {
        let dma = self.dma.as_mut()?;
        let alignment = dma.alignment();
        if dma.step == 0 {
            bus.write(OAMADDR, 0);
        }
        if dma.step >= alignment {
            let n = dma.step - alignment;
            if n % 2 == 0 {
                dma.latch = bus.read(((dma.page as u16) << 8) | (n / 2));
            } else {
                bus.write(OAMDATA, dma.latch);
            }
        }
        dma.step += 1;

        if dma.step < dma.length {
            return None;
        }
        let page = dma.page;
        self.dma = None;
        Some(CpuEvent::DmaFinished { page })
    }

    fn service_interrupt<B: CpuBus>(&mut self, bus: &mut B, vector: u16) {
        self.push_u16(bus, self.regs.pc);
        self.push(bus, self.regs.status.pack(false));
        self.regs.status.interrupt_disable = true;
        self.regs.pc = read_u16(bus, vector);
    }

    fn execute<B: CpuBus>(&mut self, bus: &mut B) -> Instruction {
        let pc = self.regs.pc;
        let opcode = decode(bus.read(pc));
        let mut operands = [0u8; 2];
        for i in 0..opcode.mode.operand_len() {
            operands[i as usize] = bus.read(pc.wrapping_add(1 + i));
        }
        self.regs.pc = pc.wrapping_add(opcode.size());

        let (operand, page_crossed) = self.resolve(bus, opcode, operands);
        let extra = self.run(bus, opcode, operand, page_crossed);
        let penalty = (opcode.page_penalty && page_crossed) as u8;
        // A taken branch reports 2 extra cycles only when it leaves the page.
        let page_crossed = if opcode.is_branch() {
            extra == 2
        } else {
            page_crossed
        };

        if opcode.operation == Operation::Jam {
            self.regs.pc = pc;
        }

        Instruction {
            pc,
            opcode,
            operands,
            page_crossed,
            cycles: opcode.cycles + penalty + extra,
        }
    }

    fn resolve<B: CpuBus>(
        &mut self,
        bus: &mut B,
        opcode: &Opcode,
        operands: [u8; 2],
    ) -> (Operand, bool) {
        let [lo, _] = operands;
        let word = u16::from_le_bytes(operands);
        let memory = |addr: u16, base: u16| Operand::Memory { addr, base };

        let (operand, crossed) = match opcode.mode {
            AddressingMode::Implied => (Operand::Implied, false),
            AddressingMode::Accumulator => (Operand::Accumulator, false),
            AddressingMode::Immediate => (Operand::Immediate(lo), false),
            AddressingMode::ZeroPage => (memory(lo as u16, lo as u16), false),
            AddressingMode::ZeroPageX => {
                (memory(lo.wrapping_add(self.regs.x) as u16, lo as u16), false)
            }
            AddressingMode::ZeroPageY => {
                (memory(lo.wrapping_add(self.regs.y) as u16, lo as u16), false)
            }
            AddressingMode::Absolute => (memory(word, word), false),
            AddressingMode::AbsoluteX => indexed(word, self.regs.x),
            AddressingMode::AbsoluteY => indexed(word, self.regs.y),
            AddressingMode::Indirect => {
                // The pointer high byte never carries into the next page.
                let hi_addr = (word & 0xFF00) | (word.wrapping_add(1) & 0x00FF);
                let target = u16::from_le_bytes([bus.read(word), bus.read(hi_addr)]);
                (memory(target, word), false)
            }
            AddressingMode::IndirectX => {
                let ptr = lo.wrapping_add(self.regs.x);
                let target = read_zp_u16(bus, ptr);
                (memory(target, ptr as u16), false)
            }
            AddressingMode::IndirectY => {
                let base = read_zp_u16(bus, lo);
                indexed(base, self.regs.y)
            }
            AddressingMode::Relative => {
                let target = self.regs.pc.wrapping_add(lo as i8 as u16);
                (Operand::Branch(target), false)
            }
        };

        // Indexed accesses read the un-carried address first; reads only do
        // so when the index actually carried.
        if let Operand::Memory { addr, base } = operand {
            let indexed_mode = opcode.mode.is_indexed_across_pages();
            let always = matches!(opcode.access, Access::Write | Access::Modify);
            if indexed_mode && (crossed || always) {
                let _ = bus.read((base & 0xFF00) | (addr & 0x00FF));
            }
        }

        (operand, crossed)
    }

    /// Runs the operation, returning cycles beyond the table's base cost.
    fn run<B: CpuBus>(
        &mut self,
        bus: &mut B,
        opcode: &Opcode,
        operand: Operand,
        page_crossed: bool,
    ) -> u8 {
        let status = self.regs.status;
        match opcode.operation {
            Operation::Lda => {
                let value = self.load(bus, operand);
                self.regs.a = value;
                self.regs.status.set_zn(value);
            }
            Operation::Ldx => {
                let value = self.load(bus, operand);
                self.regs.x = value;
                self.regs.status.set_zn(value);
            }
            Operation::Ldy => {
                let value = self.load(bus, operand);
                self.regs.y = value;
                self.regs.status.set_zn(value);
            }
            Operation::Sta => self.store(bus, operand, self.regs.a),
            Operation::Stx => self.store(bus, operand, self.regs.x),
            Operation::Sty => self.store(bus, operand, self.regs.y),

            Operation::Adc => {
                let value = self.load(bus, operand);
                self.adc(value);
            }
            Operation::Sbc => {
                let value = self.load(bus, operand);
                self.adc(value ^ 0xFF);
            }
            Operation::And => {
                let value = self.load(bus, operand);
                self.regs.a &= value;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Ora => {
                let value = self.load(bus, operand);
                self.regs.a |= value;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Eor => {
                let value = self.load(bus, operand);
                self.regs.a ^= value;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Cmp => {
                let value = self.load(bus, operand);
                self.compare(self.regs.a, value);
            }
            Operation::Cpx => {
                let value = self.load(bus, operand);
                self.compare(self.regs.x, value);
            }
            Operation::Cpy => {
                let value = self.load(bus, operand);
                self.compare(self.regs.y, value);
            }
            Operation::Bit => {
                let value = self.load(bus, operand);
                self.regs.status.zero = self.regs.a & value == 0;
                self.regs.status.overflow = value & 0x40 != 0;
                self.regs.status.negative = value & 0x80 != 0;
            }

            Operation::Asl => {
                self.modify(bus, operand, Self::asl);
            }
            Operation::Lsr => {
                self.modify(bus, operand, Self::lsr);
            }
            Operation::Rol => {
                self.modify(bus, operand, Self::rol);
            }
            Operation::Ror => {
                self.modify(bus, operand, Self::ror);
            }
            Operation::Inc => {
                self.modify(bus, operand, |cpu, v| {
                    let out = v.wrapping_add(1);
                    cpu.regs.status.set_zn(out);
                    out
                });
            }
            Operation::Dec => {
                self.modify(bus, operand, |cpu, v| {
                    let out = v.wrapping_sub(1);
                    cpu.regs.status.set_zn(out);
                    out
                });
            }

            Operation::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.regs.status.set_zn(self.regs.x);
            }
            Operation::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.regs.status.set_zn(self.regs.y);
            }
            Operation::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.regs.status.set_zn(self.regs.x);
            }
            Operation::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.regs.status.set_zn(self.regs.y);
            }
            Operation::Tax => {
                self.regs.x = self.regs.a;
                self.regs.status.set_zn(self.regs.x);
            }
            Operation::Tay => {
                self.regs.y = self.regs.a;
                self.regs.status.set_zn(self.regs.y);
            }
            Operation::Txa => {
                self.regs.a = self.regs.x;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Tya => {
                self.regs.a = self.regs.y;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Tsx => {
                self.regs.x = self.regs.sp;
                self.regs.status.set_zn(self.regs.x);
            }
            Operation::Txs => self.regs.sp = self.regs.x,

            Operation::Clc => self.regs.status.carry = false,
            Operation::Sec => self.regs.status.carry = true,
            Operation::Cli => self.regs.status.interrupt_disable = false,
            Operation::Sei => self.regs.status.interrupt_disable = true,
            Operation::Cld => self.regs.status.decimal = false,
            Operation::Sed => self.regs.status.decimal = true,
            Operation::Clv => self.regs.status.overflow = false,

            Operation::Bcc => return self.branch(operand, !status.carry),
            Operation::Bcs => return self.branch(operand, status.carry),
            Operation::Bne => return self.branch(operand, !status.zero),
            Operation::Beq => return self.branch(operand, status.zero),
            Operation::Bpl => return self.branch(operand, !status.negative),
            Operation::Bmi => return self.branch(operand, status.negative),
            Operation::Bvc => return self.branch(operand, !status.overflow),
            Operation::Bvs => return self.branch(operand, status.overflow),

            Operation::Jmp => {
                if let Operand::Memory { addr, .. } = operand {
                    self.regs.pc = addr;
                }
            }
            Operation::Jsr => {
                if let Operand::Memory { addr, .. } = operand {
                    self.push_u16(bus, self.regs.pc.wrapping_sub(1));
                    self.regs.pc = addr;
                }
            }
            Operation::Rts => {
                self.regs.pc = self.pop_u16(bus).wrapping_add(1);
            }
            Operation::Rti => {
                let p = self.pop(bus);
                self.regs.status = StatusRegister::unpack(p);
                self.regs.pc = self.pop_u16(bus);
            }
            Operation::Brk => {
                // Skip the padding byte.
                self.push_u16(bus, self.regs.pc.wrapping_add(1));
                self.push(bus, self.regs.status.pack(true));
                self.regs.status.interrupt_disable = true;
                self.regs.pc = read_u16(bus, IRQ_VECTOR);
            }
            Operation::Pha => self.push(bus, self.regs.a),
            Operation::Php => self.push(bus, self.regs.status.pack(true)),
            Operation::Pla => {
                self.regs.a = self.pop(bus);
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Plp => {
                let p = self.pop(bus);
                self.regs.status = StatusRegister::unpack(p);
            }

            Operation::Nop => {
                if !matches!(operand, Operand::Implied) {
                    let _ = self.load(bus, operand);
                }
            }

            Operation::Lax => {
                let value = self.load(bus, operand);
                self.regs.a = value;
                self.regs.x = value;
                self.regs.status.set_zn(value);
            }
            Operation::Sax => self.store(bus, operand, self.regs.a & self.regs.x),
            Operation::Las => {
                let value = self.load(bus, operand);
                let value = value & self.regs.sp;
                self.regs.a = value;
                self.regs.x = value;
                self.regs.sp = value;
                self.regs.status.set_zn(value);
            }
            Operation::Slo => {
                let out = self.modify(bus, operand, Self::asl);
                self.regs.a |= out;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Rla => {
                let out = self.modify(bus, operand, Self::rol);
                self.regs.a &= out;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Sre => {
                let out = self.modify(bus, operand, Self::lsr);
                self.regs.a ^= out;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Rra => {
                let out = self.modify(bus, operand, Self::ror);
                self.adc(out);
            }
            Operation::Dcp => {
                let out = self.modify(bus, operand, |_, v| v.wrapping_sub(1));
                self.compare(self.regs.a, out);
            }
            Operation::Isb => {
                let out = self.modify(bus, operand, |_, v| v.wrapping_add(1));
                self.adc(out ^ 0xFF);
            }
            Operation::Anc => {
                let value = self.load(bus, operand);
                self.regs.a &= value;
                self.regs.status.set_zn(self.regs.a);
                self.regs.status.carry = self.regs.status.negative;
            }
            Operation::Alr => {
                let value = self.load(bus, operand);
                let masked = self.regs.a & value;
                self.regs.a = self.lsr(masked);
            }
            Operation::Arr => {
                let value = self.load(bus, operand);
                let out = ((self.regs.a & value) >> 1) | ((status.carry as u8) << 7);
                self.regs.a = out;
                self.regs.status.set_zn(out);
                self.regs.status.carry = out & 0x40 != 0;
                self.regs.status.overflow = ((out >> 6) ^ (out >> 5)) & 0x01 != 0;
            }
            Operation::Xaa => {
                let value = self.load(bus, operand);
                self.regs.a = (self.regs.a | 0xEE) & self.regs.x & value;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Lxa => {
                let value = self.load(bus, operand);
                self.regs.a = (self.regs.a | 0xEE) & value;
                self.regs.x = self.regs.a;
                self.regs.status.set_zn(self.regs.a);
            }
            Operation::Axs => {
                let value = self.load(bus, operand);
                let masked = self.regs.a & self.regs.x;
                self.regs.status.carry = masked >= value;
                self.regs.x = masked.wrapping_sub(value);
                self.regs.status.set_zn(self.regs.x);
            }
            Operation::Sha => {
                let mask = self.regs.a & self.regs.x;
                self.unstable_store(bus, operand, page_crossed, mask, Some(self.regs.x));
            }
            Operation::Shx => {
                self.unstable_store(bus, operand, page_crossed, self.regs.x, None);
            }
            Operation::Shy => {
                self.unstable_store(bus, operand, page_crossed, self.regs.y, None);
            }
            Operation::Tas => {
                self.regs.sp = self.regs.a & self.regs.x;
                let mask = self.regs.sp;
                self.unstable_store(bus, operand, page_crossed, mask, Some(self.regs.x));
            }
            Operation::Jam => {}
        }
        0
    }

    fn load<B: CpuBus>(&mut self, bus: &mut B, operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(value) => value,
            Operand::Accumulator => self.regs.a,
            Operand::Memory { addr, .. } => bus.read(addr),
            Operand::Implied | Operand::Branch(_) => 0,
        }
    }

    fn store<B: CpuBus>(&mut self, bus: &mut B, operand: Operand, value: u8) {
        if let Operand::Memory { addr, .. } = operand {
            bus.write(addr, value);
        }
    }

    /// Read-modify-write. Memory targets see the original value written back
    /// before the result.
    fn modify<B: CpuBus>(
        &mut self,
        bus: &mut B,
        operand: Operand,
        f: impl FnOnce(&mut Self, u8) -> u8,
    ) -> u8 {
        match operand {
            Operand::Accumulator => {
                let a = self.regs.a;
                let out = f(self, a);
                self.regs.a = out;
                out
            }
            Operand::Memory { addr, .. } => {
                let value = bus.read(addr);
                bus.write(addr, value);
                let out = f(self, value);
                bus.write(addr, out);
                out
            }
            _ => 0,
        }
    }

    /// SHA/SHX/SHY/TAS: the stored value is ANDed with the base high byte
    /// plus one, and a carried index corrupts the written high byte.
    fn unstable_store<B: CpuBus>(
        &mut self,
        bus: &mut B,
        operand: Operand,
        page_crossed: bool,
        source: u8,
        high_mask: Option<u8>,
    ) {
        let Operand::Memory { addr, base } = operand else {
            return;
        };
        let h = ((base >> 8) as u8).wrapping_add(1);
        let value = source & h;
        let addr = if page_crossed {
            let hi = match high_mask {
                Some(mask) => h & mask,
                None => value,
            };
            ((hi as u16) << 8) | (addr & 0x00FF)
        } else {
            addr
        };
        bus.write(addr, value);
    }

    fn branch(&mut self, operand: Operand, condition: bool) -> u8 {
        let Operand::Branch(target) = operand else {
            return 0;
        };
        if !condition {
            return 0;
        }
        let crossed = (self.regs.pc & 0xFF00) != (target & 0xFF00);
        self.regs.pc = target;
        1 + crossed as u8
    }

    fn adc(&mut self, value: u8) {
        let a = self.regs.a;
        let sum = a as u16 + value as u16 + self.regs.status.carry as u16;
        let out = sum as u8;
        self.regs.status.carry = sum > 0xFF;
        self.regs.status.overflow = ((a ^ out) & (value ^ out) & 0x80) != 0;
        self.regs.a = out;
        self.regs.status.set_zn(out);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.regs.status.carry = register >= value;
        self.regs.status.set_zn(register.wrapping_sub(value));
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.regs.status.carry = value & 0x80 != 0;
        let out = value << 1;
        self.regs.status.set_zn(out);
        out
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.regs.status.carry = value & 0x01 != 0;
        let out = value >> 1;
        self.regs.status.set_zn(out);
        out
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.regs.status.carry as u8;
        self.regs.status.carry = value & 0x80 != 0;
        let out = (value << 1) | carry_in;
        self.regs.status.set_zn(out);
        out
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = (self.regs.status.carry as u8) << 7;
        self.regs.status.carry = value & 0x01 != 0;
        let out = (value >> 1) | carry_in;
        self.regs.status.set_zn(out);
        out
    }

    fn push<B: CpuBus>(&mut self, bus: &mut B, value: u8) {
        bus.write(STACK_BASE | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    fn pop<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        bus.read(STACK_BASE | self.regs.sp as u16)
    }

    fn push_u16<B: CpuBus>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.push(bus, hi);
        self.push(bus, lo);
    }

    fn pop_u16<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pop(bus);
        let hi = self.pop(bus);
        u16::from_le_bytes([lo, hi])
    }
}

fn indexed(base: u16, index: u8) -> (Operand, bool) {
    let addr = base.wrapping_add(index as u16);
    let crossed = (base & 0xFF00) != (addr & 0xFF00);
    (Operand::Memory { addr, base }, crossed)
}

fn read_u16<B: CpuBus>(bus: &mut B, addr: u16) -> u16 {
    let lo = bus.read(addr);
    let hi = bus.read(addr.wrapping_add(1));
    u16::from_le_bytes([lo, hi])
}

fn read_zp_u16<B: CpuBus>(bus: &mut B, ptr: u8) -> u16 {
    let lo = bus.read(ptr as u16);
    let hi = bus.read(ptr.wrapping_add(1) as u16);
    u16::from_le_bytes([lo, hi])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 64 KiB of plain RAM with a $4014 latch and a log of writes.
    pub(crate) struct FlatBus {
        pub mem: Vec<u8>,
        pub writes: Vec<(u16, u8)>,
        pub reads: Vec<u16>,
        dma_request: Option<u8>,
    }

    impl FlatBus {
        pub fn with_program(origin: u16, program: &[u8]) -> Self {
            let mut mem = vec![0u8; 0x10000];
            mem[origin as usize..origin as usize + program.len()].copy_from_slice(program);
            mem[RESET_VECTOR as usize] = origin as u8;
            mem[RESET_VECTOR as usize + 1] = (origin >> 8) as u8;
            Self {
                mem,
                writes: Vec::new(),
                reads: Vec::new(),
                dma_request: None,
            }
        }

        fn oam_writes(&self) -> Vec<u8> {
            self.writes
                .iter()
                .filter(|(addr, _)| *addr == OAMDATA)
                .map(|(_, value)| *value)
                .collect()
        }
    }

    impl CpuBus for FlatBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.reads.push(addr);
            self.mem[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            if addr == 0x4014 {
                self.dma_request = Some(value);
            }
            self.writes.push((addr, value));
            self.mem[addr as usize] = value;
        }

        fn peek(&self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }

        fn take_dma_request(&mut self) -> Option<u8> {
            self.dma_request.take()
        }
    }

    fn boot(program: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::with_program(0x8000, program);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    /// Clocks until the next dispatch and returns its event and cost.
    fn dispatch(cpu: &mut Cpu, bus: &mut FlatBus) -> (CpuEvent, u64) {
        loop {
            let before = cpu.next_instruction_cycle();
            if let Some(event) = cpu.clock(bus) {
                return (event, cpu.next_instruction_cycle() - before);
            }
        }
    }

    fn step(cpu: &mut Cpu, bus: &mut FlatBus) -> u64 {
        let (event, cycles) = dispatch(cpu, bus);
        assert!(matches!(event, CpuEvent::Retired(_)), "{event:?}");
        cycles
    }

    #[test]
    fn reset_loads_vector_and_primes_startup_cost() {
        let (cpu, _) = boot(&[0xEA]);
        let regs = cpu.registers();
        assert_eq!(regs.pc, 0x8000);
        assert_eq!(regs.sp, 0xFD);
        assert!(regs.status.interrupt_disable);
        assert_eq!(regs.status.bits(), 0x24);
        assert_eq!(cpu.total_cycles(), 0);
        assert_eq!(cpu.next_instruction_cycle(), STARTUP_CYCLES);
    }

    #[test]
    fn first_instruction_executes_on_cycle_seven() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x42]);
        for _ in 0..7 {
            assert!(cpu.clock(&mut bus).is_none());
            assert_eq!(cpu.registers().a, 0);
        }
        assert_eq!(cpu.state(), CpuState::Execute);
        assert!(cpu.clock(&mut bus).is_some());
        assert_eq!(cpu.registers().a, 0x42);
        assert_eq!(cpu.total_cycles(), 8);
        assert_eq!(cpu.next_instruction_cycle(), 9);
        assert_eq!(cpu.state(), CpuState::FetchWait);
    }

    #[test]
    fn adc_sets_carry_and_overflow() {
        // CLC; LDA #$50; ADC #$50 -> $A0, V set, C clear
        let (mut cpu, mut bus) = boot(&[0x18, 0xA9, 0x50, 0x69, 0x50]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        let regs = cpu.registers();
        assert_eq!(regs.a, 0xA0);
        assert!(regs.status.overflow);
        assert!(!regs.status.carry);
        assert!(regs.status.negative);

        // SEC; LDA #$FF; ADC #$01 -> $01 with carry out
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0xFF, 0x69, 0x01]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        let regs = cpu.registers();
        assert_eq!(regs.a, 0x01);
        assert!(regs.status.carry);
        assert!(!regs.status.overflow);
    }

    #[test]
    fn sbc_borrows_through_carry() {
        // SEC; LDA #$50; SBC #$F0 -> $60, borrow, no overflow
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0x50, 0xE9, 0xF0]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        let regs = cpu.registers();
        assert_eq!(regs.a, 0x60);
        assert!(!regs.status.carry);
        assert!(!regs.status.overflow);

        // SEC; LDA #$D0; SBC #$70 -> $60, signed overflow
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0xD0, 0xE9, 0x70]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        let regs = cpu.registers();
        assert_eq!(regs.a, 0x60);
        assert!(regs.status.carry);
        assert!(regs.status.overflow);
    }

    #[test]
    fn indexed_read_pays_for_page_cross() {
        // LDX #$01; LDA $10FF,X; LDA $1000,X
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0xBD, 0xFF, 0x10, 0xBD, 0x00, 0x10]);
        bus.mem[0x1100] = 0x77;
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.registers().a, 0x77);
        assert!(bus.reads.contains(&0x1000), "dummy read at un-carried address");
        assert_eq!(step(&mut cpu, &mut bus), 4);
    }

    #[test]
    fn indirect_y_read_pays_for_page_cross() {
        // LDY #$10; LDA ($20),Y with ($20) = $12F8
        let (mut cpu, mut bus) = boot(&[0xA0, 0x10, 0xB1, 0x20]);
        bus.mem[0x20] = 0xF8;
        bus.mem[0x21] = 0x12;
        bus.mem[0x1308] = 0x5A;
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.registers().a, 0x5A);
    }

    #[test]
    fn stores_cost_the_same_with_or_without_page_cross() {
        // LDX #$01; STA $10FF,X; STA $1000,X
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0x9D, 0xFF, 0x10, 0x9D, 0x00, 0x10]);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(step(&mut cpu, &mut bus), 5);
    }

    #[test]
    fn rmw_writes_original_value_before_result() {
        // INC $10
        let (mut cpu, mut bus) = boot(&[0xE6, 0x10]);
        bus.mem[0x10] = 0x41;
        assert_eq!(step(&mut cpu, &mut bus), 5);
        let writes: Vec<_> = bus.writes.iter().filter(|(a, _)| *a == 0x10).collect();
        assert_eq!(writes, vec![&(0x10, 0x41), &(0x10, 0x42)]);
    }

    #[test]
    fn branch_costs_depend_on_outcome_and_page() {
        // BNE not taken (Z set by LDA #0), then BEQ taken within page.
        let (mut cpu, mut bus) = boot(&[0xA9, 0x00, 0xD0, 0x10, 0xF0, 0x02]);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 2);
        assert_eq!(cpu.registers().pc, 0x8004);
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.registers().pc, 0x8008);
    }

    #[test]
    fn branch_across_page_costs_four() {
        let mut program = vec![0xEA; 0x100];
        // At $80F0: SEC; BCS +$20 -> $8113
        program[0xF0] = 0x38;
        program[0xF1] = 0xB0;
        program[0xF2] = 0x20;
        let (mut cpu, mut bus) = boot(&program);
        cpu.set_pc(0x80F0);
        step(&mut cpu, &mut bus);
        let (event, cycles) = dispatch(&mut cpu, &mut bus);
        assert_eq!(cycles, 4);
        assert_eq!(cpu.registers().pc, 0x8113);
        let CpuEvent::Retired(instruction) = event else {
            panic!("{event:?}");
        };
        assert!(instruction.page_crossed);
        assert_eq!(instruction.cycles, 4);
    }

    #[test]
    fn branch_within_page_does_not_report_crossing() {
        let (mut cpu, mut bus) = boot(&[0x38, 0xB0, 0x02]);
        step(&mut cpu, &mut bus);
        let (event, cycles) = dispatch(&mut cpu, &mut bus);
        assert_eq!(cycles, 3);
        let CpuEvent::Retired(instruction) = event else {
            panic!("{event:?}");
        };
        assert!(!instruction.page_crossed);
    }

    #[test]
    fn backward_branch_uses_signed_offset() {
        // $8000: NOP; $8001: BCC -3 -> $8000
        let (mut cpu, mut bus) = boot(&[0xEA, 0x90, 0xFD]);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.registers().pc, 0x8000);
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let (mut cpu, mut bus) = boot(&[0x6C, 0xFF, 0x02]);
        bus.mem[0x02FF] = 0x34;
        bus.mem[0x0200] = 0x12;
        bus.mem[0x0300] = 0x99;
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.registers().pc, 0x1234);
    }

    #[test]
    fn jsr_and_rts_round_trip() {
        // JSR $8010 ... $8010: RTS
        let mut program = vec![0xEA; 0x20];
        program[0..3].copy_from_slice(&[0x20, 0x10, 0x80]);
        program[0x10] = 0x60;
        let (mut cpu, mut bus) = boot(&program);
        assert_eq!(step(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.registers().pc, 0x8010);
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x02);
        assert_eq!(step(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.registers().pc, 0x8003);
        assert_eq!(cpu.registers().sp, 0xFD);
    }

    #[test]
    fn brk_pushes_break_flag_and_uses_irq_vector() {
        let (mut cpu, mut bus) = boot(&[0x00, 0xEA]);
        bus.mem[0xFFFE] = 0x00;
        bus.mem[0xFFFF] = 0x90;
        assert_eq!(step(&mut cpu, &mut bus), 7);
        assert_eq!(cpu.registers().pc, 0x9000);
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x02);
        assert_eq!(bus.mem[0x01FB] & 0x30, 0x30);
    }

    #[test]
    fn php_plp_ignore_break_and_unused_bits() {
        // PHP; PLA -> A holds pushed flags with B set
        let (mut cpu, mut bus) = boot(&[0x08, 0x68, 0xA9, 0xFF, 0x48, 0x28]);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.registers().a, 0x34);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.registers().status.bits(), 0xEF);
    }

    #[test]
    fn nmi_is_serviced_at_the_next_boundary() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0xEA]);
        bus.mem[0xFFFA] = 0x00;
        bus.mem[0xFFFB] = 0xA0;
        step(&mut cpu, &mut bus);
        cpu.nmi();
        // Mid-instruction ticks leave it latched.
        assert!(cpu.clock(&mut bus).is_none());
        assert!(cpu.nmi_latched());

        let (event, cycles) = dispatch(&mut cpu, &mut bus);
        assert!(matches!(event, CpuEvent::Interrupt(Interrupt::Nmi)));
        assert_eq!(cycles, 7);
        assert_eq!(cpu.registers().pc, 0xA000);
        assert!(!cpu.nmi_latched());
        assert_eq!(bus.mem[0x01FB] & 0x30, 0x20, "B clear, bit 5 set");
        assert_eq!(u16::from_le_bytes([bus.mem[0x01FC], bus.mem[0x01FD]]), 0x8001);
    }

    #[test]
    fn irq_waits_for_interrupt_disable_to_clear() {
        // SEI is already set by reset. NOP; CLI; NOP
        let (mut cpu, mut bus) = boot(&[0xEA, 0x58, 0xEA]);
        bus.mem[0xFFFE] = 0x00;
        bus.mem[0xFFFF] = 0xB0;
        cpu.irq();
        cpu.irq();
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert!(cpu.irq_latched());
        let (event, _) = dispatch(&mut cpu, &mut bus);
        assert!(matches!(event, CpuEvent::Interrupt(Interrupt::Irq)));
        assert_eq!(cpu.registers().pc, 0xB000);
        assert!(cpu.registers().status.interrupt_disable);
        assert!(!cpu.irq_latched());
    }

    #[test]
    fn rti_restores_status_and_pc() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0x40]);
        bus.mem[0x01FE] = 0xC3;
        bus.mem[0x01FF] = 0x34;
        bus.mem[0x0100] = 0x12;
        cpu.regs.sp = 0xFD;
        cpu.set_pc(0x8001);
        assert_eq!(step(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.registers().pc, 0x1234);
        assert_eq!(cpu.registers().status.bits(), 0xE3);
    }

    fn run_dma(program: &[u8], zp_page: u8) -> (Cpu, FlatBus, u64) {
        let (mut cpu, mut bus) = boot(program);
        bus.mem[0x0000] = zp_page;
        for i in 0..256usize {
            bus.mem[0x0200 + i] = i as u8 ^ 0x5A;
        }
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        let start = cpu.next_instruction_cycle();
        assert!(cpu.dma().is_some());
        loop {
            if let (CpuEvent::Retired(_), _) = dispatch(&mut cpu, &mut bus) {
                break;
            }
        }
        let retired_at = cpu.total_cycles() - 1;
        (cpu, bus, retired_at - start)
    }

    #[test]
    fn dma_started_on_odd_cycle_stalls_513() {
        // LDA #$02 (7..9); STA $4014 (9..13); DMA starts on 13.
        let (_, bus, stall) = run_dma(&[0xA9, 0x02, 0x8D, 0x14, 0x40, 0xEA], 0);
        assert_eq!(stall, 513);
        let expected: Vec<u8> = (0..256usize).map(|i| i as u8 ^ 0x5A).collect();
        assert_eq!(bus.oam_writes(), expected);
    }

    #[test]
    fn dma_started_on_even_cycle_stalls_514() {
        // LDA $00 (7..10); STA $4014 (10..14); DMA starts on 14.
        let (_, bus, stall) = run_dma(&[0xA5, 0x00, 0x8D, 0x14, 0x40, 0xEA], 0x02);
        assert_eq!(stall, 514);
        assert_eq!(bus.oam_writes().len(), 256);
    }

    #[test]
    fn dma_zeroes_oamaddr_before_copying() {
        let (_, bus, _) = run_dma(&[0xA9, 0x02, 0x8D, 0x14, 0x40, 0xEA], 0);
        let first_ppu_write = bus
            .writes
            .iter()
            .find(|(addr, _)| *addr == OAMADDR || *addr == OAMDATA)
            .copied();
        assert_eq!(first_ppu_write, Some((OAMADDR, 0)));
    }

    #[test]
    fn nmi_latched_during_dma_waits_for_it_to_finish() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x02, 0x8D, 0x14, 0x40, 0xEA]);
        bus.mem[0xFFFA] = 0x00;
        bus.mem[0xFFFB] = 0xA0;
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        for _ in 0..100 {
            cpu.clock(&mut bus);
        }
        cpu.nmi();
        assert_eq!(cpu.state(), CpuState::Dma);
        let (event, _) = loop {
            let outcome = dispatch(&mut cpu, &mut bus);
            if !matches!(outcome.0, CpuEvent::DmaFinished { .. }) && cpu.dma().is_none() {
                break outcome;
            }
        };
        assert!(matches!(event, CpuEvent::Interrupt(Interrupt::Nmi)));
    }

    #[test]
    fn jam_halts_until_reset() {
        let (mut cpu, mut bus) = boot(&[0x02, 0xEA]);
        let (event, _) = dispatch(&mut cpu, &mut bus);
        assert!(matches!(
            event,
            CpuEvent::Jammed {
                pc: 0x8000,
                opcode: 0x02
            }
        ));
        assert_eq!(cpu.state(), CpuState::Halted);
        for _ in 0..20 {
            assert!(cpu.clock(&mut bus).is_none());
        }
        assert_eq!(cpu.registers().pc, 0x8000);
        cpu.reset(&mut bus);
        assert!(!cpu.halted());
    }

    #[test]
    fn lax_and_sax_move_both_registers() {
        // LAX $10; SAX $11 with X modified first
        let (mut cpu, mut bus) = boot(&[0xA7, 0x10, 0xA2, 0x0F, 0x87, 0x11]);
        bus.mem[0x10] = 0xF3;
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.registers().a, 0xF3);
        assert_eq!(cpu.registers().x, 0xF3);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(bus.mem[0x11], 0x03);
    }

    #[test]
    fn dcp_and_isb_combine_rmw_with_alu() {
        // LDA #$40; DCP $10 ($41 -> $40, equal); ISB $11 ($0F -> $10)
        let (mut cpu, mut bus) = boot(&[0xA9, 0x40, 0xC7, 0x10, 0x38, 0xE7, 0x11]);
        bus.mem[0x10] = 0x41;
        bus.mem[0x11] = 0x0F;
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(bus.mem[0x10], 0x40);
        assert!(cpu.registers().status.zero);
        assert!(cpu.registers().status.carry);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(bus.mem[0x11], 0x10);
        assert_eq!(cpu.registers().a, 0x30);
    }

    #[test]
    fn axs_and_arr_immediates() {
        // LDA #$FF; LDX #$0F; AXS #$05 -> X=$0A, C set
        let (mut cpu, mut bus) = boot(&[0xA9, 0xFF, 0xA2, 0x0F, 0xCB, 0x05]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        assert_eq!(cpu.registers().x, 0x0A);
        assert!(cpu.registers().status.carry);

        // SEC; LDA #$FF; ARR #$FF -> A=$FF, C=1, V=0
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0xFF, 0x6B, 0xFF]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        let regs = cpu.registers();
        assert_eq!(regs.a, 0xFF);
        assert!(regs.status.carry);
        assert!(!regs.status.overflow);
    }

    #[test]
    fn shx_masks_with_base_high_plus_one() {
        // LDX #$FF; LDY #$01; SHX $1200,Y -> writes $FF & $13 at $1201
        let (mut cpu, mut bus) = boot(&[0xA2, 0xFF, 0xA0, 0x01, 0x9E, 0x00, 0x12]);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(bus.mem[0x1201], 0x13);
    }

    #[test]
    fn undocumented_nop_abs_x_reads_and_pays_penalty() {
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0x1C, 0xFF, 0x02]);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert!(bus.reads.contains(&0x0300));
    }
}
