pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod mapper;
pub mod opcodes;
mod palette;
pub mod ppu;
pub mod status;
pub mod trace;

use std::collections::VecDeque;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, warn};

use bus::{Bus, BusCounters, CpuBus};
use cartridge::Cartridge;
use cpu::{Cpu, CpuEvent, CpuRegisters, Instruction, Interrupt, OamDma};
use mapper::{create_mapper, mapper_name};
use ppu::{Ppu, PpuDebugCounters};
use trace::TraceRecord;

pub use controller::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP,
};
pub use palette::NES_PALETTE;

/// PPU dots per CPU cycle.
pub const DOTS_PER_CPU_CYCLE: u8 = 3;

const MAX_DEBUG_EVENTS: usize = 512;
// A frame is 89342 dots; anything past a few frames means the PPU is stuck.
const FRAME_GUARD_DOTS: u64 = 4 * 89_342;
// Worst case between retirements: a DMA stall plus an interrupt entry.
const STEP_GUARD_DOTS: u64 = 3 * 1_024;

#[derive(Debug, Clone, Copy, Default)]
pub struct NesDebugCounters {
    pub frame_count: u64,
    pub ppu_dots: u64,
    pub cpu_cycles: u64,
    pub instructions: u64,
    pub dma_transfers: u64,
    pub nmi_serviced_count: u64,
    pub irq_serviced_count: u64,
    pub bus: BusCounters,
}

/// The console: CPU, bus devices and the PPU kept in lock-step at one CPU
/// cycle per three PPU dots.
pub struct Nes {
    cpu: Cpu,
    bus: Bus,
    phase: u8,
    frame_ready: bool,

    mapper_name: String,
    loaded_rom_name: Option<String>,

    trace_enabled: bool,
    trace: Vec<TraceRecord>,

    debug: NesDebugCounters,
    debug_events: VecDeque<String>,
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nes {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(Ppu::new()),
            phase: 0,
            frame_ready: false,
            mapper_name: "No ROM loaded".to_string(),
            loaded_rom_name: None,
            trace_enabled: false,
            trace: Vec::new(),
            debug: NesDebugCounters::default(),
            debug_events: VecDeque::with_capacity(MAX_DEBUG_EVENTS),
        }
    }

    pub fn mapper_name(&self) -> &str {
        &self.mapper_name
    }

    pub fn loaded_rom_name(&self) -> Option<&str> {
        self.loaded_rom_name.as_deref()
    }

    pub fn has_rom(&self) -> bool {
        self.bus.mapper().is_some()
    }

    pub fn load_rom_from_path(&mut self, path: &Path) -> Result<()> {
        let cart = Cartridge::from_file(path)?;
        self.loaded_rom_name = path
            .file_name()
            .and_then(|v| v.to_str())
            .map(|v| v.to_string());
        self.load_cartridge(cart)
    }

    pub fn load_rom_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let cart = Cartridge::from_bytes(bytes)?;
        self.loaded_rom_name = None;
        self.load_cartridge(cart)
    }

    fn load_cartridge(&mut self, cart: Cartridge) -> Result<()> {
        let mapper = create_mapper(&cart)?;
        let mapper_id = cart.mapper_id;
        let supported_name = mapper_name(mapper_id);

        let ppu = self.bus.ppu_mut();
        ppu.load_chr(&cart.chr_data, cart.chr_is_ram);
        ppu.set_mirroring(mapper.mirroring());
        self.bus.set_mapper(mapper);

        self.mapper_name = if cart.submapper_id != 0 {
            format!(
                "{supported_name} (mapper {mapper_id}, submapper {})",
                cart.submapper_id
            )
        } else {
            format!("{supported_name} (mapper {mapper_id})")
        };

        self.reset();
        let event = format!(
            "ROM loaded: {}, PRG {} KiB, CHR {} KiB{}",
            self.mapper_name,
            cart.prg_rom.len() / 1024,
            cart.chr_data.len() / 1024,
            if cart.chr_is_ram { " (RAM)" } else { "" }
        );
        info!("{event}");
        self.push_debug_event(event);
        Ok(())
    }

    /// Power-on state: RAM and VRAM cleared, PPU at scanline 0 dot 0, CPU
    /// vectored through $FFFC with its 7-cycle startup pending.
    pub fn reset(&mut self) {
        if !self.has_rom() {
            return;
        }

        self.bus.reset();
        self.bus.ppu_mut().reset();
        self.cpu = Cpu::new();
        self.cpu.reset(&mut self.bus);
        self.phase = 0;
        self.frame_ready = false;
        self.trace.clear();
        self.debug = NesDebugCounters::default();
        self.debug_events.clear();

        let event = format!("CPU reset, PC=${:04X}", self.cpu.registers().pc);
        info!("{event}");
        self.push_debug_event(event);
    }

    /// Resets, then overrides the entry point. nestest's automated mode
    /// starts at $C000.
    pub fn reset_to(&mut self, pc: u16) {
        self.reset();
        self.cpu.set_pc(pc);
        self.push_debug_event(format!("PC forced to ${pc:04X}"));
    }

    pub fn set_trace_enabled(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    pub fn take_trace_records(&mut self) -> Vec<TraceRecord> {
        std::mem::take(&mut self.trace)
    }

    pub fn take_trace_lines(&mut self) -> Vec<String> {
        self.take_trace_records()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn set_controller_state(&mut self, port: usize, buttons: u8) {
        self.bus.controllers_mut().set_state(port, buttons);
    }

    /// One PPU dot. Every third dot also clocks the CPU and the APU, in that
    /// order, before the PPU.
    pub fn clock(&mut self) -> Option<CpuEvent> {
        let mut event = None;

        if self.phase == 0 {
            if self.trace_enabled && self.cpu.about_to_fetch() {
                let ppu = self.bus.ppu();
                let record =
                    TraceRecord::capture(&self.cpu, &self.bus, ppu.scanline(), ppu.dot());
                self.trace.push(record);
            }

            event = self.cpu.clock(&mut self.bus);
            self.bus.clock_apu();
            if self.bus.irq_line() {
                self.cpu.irq();
            } else {
                self.cpu.clear_irq();
            }
            self.debug.cpu_cycles = self.debug.cpu_cycles.wrapping_add(1);

            if let Some(event) = event {
                self.note_cpu_event(event);
            }
        }

        let ppu = self.bus.ppu_mut();
        ppu.clock();
        let nmi = ppu.take_nmi();
        let frame_ready = ppu.take_frame_ready();
        if nmi {
            self.cpu.nmi();
        }
        if frame_ready {
            self.frame_ready = true;
            self.debug.frame_count = self.debug.frame_count.wrapping_add(1);
        }

        self.debug.ppu_dots = self.debug.ppu_dots.wrapping_add(1);
        self.phase = (self.phase + 1) % DOTS_PER_CPU_CYCLE;
        event
    }

    /// Clocks until the next instruction retires. `None` if the CPU is halted
    /// or no ROM is loaded.
    pub fn step_instruction(&mut self) -> Option<Instruction> {
        if !self.has_rom() {
            return None;
        }

        for _ in 0..STEP_GUARD_DOTS {
            if self.cpu.halted() {
                return None;
            }
            if let Some(CpuEvent::Retired(instruction)) = self.clock() {
                return Some(instruction);
            }
        }
        None
    }

    /// Clocks until the PPU publishes a frame.
    pub fn run_frame(&mut self) {
        if !self.has_rom() {
            return;
        }

        self.frame_ready = false;
        let mut guard: u64 = 0;
        while !self.frame_ready {
            self.clock();
            guard += 1;
            if guard > FRAME_GUARD_DOTS {
                let event = format!("Frame guard tripped at {FRAME_GUARD_DOTS} dots");
                warn!("{event}");
                self.push_debug_event(event);
                break;
            }
        }
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu().frame_buffer()
    }

    fn note_cpu_event(&mut self, event: CpuEvent) {
        match event {
            CpuEvent::Retired(_) => {
                self.debug.instructions = self.debug.instructions.wrapping_add(1);
            }
            CpuEvent::Interrupt(Interrupt::Nmi) => {
                self.debug.nmi_serviced_count = self.debug.nmi_serviced_count.wrapping_add(1);
                let pc = self.cpu.registers().pc;
                debug!(vector = pc, "NMI serviced");
                self.push_debug_event(format!("NMI serviced, vector ${pc:04X}"));
            }
            CpuEvent::Interrupt(Interrupt::Irq) => {
                self.debug.irq_serviced_count = self.debug.irq_serviced_count.wrapping_add(1);
                let pc = self.cpu.registers().pc;
                debug!(vector = pc, "IRQ serviced");
                self.push_debug_event(format!("IRQ serviced, vector ${pc:04X}"));
            }
            CpuEvent::DmaFinished { page } => {
                self.debug.dma_transfers = self.debug.dma_transfers.wrapping_add(1);
                debug!(page, "OAM DMA finished");
                self.push_debug_event(format!("OAM DMA from page ${page:02X} finished"));
            }
            CpuEvent::Jammed { pc, opcode } => {
                let event = format!("CPU halted by ${opcode:02X} at ${pc:04X}");
                warn!("{event}");
                self.push_debug_event(event);
            }
        }
    }

    pub fn debug_pc(&self) -> u16 {
        self.cpu.registers().pc
    }

    pub fn debug_halted(&self) -> bool {
        self.cpu.halted()
    }

    pub fn debug_total_cycles(&self) -> u64 {
        self.cpu.total_cycles()
    }

    pub fn debug_cpu_regs(&self) -> CpuRegisters {
        self.cpu.registers()
    }

    /// (NMI latched, IRQ latched, DMA in flight).
    pub fn debug_interrupt_state(&self) -> (bool, bool, Option<OamDma>) {
        (self.cpu.nmi_latched(), self.cpu.irq_latched(), self.cpu.dma())
    }

    /// (PPUCTRL, PPUMASK, PPUSTATUS).
    pub fn debug_ppu_regs(&self) -> (u8, u8, u8) {
        let regs = self.bus.ppu().registers();
        (regs.ctrl, regs.mask, regs.status)
    }

    pub fn debug_ppu_scanline_dot(&self) -> (u16, u16) {
        let ppu = self.bus.ppu();
        (ppu.scanline(), ppu.dot())
    }

    pub fn debug_peek_internal_ram(&self, addr: u16) -> u8 {
        self.bus.ram()[(addr & 0x07FF) as usize]
    }

    /// CPU address space without side effects.
    pub fn debug_peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    pub fn debug_peek_vram(&self, addr: u16) -> u8 {
        self.bus.ppu().peek_vram(addr)
    }

    pub fn debug_peek_palette(&self, index: usize) -> u8 {
        self.bus.ppu().peek_palette(index)
    }

    pub fn debug_peek_oam(&self, index: usize) -> u8 {
        self.bus.ppu().peek_oam(index)
    }

    pub fn debug_controller_state(&self, port: usize) -> u8 {
        self.bus.controllers().state(port)
    }

    pub fn debug_counters(&self) -> NesDebugCounters {
        NesDebugCounters {
            bus: self.bus.counters(),
            ..self.debug
        }
    }

    pub fn debug_ppu_counters(&self) -> PpuDebugCounters {
        self.bus.ppu().debug_counters()
    }

    pub fn debug_recent_events(&self, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }

        self.debug_events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn push_debug_event<S: Into<String>>(&mut self, event: S) {
        if self.debug_events.len() >= MAX_DEBUG_EVENTS {
            self.debug_events.pop_front();
        }
        self.debug_events.push_back(event.into());
    }
}
