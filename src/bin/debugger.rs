use anyhow::Result;
use nestick::nes::Nes;
use nestick::nes::status::{
    FLAG_CARRY, FLAG_DECIMAL, FLAG_INTERRUPT, FLAG_NEGATIVE, FLAG_OVERFLOW, FLAG_ZERO,
};
use std::path::Path;
use tracing::Level;

const BREAKPOINT_STEP_LIMIT: usize = 5_000_000;

fn parse_hex(text: &str) -> Option<u16> {
    let digits = text.trim_start_matches('$').trim_start_matches("0x");
    u16::from_str_radix(digits, 16).ok()
}

fn print_help() {
    println!("Commands:");
    println!("  step, s [n]   - Step n instructions (default 1), printing trace lines");
    println!("  frame, f [n]  - Run n frames (default 1)");
    println!("  bp <addr>     - Run until PC reaches addr");
    println!("  regs          - Show CPU registers");
    println!("  mem <addr>    - Show 16 bytes of CPU memory (peek)");
    println!("  vram <addr>   - Show 16 bytes of PPU memory");
    println!("  ppu           - Show PPU state");
    println!("  oam           - Show the first 8 OAM entries");
    println!("  events [n]    - Show recent debug events");
    println!("  reset [addr]  - Reset, optionally forcing PC");
    println!("  quit, q       - Exit debugger");
}

fn print_regs(nes: &Nes) {
    let regs = nes.debug_cpu_regs();
    let p = regs.status.bits();
    println!("A: ${:02X}  X: ${:02X}  Y: ${:02X}", regs.a, regs.x, regs.y);
    println!("P: {:08b} (NV-BDIZC)", p);
    println!("SP: ${:02X}  PC: ${:04X}", regs.sp, regs.pc);
    println!(
        "Flags: N={} V={} D={} I={} Z={} C={}",
        (p & FLAG_NEGATIVE) != 0,
        (p & FLAG_OVERFLOW) != 0,
        (p & FLAG_DECIMAL) != 0,
        (p & FLAG_INTERRUPT) != 0,
        (p & FLAG_ZERO) != 0,
        (p & FLAG_CARRY) != 0
    );
    println!("Cycles: {}", nes.debug_total_cycles());
}

fn dump(start: u16, peek: impl Fn(u16) -> u8) {
    for row in 0..2u16 {
        let base = start.wrapping_add(row * 8);
        let bytes: Vec<String> = (0..8)
            .map(|i| format!("{:02X}", peek(base.wrapping_add(i))))
            .collect();
        println!("{:04X}: {}", base, bytes.join(" "));
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    println!("nestick debugger");
    println!("================");
    println!();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        println!("Usage: nestick_debug <rom.nes>");
        println!();
        print_help();
        return Ok(());
    }

    let rom_path = &args[1];
    println!("Loading ROM: {}", rom_path);

    let mut nes = Nes::new();
    nes.load_rom_from_path(Path::new(rom_path))?;
    nes.set_trace_enabled(true);

    println!("ROM loaded: {}", nes.mapper_name());
    println!();
    print_regs(&nes);
    println!();
    println!("Type 'help' for commands");

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout()).ok();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        let count = parts
            .get(1)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1);

        match parts[0] {
            "help" | "h" => print_help(),
            "step" | "s" => {
                for _ in 0..count {
                    if nes.step_instruction().is_none() {
                        println!("CPU halted at ${:04X}", nes.debug_pc());
                        break;
                    }
                }
                for line in nes.take_trace_lines() {
                    println!("{line}");
                }
            }
            "frame" | "f" => {
                for _ in 0..count {
                    nes.run_frame();
                }
                nes.take_trace_records();
                let (nmi, irq, dma) = nes.debug_interrupt_state();
                println!(
                    "Frame {} done, PC=${:04X}  NMI latched: {}, IRQ latched: {}, DMA: {}",
                    nes.debug_counters().frame_count,
                    nes.debug_pc(),
                    nmi,
                    irq,
                    dma.is_some()
                );
            }
            "bp" => {
                let Some(target) = parts.get(1).and_then(|v| parse_hex(v)) else {
                    println!("Usage: bp <addr>");
                    continue;
                };
                let mut hit = false;
                for _ in 0..BREAKPOINT_STEP_LIMIT {
                    if nes.step_instruction().is_none() {
                        break;
                    }
                    nes.take_trace_records();
                    if nes.debug_pc() == target {
                        hit = true;
                        break;
                    }
                }
                if hit {
                    println!("Breakpoint ${target:04X} reached");
                } else {
                    println!("Stopped at ${:04X} without reaching ${target:04X}", nes.debug_pc());
                }
            }
            "regs" => print_regs(&nes),
            "mem" => match parts.get(1).and_then(|v| parse_hex(v)) {
                Some(addr) => dump(addr, |a| nes.debug_peek(a)),
                None => println!("Usage: mem <addr>"),
            },
            "vram" => match parts.get(1).and_then(|v| parse_hex(v)) {
                Some(addr) => dump(addr, |a| nes.debug_peek_vram(a)),
                None => println!("Usage: vram <addr>"),
            },
            "ppu" => {
                let (scanline, dot) = nes.debug_ppu_scanline_dot();
                let (ctrl, mask, status) = nes.debug_ppu_regs();
                let counters = nes.debug_ppu_counters();
                println!("PPU State:");
                println!("  Scanline: {}, Dot: {}", scanline, dot);
                println!("  $2000 (ctrl):   {:08b}", ctrl);
                println!("  $2001 (mask):   {:08b}", mask);
                println!("  $2002 (status): {:08b}", status);
                println!(
                    "  Frames: {}  NMI edges: {}  Sprite 0 hits: {}  Overflows: {}",
                    counters.frames,
                    counters.nmi_edges,
                    counters.sprite0_hit_events,
                    counters.sprite_overflow_events
                );
            }
            "oam" => {
                for sprite in 0..8 {
                    let base = sprite * 4;
                    println!(
                        "  #{sprite}: Y={:02X} tile={:02X} attr={:02X} X={:02X}",
                        nes.debug_peek_oam(base),
                        nes.debug_peek_oam(base + 1),
                        nes.debug_peek_oam(base + 2),
                        nes.debug_peek_oam(base + 3)
                    );
                }
            }
            "events" => {
                let limit = parts
                    .get(1)
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(10);
                for event in nes.debug_recent_events(limit) {
                    println!("  {event}");
                }
            }
            "reset" => {
                match parts.get(1).and_then(|v| parse_hex(v)) {
                    Some(pc) => nes.reset_to(pc),
                    None => nes.reset(),
                }
                print_regs(&nes);
            }
            "quit" | "q" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    parts[0]
                );
            }
        }
    }

    Ok(())
}
