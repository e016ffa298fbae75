use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nestick::nes::Nes;
use nestick::nes::trace::TraceRecord;
use tracing::Level;

#[derive(Debug, Clone)]
struct Config {
    rom: Option<PathBuf>,
    frames: u32,
    instructions: Option<u64>,
    start_pc: Option<u16>,
    trace: bool,
    json: bool,
    compare: Option<PathBuf>,
    log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom: None,
            frames: 1,
            instructions: None,
            start_pc: None,
            trace: false,
            json: false,
            compare: None,
            log_level: Level::WARN,
        }
    }
}

fn parse_hex_u16(text: &str) -> Result<u16> {
    let digits = text
        .trim_start_matches('$')
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).with_context(|| format!("invalid hex address: {text}"))
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args
                    .next()
                    .context("--frames requires an integer, e.g. --frames 60")?;
                cfg.frames = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --frames value: {value}"))?;
            }
            "--instructions" => {
                let value = args
                    .next()
                    .context("--instructions requires an integer, e.g. --instructions 8991")?;
                cfg.instructions = Some(
                    value
                        .parse::<u64>()
                        .with_context(|| format!("invalid --instructions value: {value}"))?,
                );
            }
            "--start-pc" => {
                let value = args
                    .next()
                    .context("--start-pc requires a hex address, e.g. --start-pc C000")?;
                cfg.start_pc = Some(parse_hex_u16(&value)?);
            }
            "--trace" => cfg.trace = true,
            "--json" => {
                cfg.trace = true;
                cfg.json = true;
            }
            "--compare" => {
                let value = args
                    .next()
                    .context("--compare requires a path, e.g. --compare nestest.log")?;
                cfg.compare = Some(PathBuf::from(value));
            }
            "-v" | "--verbose" => {
                cfg.log_level = if cfg.log_level == Level::WARN {
                    Level::INFO
                } else {
                    Level::DEBUG
                };
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
            other => {
                if cfg.rom.is_some() {
                    anyhow::bail!("unexpected extra ROM path: {other}");
                }
                cfg.rom = Some(PathBuf::from(other));
            }
        }
    }

    Ok(cfg)
}

fn print_help() {
    println!(
        "Headless NES CPU/PPU runner\n\n\
Usage:\n\
  nestick <rom.nes> [options]\n\n\
Options:\n\
  --frames <n>           Run n frames (default 1)\n\
  --instructions <n>     Run n instructions instead of whole frames\n\
  --start-pc <hex>       Force PC after reset (nestest automation: C000)\n\
  --trace                Print a nestest-style line per instruction\n\
  --json                 Print trace records as JSON lines\n\
  --compare <log>        Compare the trace against a reference log and stop at the first mismatch\n\
  -v, --verbose          Raise log level (repeat for debug)\n\
  -h, --help             Show this help\n"
    );
}

fn emit(out: &mut impl Write, records: &[TraceRecord], json: bool) -> Result<()> {
    for record in records {
        if json {
            serde_json::to_writer(&mut *out, record)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{record}")?;
        }
    }
    Ok(())
}

/// Steps through the reference log. Returns the number of matching lines.
fn compare_with_log(nes: &mut Nes, log_path: &Path, limit: Option<u64>) -> Result<usize> {
    let reference = fs::read_to_string(log_path)
        .with_context(|| format!("failed to read reference log: {}", log_path.display()))?;
    let expected: Vec<&str> = reference
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let wanted = limit.map_or(expected.len(), |n| expected.len().min(n as usize));

    let mut matched = 0;
    while matched < wanted {
        if nes.step_instruction().is_none() {
            anyhow::bail!(
                "CPU stopped at ${:04X} after {matched} matching line(s)",
                nes.debug_pc()
            );
        }
        for record in nes.take_trace_records() {
            if matched >= wanted {
                break;
            }
            let line = record.to_string();
            if line != expected[matched] {
                anyhow::bail!(
                    "trace mismatch at line {}\n  expected: {}\n  got:      {}",
                    matched + 1,
                    expected[matched],
                    line
                );
            }
            matched += 1;
        }
    }

    Ok(matched)
}

fn main() -> Result<()> {
    let cfg = parse_args()?;

    tracing_subscriber::fmt()
        .with_max_level(cfg.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(rom_path) = cfg.rom.as_ref() else {
        print_help();
        anyhow::bail!("missing ROM path");
    };

    let mut nes = Nes::new();
    nes.load_rom_from_path(rom_path)?;
    if let Some(pc) = cfg.start_pc {
        nes.reset_to(pc);
    }
    nes.set_trace_enabled(cfg.trace || cfg.compare.is_some());

    if let Some(log_path) = cfg.compare.as_ref() {
        let matched = compare_with_log(&mut nes, log_path, cfg.instructions)?;
        println!("{matched} line(s) match {}", log_path.display());
        return Ok(());
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cfg.instructions {
        Some(count) => {
            for _ in 0..count {
                if nes.step_instruction().is_none() {
                    break;
                }
                emit(&mut out, &nes.take_trace_records(), cfg.json)?;
            }
        }
        None => {
            for _ in 0..cfg.frames {
                nes.run_frame();
                emit(&mut out, &nes.take_trace_records(), cfg.json)?;
                if nes.debug_halted() {
                    break;
                }
            }
        }
    }
    emit(&mut out, &nes.take_trace_records(), cfg.json)?;
    out.flush()?;

    if !cfg.trace {
        let counters = nes.debug_counters();
        let regs = nes.debug_cpu_regs();
        println!(
            "{}: {} frame(s), {} instruction(s), {} CPU cycles",
            nes.loaded_rom_name().unwrap_or("ROM"),
            counters.frame_count,
            counters.instructions,
            nes.debug_total_cycles()
        );
        println!(
            "PC=${:04X} A=${:02X} X=${:02X} Y=${:02X} P=${:02X} SP=${:02X}{}",
            regs.pc,
            regs.a,
            regs.x,
            regs.y,
            regs.status.bits(),
            regs.sp,
            if nes.debug_halted() { " (halted)" } else { "" }
        );
    }

    Ok(())
}
