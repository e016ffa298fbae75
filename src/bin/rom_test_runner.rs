use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use nestick::nes::Nes;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use sha1::{Digest, Sha1};

// blargg-style status block in PRG-RAM: $6000 = result, $6001-$6003 = DE B0 61.
const STATUS_ADDR: u16 = 0x6000;
const STATUS_SIGNATURE: [u8; 3] = [0xDE, 0xB0, 0x61];
const STATUS_RUNNING: u8 = 0x80;

#[derive(Debug, Clone)]
struct SuiteTest {
    filename: String,
    system: String,
    runframes: u32,
    tvsha1: String,
    recordedinput: String,
}

#[derive(Debug, Clone, Copy)]
enum PixelOrder {
    Rgba,
    Rgb,
    Argb,
    Bgra,
}

impl PixelOrder {
    const ALL: [PixelOrder; 4] = [
        PixelOrder::Rgba,
        PixelOrder::Rgb,
        PixelOrder::Argb,
        PixelOrder::Bgra,
    ];

    fn label(self) -> &'static str {
        match self {
            PixelOrder::Rgba => "rgba",
            PixelOrder::Rgb => "rgb",
            PixelOrder::Argb => "argb",
            PixelOrder::Bgra => "bgra",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RunReport {
    hashes: Vec<(&'static str, String)>,
    pc: u16,
    halted: bool,
    total_cycles: u64,
    frames: u64,
    ppu_ctrl: u8,
    ppu_mask: u8,
    ppu_status: u8,
    ppu_scanline: u16,
    ppu_dot: u16,
    nmi_serviced: u64,
    ram_f8: u8,
    status_byte: Option<u8>,
    status_text: String,
}

#[derive(Debug, Clone, Serialize)]
struct TestOutcome {
    filename: String,
    verdict: &'static str,
    matched: Option<&'static str>,
    detail: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    passed: usize,
    failed: usize,
    skipped: usize,
    runtime_secs: f32,
    results: Vec<TestOutcome>,
}

#[derive(Debug, Clone)]
struct Config {
    suite: PathBuf,
    rom_root: PathBuf,
    max_tests: usize,
    include_recorded_input: bool,
    include_pal: bool,
    contains: Vec<String>,
    frame_multiplier: u32,
    extra_frames: u32,
    json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suite: PathBuf::from("external/nes-test-roms/test_roms.xml"),
            rom_root: PathBuf::from("external/nes-test-roms"),
            max_tests: 80,
            include_recorded_input: false,
            include_pal: false,
            contains: Vec::new(),
            frame_multiplier: 1,
            extra_frames: 0,
            json: false,
        }
    }
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--suite" => {
                let value = args.next().context(
                    "--suite requires a path, e.g. --suite external/nes-test-roms/test_roms.xml",
                )?;
                cfg.suite = PathBuf::from(value);
            }
            "--rom-root" => {
                let value = args.next().context(
                    "--rom-root requires a path, e.g. --rom-root external/nes-test-roms",
                )?;
                cfg.rom_root = PathBuf::from(value);
            }
            "--max-tests" => {
                let value = args
                    .next()
                    .context("--max-tests requires an integer, e.g. --max-tests 120")?;
                cfg.max_tests = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid --max-tests value: {value}"))?;
            }
            "--include-recorded-input" => cfg.include_recorded_input = true,
            "--include-pal" => cfg.include_pal = true,
            "--contains" => {
                let value = args
                    .next()
                    .context("--contains requires a substring, e.g. --contains cpu_timing")?;
                cfg.contains.push(value.to_lowercase());
            }
            "--frame-multiplier" => {
                let value = args
                    .next()
                    .context("--frame-multiplier requires an integer, e.g. --frame-multiplier 2")?;
                cfg.frame_multiplier = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --frame-multiplier value: {value}"))?;
            }
            "--extra-frames" => {
                let value = args
                    .next()
                    .context("--extra-frames requires an integer, e.g. --extra-frames 120")?;
                cfg.extra_frames = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --extra-frames value: {value}"))?;
            }
            "--json" => cfg.json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
        }
    }

    Ok(cfg)
}

fn print_help() {
    println!(
        "ROM suite runner for nestick\n\n\
Usage:\n\
  rom_test_runner [options]\n\n\
Options:\n\
  --suite <path>                 Path to test_roms.xml\n\
  --rom-root <path>              Root path containing ROM files\n\
  --max-tests <n>                Maximum number of tests to run (default 80)\n\
  --include-recorded-input       Include tests that require replay input\n\
  --include-pal                  Include PAL tests\n\
  --contains <substr>            Only run tests whose filename contains this text (repeatable)\n\
  --frame-multiplier <n>         Multiply XML runframes by n (default 1)\n\
  --extra-frames <n>             Add n frames after XML runframes (default 0)\n\
  --json                         Print the summary as JSON\n\
  -h, --help                     Show this help\n"
    );
}

fn parse_suite_xml(path: &Path) -> Result<Vec<SuiteTest>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite XML: {}", path.display()))?;
    parse_suite(&xml)
}

fn parse_suite(xml: &str) -> Result<Vec<SuiteTest>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tests = Vec::new();
    let mut current: Option<SuiteTest> = None;
    let mut reading_tvsha1 = false;
    let mut reading_recorded = false;

    let append = |current: &mut Option<SuiteTest>, text: &str, sha: bool, recorded: bool| {
        if let Some(test) = current.as_mut() {
            if sha {
                test.tvsha1.push_str(text);
            } else if recorded {
                test.recordedinput.push_str(text);
            }
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"test" => {
                    let mut test = SuiteTest {
                        filename: String::new(),
                        system: String::new(),
                        runframes: 0,
                        tvsha1: String::new(),
                        recordedinput: String::new(),
                    };
                    for attr in e.attributes().flatten() {
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        match attr.key.as_ref() {
                            b"filename" => test.filename = value,
                            b"system" => test.system = value,
                            b"runframes" => test.runframes = value.parse::<u32>().unwrap_or(0),
                            _ => {}
                        }
                    }
                    current = Some(test);
                }
                b"tvsha1" => reading_tvsha1 = true,
                b"recordedinput" => reading_recorded = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.decode().map(|v| v.to_string()).unwrap_or_default();
                append(&mut current, &text, reading_tvsha1, reading_recorded);
            }
            Ok(Event::CData(e)) => {
                let text = e.decode().map(|v| v.to_string()).unwrap_or_default();
                append(&mut current, &text, reading_tvsha1, reading_recorded);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"tvsha1" => reading_tvsha1 = false,
                b"recordedinput" => reading_recorded = false,
                b"test" => {
                    if let Some(mut test) = current.take() {
                        test.tvsha1 = test.tvsha1.trim().to_string();
                        test.recordedinput = test.recordedinput.trim().to_string();
                        tests.push(test);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                anyhow::bail!("failed to parse suite XML: {err}");
            }
            _ => {}
        }
    }

    Ok(tests)
}

fn should_run(test: &SuiteTest, cfg: &Config) -> bool {
    if !cfg.include_pal && test.system.eq_ignore_ascii_case("pal") {
        return false;
    }

    if !cfg.include_recorded_input && !test.recordedinput.is_empty() {
        return false;
    }

    if !cfg.contains.is_empty() {
        let lower = test.filename.to_lowercase();
        if !cfg.contains.iter().any(|f| lower.contains(f)) {
            return false;
        }
    }

    true
}

/// SHA-1 of the frame in the given byte order, base64 encoded.
fn hash_frame(frame_rgba: &[u8], order: PixelOrder) -> String {
    let mut bytes = Vec::with_capacity(frame_rgba.len());
    for px in frame_rgba.chunks_exact(4) {
        match order {
            PixelOrder::Rgba => bytes.extend_from_slice(px),
            PixelOrder::Rgb => bytes.extend_from_slice(&px[..3]),
            PixelOrder::Argb => bytes.extend_from_slice(&[px[3], px[0], px[1], px[2]]),
            PixelOrder::Bgra => bytes.extend_from_slice(&[px[2], px[1], px[0], px[3]]),
        }
    }
    BASE64_STANDARD.encode(Sha1::digest(&bytes))
}

/// Result byte and message text when the ROM uses the $6000 status block.
fn read_status_block(nes: &Nes) -> (Option<u8>, String) {
    let signature = [
        nes.debug_peek(STATUS_ADDR + 1),
        nes.debug_peek(STATUS_ADDR + 2),
        nes.debug_peek(STATUS_ADDR + 3),
    ];
    if signature != STATUS_SIGNATURE {
        return (None, String::new());
    }

    let text: String = (STATUS_ADDR + 4..0x7000)
        .map(|addr| nes.debug_peek(addr))
        .take_while(|&b| b != 0)
        .map(|b| b as char)
        .collect();
    (Some(nes.debug_peek(STATUS_ADDR)), text.trim().to_string())
}

fn run_single(test: &SuiteTest, cfg: &Config) -> Result<RunReport> {
    let rom_path = cfg.rom_root.join(&test.filename);
    let mut nes = Nes::new();
    nes.load_rom_from_path(&rom_path)
        .with_context(|| format!("failed to load ROM {}", rom_path.display()))?;

    let total_frames = test
        .runframes
        .saturating_mul(cfg.frame_multiplier)
        .saturating_add(cfg.extra_frames);
    for _ in 0..total_frames {
        nes.run_frame();
        if nes.debug_halted() {
            break;
        }
    }

    let frame = nes.frame_buffer();
    let (ppu_ctrl, ppu_mask, ppu_status) = nes.debug_ppu_regs();
    let (ppu_scanline, ppu_dot) = nes.debug_ppu_scanline_dot();
    let counters = nes.debug_counters();
    let (status_byte, status_text) = read_status_block(&nes);

    Ok(RunReport {
        hashes: PixelOrder::ALL
            .iter()
            .map(|&order| (order.label(), hash_frame(frame, order)))
            .collect(),
        pc: nes.debug_pc(),
        halted: nes.debug_halted(),
        total_cycles: nes.debug_total_cycles(),
        frames: counters.frame_count,
        ppu_ctrl,
        ppu_mask,
        ppu_status,
        ppu_scanline,
        ppu_dot,
        nmi_serviced: counters.nmi_serviced_count,
        ram_f8: nes.debug_peek_internal_ram(0x00F8),
        status_byte,
        status_text,
    })
}

fn suite_result_pass(test: &SuiteTest, report: &RunReport) -> bool {
    // Blargg VBL/NMI timing ROMs expose their result at $00F8.
    if test.filename.starts_with("vbl_nmi_timing/") && report.ram_f8 == 0x01 {
        return true;
    }
    report.status_byte == Some(0x00)
}

fn describe_failure(test: &SuiteTest, report: &RunReport) -> String {
    let mut out = format!("  expected: {}\n", test.tvsha1);
    for (label, hash) in &report.hashes {
        out.push_str(&format!("  got {label:<4}: {hash}\n"));
    }
    out.push_str(&format!(
        "  pc=${:04X} halted={} cycles={} frames={} nmi_serviced={}\n",
        report.pc, report.halted, report.total_cycles, report.frames, report.nmi_serviced
    ));
    out.push_str(&format!(
        "  ppu ctrl=${:02X} mask=${:02X} status=${:02X} sl={} dot={}\n",
        report.ppu_ctrl, report.ppu_mask, report.ppu_status, report.ppu_scanline, report.ppu_dot
    ));
    match report.status_byte {
        Some(STATUS_RUNNING) => out.push_str("  status: still running\n"),
        Some(code) => out.push_str(&format!("  status: ${code:02X} {}\n", report.status_text)),
        None => out.push_str(&format!("  ram[$00F8]=${:02X}\n", report.ram_f8)),
    }
    out
}

fn main() -> Result<()> {
    let cfg = parse_args()?;

    let start = Instant::now();
    let tests = parse_suite_xml(&cfg.suite)?;

    let selected: Vec<SuiteTest> = tests
        .into_iter()
        .filter(|t| should_run(t, &cfg))
        .take(cfg.max_tests)
        .collect();

    if !cfg.json {
        println!(
            "Running {} test(s) from {}",
            selected.len(),
            cfg.suite.display()
        );
    }

    let mut summary = Summary::default();

    for (idx, test) in selected.iter().enumerate() {
        let label = format!("[{}/{}] {}", idx + 1, selected.len(), test.filename);
        let outcome = match run_single(test, &cfg) {
            Ok(report) => {
                let matched = report
                    .hashes
                    .iter()
                    .find(|(_, hash)| *hash == test.tvsha1)
                    .map(|(label, _)| *label)
                    .or_else(|| suite_result_pass(test, &report).then_some("suite-result"));
                match matched {
                    Some(kind) => {
                        summary.passed += 1;
                        if !cfg.json {
                            println!("PASS {label} [{kind}]");
                        }
                        TestOutcome {
                            filename: test.filename.clone(),
                            verdict: "pass",
                            matched: Some(kind),
                            detail: None,
                        }
                    }
                    None => {
                        summary.failed += 1;
                        let detail = describe_failure(test, &report);
                        if !cfg.json {
                            print!("FAIL {label}\n{detail}");
                        }
                        TestOutcome {
                            filename: test.filename.clone(),
                            verdict: "fail",
                            matched: None,
                            detail: Some(detail),
                        }
                    }
                }
            }
            Err(err) => {
                summary.skipped += 1;
                if !cfg.json {
                    println!("SKIP {label} -> {err:#}");
                }
                TestOutcome {
                    filename: test.filename.clone(),
                    verdict: "skip",
                    matched: None,
                    detail: Some(format!("{err:#}")),
                }
            }
        };
        summary.results.push(outcome);
    }

    summary.runtime_secs = start.elapsed().as_secs_f32();

    if cfg.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        println!("Summary:");
        println!("- Passed: {}", summary.passed);
        println!("- Failed: {}", summary.failed);
        println!("- Skipped: {}", summary.skipped);
        println!("- Runtime: {:.2}s", summary.runtime_secs);
    }

    Ok(())
}
