//! Sigsmith CLI
//!
//! Command-line front end for parsing disassembly listings and
//! generating byte-pattern signatures.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use sigsmith::{
    analyze, batch, export, parse, smart_analyze, smart_generate, BulkSelector, ExportFormat,
    FormatHint, GenerateOutput, SignatureOptions, TargetSelection, WildcardRules,
};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

/// Byte-pattern signature generator for x86-32 reverse engineering.
///
/// Reads a disassembly listing (pipe-separated debugger dump, dash-separated
/// module+offset dump, or raw hex) and produces wildcard-masked search
/// patterns ranked by expected uniqueness and stability.
#[derive(Parser, Debug)]
#[command(name = "sigsmith")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input listing file ("-" or omitted reads stdin)
    input: Option<PathBuf>,

    /// Input format
    #[arg(short, long, default_value = "auto")]
    format: FormatArg,

    /// Operation to run
    #[arg(short, long, default_value = "generate")]
    mode: Mode,

    /// Targets: comma-separated labels/addresses, or one of
    /// all, all_labeled, all_jumps, all_calls
    #[arg(short, long)]
    targets: Option<String>,

    /// Minimum pattern length in bytes
    #[arg(long, default_value_t = 20)]
    min_length: usize,

    /// Maximum pattern length in bytes
    #[arg(long, default_value_t = 50)]
    max_length: usize,

    /// Maximum variants per target
    #[arg(long, default_value_t = 25)]
    variants: usize,

    /// Instructions of context before the target
    #[arg(long, default_value_t = 0)]
    context_before: usize,

    /// Context annotation after the target
    #[arg(long, default_value_t = 10)]
    context_after: usize,

    /// Also wildcard immediate values
    #[arg(long)]
    wildcard_immediates: bool,

    /// Also wildcard [reg+X] struct offsets
    #[arg(long)]
    wildcard_structs: bool,

    /// Keep stack displacements concrete
    #[arg(long)]
    keep_stack: bool,

    /// Keep global addresses concrete
    #[arg(long)]
    keep_globals: bool,

    /// Number of smart targets to generate for
    #[arg(long, default_value_t = 3)]
    top: usize,

    /// Export the generated signatures in this format
    #[arg(short, long)]
    export: Option<ExportArg>,

    /// Module name used by export formats that need one
    #[arg(long, default_value = "game.exe")]
    module: String,

    /// List the available export formats and exit
    #[arg(long)]
    list_exports: bool,

    /// Output format
    #[arg(short, long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output (enables debug logging)
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (patterns only)
    #[arg(short, long)]
    quiet: bool,
}

/// Input format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Detect from the first meaningful line
    Auto,
    /// `ADDRESS | BYTES | MNEMONIC OPERANDS | COMMENT`
    Pipe,
    /// `MODULE+OFFSET - BYTES - MNEMONIC OPERANDS`
    Dash,
    /// Raw whitespace-separated hex
    Hex,
}

impl From<FormatArg> for FormatHint {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => FormatHint::Auto,
            FormatArg::Pipe => FormatHint::Pipe,
            FormatArg::Dash => FormatHint::Dash,
            FormatArg::Hex => FormatHint::Hex,
        }
    }
}

/// Operation options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Parse and show the instruction table
    Parse,
    /// Parse and show statistics plus recommended targets
    Analyze,
    /// Generate signatures for the selected targets
    Generate,
    /// Pick anchors automatically and generate for the best ones
    Smart,
}

/// Export format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportArg {
    Aob,
    Mask,
    Ida,
    Cheatengine,
    Cpp,
    X64dbg,
}

impl From<ExportArg> for ExportFormat {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::Aob => ExportFormat::Aob,
            ExportArg::Mask => ExportFormat::Mask,
            ExportArg::Ida => ExportFormat::Ida,
            ExportArg::Cheatengine => ExportFormat::CheatEngine,
            ExportArg::Cpp => ExportFormat::Cpp,
            ExportArg::X64dbg => ExportFormat::X64dbg,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("sigsmith=debug")
            .init();
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    if args.list_exports {
        for info in sigsmith::export::available_formats() {
            println!(
                "{:<12} {:<16} {}  ({})",
                info.id, info.name, info.description, info.extension
            );
        }
        return Ok(());
    }

    let input = read_input(args.input.as_deref())?;
    let format = FormatHint::from(args.format);

    match args.mode {
        Mode::Parse => {
            let out = parse(&input, format)?;
            match args.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&out)?),
                OutputFormat::Human => print_parse(&out, args.quiet),
            }
        }
        Mode::Analyze => {
            let out = analyze(&input, format)?;
            match args.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&out)?),
                OutputFormat::Human => print_analyze(&out),
            }
        }
        Mode::Generate => {
            let options = signature_options(args);
            let targets = parse_targets(args.targets.as_deref())?;
            let out = batch(&input, format, &targets, &options)?;
            emit_signatures(args, &out)?;
        }
        Mode::Smart => {
            let options = signature_options(args);
            let parsed = parse(&input, format)?;
            if !args.quiet && args.export.is_none() {
                let analysis = smart_analyze(&parsed.instructions, args.top * 2);
                println!("{}", analysis.analysis_summary);
                println!();
            }
            let out = smart_generate(&parsed.instructions, &options, args.top)?;
            emit_signatures(args, &out)?;
        }
    }

    Ok(())
}

/// Read the listing from a file or stdin.
fn read_input(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p.as_os_str() != "-" => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Build signature options from the CLI flags.
fn signature_options(args: &Args) -> SignatureOptions {
    SignatureOptions {
        min_length: args.min_length,
        max_length: args.max_length,
        variants: args.variants,
        context_before: args.context_before,
        context_after: args.context_after,
        wildcard_rules: WildcardRules {
            stack_offsets: !args.keep_stack,
            global_addresses: !args.keep_globals,
            immediates: args.wildcard_immediates,
            struct_offsets: args.wildcard_structs,
            ..WildcardRules::default()
        },
    }
    .clamped()
}

/// Parse the --targets flag.
fn parse_targets(raw: Option<&str>) -> anyhow::Result<TargetSelection> {
    let Some(raw) = raw else {
        return Ok(TargetSelection::default());
    };

    let selection = match raw {
        "all" => TargetSelection::Bulk(BulkSelector::All),
        "all_labeled" => TargetSelection::Bulk(BulkSelector::AllLabeled),
        "all_jumps" => TargetSelection::Bulk(BulkSelector::AllJumps),
        "all_calls" => TargetSelection::Bulk(BulkSelector::AllCalls),
        list => {
            let entries: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if entries.is_empty() {
                bail!("empty target list");
            }
            TargetSelection::List(entries)
        }
    };

    Ok(selection)
}

/// Print or export a generation result.
fn emit_signatures(args: &Args, out: &GenerateOutput) -> anyhow::Result<()> {
    if let Some(fmt) = args.export {
        println!("{}", export(&out.signatures, fmt.into(), &args.module));
        return Ok(());
    }

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(out)?),
        OutputFormat::Human => print_signatures(out, args.quiet),
    }

    Ok(())
}

fn print_parse(out: &sigsmith::ParseOutput, quiet: bool) {
    if !quiet {
        println!("Format:       {}", out.format);
        if let Some(ref module) = out.module {
            println!("Module:       {}", module);
        }
        println!("Instructions: {}", out.stats.total);
        println!("Total bytes:  {}", out.stats.total_bytes);
        println!("Labels:       {}", out.labels.join(", "));
        println!();
    }

    for inst in &out.instructions {
        let bytes: Vec<String> = inst.bytes.iter().map(|b| format!("{:02X}", b)).collect();
        let label = inst
            .label
            .as_deref()
            .map(|l| format!("  ; {}", l))
            .unwrap_or_default();
        println!(
            "{}  {:<24} {} {}{}",
            inst.address,
            bytes.join(" "),
            inst.mnemonic,
            inst.operands,
            label
        );
    }
}

fn print_analyze(out: &sigsmith::AnalyzeOutput) {
    println!("Format:       {}", out.format);
    if let Some(ref module) = out.module {
        println!("Module:       {}", module);
    }
    println!("Instructions: {}", out.stats.total);
    println!("Total bytes:  {}", out.stats.total_bytes);
    println!("By kind:");
    for (kind, count) in &out.stats.by_kind {
        println!("  {:<20} {}", kind, count);
    }
    println!("Recommended targets:");
    for target in &out.recommended_targets {
        println!("  {}", target);
    }
}

fn print_signatures(out: &GenerateOutput, quiet: bool) {
    if quiet {
        for variants in out.signatures.values() {
            for sig in variants {
                println!("{}", sig.pattern);
            }
        }
        return;
    }

    println!(
        "Targets processed: {}, total variants: {}",
        out.targets_processed, out.total_variants
    );

    for (target, variants) in &out.signatures {
        println!();
        println!("=== {} ===", target);
        for (i, sig) in variants.iter().enumerate() {
            println!(
                "Variant {} [{}] ({:.0}% unique, {} stability)",
                i + 1,
                sig.strategy,
                sig.uniqueness_score * 100.0,
                sig.stability
            );
            println!("  {}", sig.pattern);
            println!("  {}", sig.summary);
        }
    }
}
