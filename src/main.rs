use anyhow::{Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use y64_pipe::{
    assemble,
    logging::{logging_setup, verbose_level_to_trace},
    mem_diff, reg_diff, verbose, AssembleOption, Engine, EngineOption,
};

/// Assembler and pipelined simulator for a small 64-bit instruction set.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the assembly source
    input: String,

    /// Output filename (default is input%.yo)
    ///
    /// Conflicts with `run`.
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Run the assembled program in the pipeline simulator
    #[arg(short = 'r', long)]
    run: bool,

    /// Stop the simulation after this many cycles
    #[arg(long, default_value_t = 100_000)]
    max_cycles: u64,

    /// Size of data memory in bytes
    #[arg(long, default_value_t = y64_pipe::isa::MEM_SIZE)]
    mem_size: usize,

    /// Start address, overriding the `main` label
    #[arg(long, value_parser = parse_addr)]
    entry: Option<i64>,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn parse_addr(s: &str) -> Result<i64, String> {
    y64_pipe::utils::parse_literal(s).ok_or_else(|| format!("invalid address `{s}`"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let verbose_asm = args
        .verbose
        .log_level()
        .is_some_and(|lv| lv >= verbose::Level::Debug);
    logging_setup(verbose_level_to_trace(args.verbose.log_level()));

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;
    let prog = assemble(&content, AssembleOption::default().set_verbose(verbose_asm))
        .with_context(|| format!("could not assemble `{}`", &args.input))?;

    if args.run {
        if args.output.is_some() {
            let mut cmd = Args::command();
            cmd.error(
                ErrorKind::ArgumentConflict,
                "Can't both specify output and run",
            )
            .exit();
        }
        let entry = args.entry.unwrap_or(prog.entry);
        let option = EngineOption::default().set_mem_size(args.mem_size);
        let mut engine = Engine::load_with(&prog.image, entry, option)
            .context("could not load program")?;
        let init_regs = *engine.registers();
        let init_mem = engine.memory().to_vec();

        let stat = engine
            .run(args.max_cycles)
            .with_context(|| format!("simulation failed at cycle {}", engine.cycle_count()))?;

        tracing::debug!("final latches: {:#?}", engine.latches());
        println!("status: {}", stat);
        println!("cycles: {}", engine.cycle_count());
        println!("cc: {}", engine.condition_codes());
        reg_diff(&init_regs, engine.registers());
        mem_diff(&init_mem, engine.memory());
    } else {
        let output_path = if let Some(path) = args.output {
            path
        } else {
            let mut path = std::path::PathBuf::from(&args.input);
            path.set_extension("yo");
            path.to_string_lossy().to_string()
        };
        std::fs::write(&output_path, prog.to_string())
            .with_context(|| format!("could not write file `{}`", &output_path))?;
        println!("writing to file `{}`", &output_path);
    }
    Ok(())
}
