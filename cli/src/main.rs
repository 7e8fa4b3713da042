#![deny(clippy::all)]

use anyhow::Context;
use sketch_interpreter::{ast::NodeKind, codec, Interpreter, InterpreterOptions, RunOutcome};
use std::{fs, fs::File, path::PathBuf, process};
use structopt::StructOpt;

/// The sub-command to execute.
#[derive(Debug, StructOpt)]
enum Command {
    /// Decode a CompactAST file and print a summary of its node table.
    #[structopt(name = "inspect")]
    Inspect {
        /// Path to the CompactAST binary file.
        #[structopt(parse(from_os_str))]
        ast_path: PathBuf,
    },

    /// Decode and run a CompactAST file, emitting the NDJSON command
    /// stream to stdout or a file.
    #[structopt(name = "run")]
    Run {
        /// Path to the CompactAST binary file.
        #[structopt(parse(from_os_str))]
        ast_path: PathBuf,
        /// Path to an interpreter options file, in JSON format. If not
        /// provided, the default options are used.
        #[structopt(parse(from_os_str), long = "options")]
        options_path: Option<PathBuf>,
        /// Write the command stream to this file instead of stdout.
        #[structopt(parse(from_os_str), long = "output", short = "o")]
        output_path: Option<PathBuf>,
    },
}

/// Interpreter for compiled Arduino-sketch CompactAST programs.
#[derive(Debug, StructOpt)]
#[structopt(name = "sketch-interpreter")]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

fn read_bytes(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read file {:?}", path))
}

/// Load interpreter options from a file, or the defaults if none was given.
fn load_options(path: &Option<PathBuf>) -> anyhow::Result<InterpreterOptions> {
    match path {
        None => Ok(InterpreterOptions::default()),
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read file {:?}", path))?;
            Ok(serde_json::from_str(&contents)?)
        }
    }
}

fn run(opt: Opt) -> anyhow::Result<()> {
    match opt.cmd {
        Command::Inspect { ast_path } => {
            let bytes = read_bytes(&ast_path)?;
            let tree = codec::decode(&bytes)?;
            let mut kind_counts = std::collections::BTreeMap::new();
            for node in &tree.nodes {
                *kind_counts.entry(format!("{:?}", node.kind)).or_insert(0u32) += 1;
            }
            println!("Nodes: {}", tree.nodes.len());
            println!("Root kind: {:?}", tree.kind(tree.root));
            println!("Kind histogram:");
            for (kind, count) in kind_counts {
                println!("  {:<28} {}", kind, count);
            }
            let func_count = tree
                .nodes
                .iter()
                .filter(|n| n.kind == NodeKind::FuncDef)
                .count();
            println!("Function definitions: {}", func_count);
        }

        Command::Run {
            ast_path,
            options_path,
            output_path,
        } => {
            let bytes = read_bytes(&ast_path)?;
            let options = load_options(&options_path)?;
            let interpreter = Interpreter::new(&bytes, options)
                .with_context(|| format!("Failed to decode {:?}", ast_path))?;

            match output_path {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {:?}", path))?;
                    interpreter.set_file_sink(file);
                }
                None => interpreter.set_stdout_sink(),
            }

            interpreter.start().map_err(|e| anyhow::anyhow!(e.to_string()))?;

            if !interpreter.is_destroyed() {
                eprintln!(
                    "execution suspended on an asynchronous external-value request; \
                     the CLI has no host loop to answer it, so the command stream ends here"
                );
            } else if interpreter.outcome() == RunOutcome::TerminatedByIterationLimit {
                eprintln!(
                    "program ended early: a loop hit max_loop_iterations outside setup() \
                     (ran {} statements)",
                    interpreter.statements_executed()
                );
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
