//! MIPS Simulator CLI.
//!
//! Loads a TOML configuration and a flat program binary, builds the
//! configured memory chain and driver, runs the program to completion
//! and prints the statistics report.

use clap::Parser;
use std::{fs, process};

use mips_simulator::config::{Architecture, Config};
use mips_simulator::mem::cache::BuilderRegistry;
use mips_simulator::mem::main_memory::FIRST_TEXT_ADDRESS;
use mips_simulator::sim::{loader, MultiAluPipelinedSimulation, MultiCycleSimulation};
use mips_simulator::core::reg::RegisterFile;

/// Command-line arguments for the MIPS simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "MIPS32 cache and pipeline simulator")]
struct Args {
    /// TOML configuration file; defaults apply when absent.
    #[arg(short, long)]
    config: Option<String>,

    /// Flat binary of MIPS32 instruction words to execute.
    #[arg(short, long)]
    file: String,

    /// Print statistics as JSON instead of the table.
    #[arg(long)]
    json_stats: bool,
}

fn main() {
    let args = Args::parse();

    let config: Config = match &args.config {
        Some(path) => {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(error) => {
                    eprintln!("Failed to read {path}: {error}");
                    process::exit(1);
                }
            };
            match toml::from_str(&content) {
                Ok(config) => config,
                Err(error) => {
                    eprintln!("Failed to parse {path}: {error}");
                    process::exit(1);
                }
            }
        }
        None => Config::default(),
    };

    let registry = BuilderRegistry::with_defaults();
    let mut memory = match config.build_memory(&registry) {
        Ok(memory) => memory,
        Err(error) => {
            eprintln!("Invalid configuration: {error}");
            process::exit(1);
        }
    };

    println!("Global Configuration");
    println!("--------------------");
    println!("Architecture:  {:?}", config.general.architecture);
    println!("Undo:          {}", config.simulation.undo);
    println!("Forwarding:    {}", config.simulation.forwarding);
    println!("Cache levels:  {}", config.cache.len());
    for (index, level) in config.cache.iter().enumerate() {
        println!("  L{}: {}", index + 1, level.builder);
    }
    println!("--------------------");

    let program = loader::load_binary(&args.file);
    println!(
        "[Loader] Writing {} bytes to {:#010x}",
        program.len(),
        FIRST_TEXT_ADDRESS
    );
    let last_address = match loader::write_program(&mut memory, FIRST_TEXT_ADDRESS, &program) {
        Ok(address) => address,
        Err(exception) => {
            eprintln!("Failed to load program: {exception}");
            process::exit(1);
        }
    };

    let registers = RegisterFile::new(FIRST_TEXT_ADDRESS);
    let data = config.simulation_data();

    match config.general.architecture {
        Architecture::MultiCycle => {
            let mut simulation = MultiCycleSimulation::new(registers, memory, data, last_address);
            simulation.execute_all();
            let stats = simulation.stats();
            if args.json_stats {
                println!("{}", stats.to_json(simulation.memory()));
            } else {
                stats.print(simulation.memory());
            }
        }
        Architecture::MultiAluPipelined => {
            let alus = config.build_alus();
            let mut simulation =
                MultiAluPipelinedSimulation::new(registers, memory, data, alus, last_address);
            simulation.execute_all();
            let stats = simulation.stats();
            if args.json_stats {
                println!("{}", stats.to_json(simulation.memory()));
            } else {
                stats.print(simulation.memory());
            }
        }
    }
}
