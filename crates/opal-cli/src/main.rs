//! opal command-line driver
//!
//! Loads a program description and an execution profile, runs the profile
//! reader, and reports how well the profile matched the program.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opal_core::{Function, Program};
use opal_profile::{ProfileReader, ReaderConfig, ReaderStats};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opal")]
#[command(about = "opal post-link binary optimizer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an execution profile to a program description
    ReadProfile {
        /// Program description (JSON list of functions)
        program: PathBuf,
        /// Profile document
        profile: PathBuf,
        /// Ignore structural hashes while matching
        #[arg(long)]
        ignore_hash: bool,
        /// Match renamed functions by structural hash
        #[arg(long)]
        match_with_function_hash: bool,
        /// Edit-distance threshold for name-similarity matching (0 disables)
        #[arg(long, default_value_t = 0)]
        name_similarity_threshold: u32,
        /// Hand structurally mismatched functions to stale-profile inference
        #[arg(long)]
        infer_stale_profile: bool,
        /// Drop unprofiled functions from further consideration
        #[arg(long)]
        lite: bool,
        /// Diagnostic verbosity (-v warnings, -vv per-record detail)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::ReadProfile {
            program,
            profile,
            ignore_hash,
            match_with_function_hash,
            name_similarity_threshold,
            infer_stale_profile,
            lite,
            verbose,
        } => {
            let config = ReaderConfig {
                verbosity: verbose as u32,
                ignore_hash,
                match_with_function_hash,
                name_similarity_threshold,
                infer_stale_profile,
                lite,
            };
            read_profile(&program, &profile, config)
        }
    }
}

fn read_profile(program_path: &PathBuf, profile_path: &PathBuf, config: ReaderConfig) -> Result<()> {
    let content = std::fs::read_to_string(program_path)
        .with_context(|| format!("reading program description {}", program_path.display()))?;
    let functions: Vec<Function> = serde_json::from_str(&content)
        .with_context(|| format!("parsing program description {}", program_path.display()))?;
    let mut program = Program::new();
    for function in functions {
        program.add_function(function);
    }

    let mut reader = ProfileReader::from_path(profile_path, config)
        .with_context(|| format!("loading profile {}", profile_path.display()))?;
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program).clone();

    print_stats(&stats, program.len());
    Ok(())
}

fn print_stats(stats: &ReaderStats, num_functions: usize) {
    println!("functions in program:          {}", num_functions);
    println!("matched by exact name:         {}", stats.matched_with_exact_name);
    println!("matched by hash:               {}", stats.matched_with_hash);
    println!("matched by LTO common name:    {}", stats.matched_with_lto_common_name);
    println!("matched leniently by name:     {}", stats.matched_with_lenient_name);
    println!("matched by name similarity:    {}", stats.matched_with_name_similarity);
    println!("profiled functions:            {}", stats.functions_profiled);
    println!("unused profiled objects:       {}", stats.unused_profiled_objects);
    println!("duplicate profiles dropped:    {}", stats.duplicate_profiles_dropped);
    println!("hash mismatches:               {}", stats.hash_mismatches);
    println!("block count mismatches:        {}", stats.block_count_mismatches);
    println!("mismatched blocks:             {}", stats.mismatched_blocks);
    println!("mismatched calls:              {}", stats.mismatched_calls);
    println!("mismatched edges:              {}", stats.mismatched_edges);
    println!("duplicate annotations:         {}", stats.duplicate_annotations);
}
