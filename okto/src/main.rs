use std::path::PathBuf;

use clap::Parser;

mod keymap;
mod run;

/// CHIP-8 virtual machine.
#[derive(Parser)]
#[command(name = "okto", version, about)]
struct Args {
    /// Program image to load at 0x200
    rom: PathBuf,

    /// Instructions per second
    #[arg(long, default_value_t = okto_core::constants::CLOCK_HZ)]
    clock: u32,

    /// Window scale factor
    #[arg(long, default_value_t = 10)]
    scale: u32,

    /// Seed for the RND instruction; OS entropy when omitted
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    run::run(Args::parse())
}
