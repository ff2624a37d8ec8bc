use std::path::PathBuf;

use clap::Parser;

use crate::driver::Mode;
use crate::registers::{AllocatorConfig, Target};

#[derive(Parser, Debug)]
#[command(name = "chroma")]
#[command(about = "Register allocator for a typed, block-structured IR")]
pub struct Cli {
    /// Source file holding one or more functions
    pub source: PathBuf,

    /// Log allocation rounds and spills to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the generated code (1) or only check it (0). Analysis modes
    /// always print.
    #[arg(short = 'g', default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub generate: u8,

    /// Optimization level, accepted for compatibility
    #[arg(short = 'O', default_value_t = 0)]
    pub opt_level: u8,

    /// Apply the spill request in SOURCE and print the rewritten function
    #[arg(short = 's', long = "spill", group = "mode")]
    pub spill: bool,

    /// Print live-in and live-out sets
    #[arg(short = 'l', long = "liveness", group = "mode")]
    pub liveness: bool,

    /// Print the interference graph
    #[arg(short = 'i', long = "interference", group = "mode")]
    pub interference: bool,

    /// Color with only the first N allocatable registers
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=15))]
    pub registers: Option<u8>,
}

impl Cli {
    /// Parses the command line. Usage errors exit with status 1, `--help`
    /// exits with status 0.
    pub fn parse() -> Self {
        match <Self as Parser>::try_parse() {
            Ok(cli) => cli,
            Err(err) => {
                let code = if err.use_stderr() { 1 } else { 0 };
                let _ = err.print();
                std::process::exit(code);
            }
        }
    }

    pub fn mode(&self) -> Mode {
        if self.spill {
            Mode::Spill
        } else if self.liveness {
            Mode::Liveness
        } else if self.interference {
            Mode::Interference
        } else {
            Mode::Compile
        }
    }

    pub fn emit(&self) -> bool {
        self.generate == 1 || self.mode() != Mode::Compile
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        let target = match self.registers {
            Some(count) => Target::with_registers(count as usize),
            None => Target::x86_64(),
        };
        AllocatorConfig {
            target,
            ..AllocatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("chroma").chain(args.iter().copied()))
    }

    #[test]
    fn test_modes() {
        assert_eq!(parse(&["f.ir"]).unwrap().mode(), Mode::Compile);
        assert_eq!(parse(&["-l", "f.ir"]).unwrap().mode(), Mode::Liveness);
        assert_eq!(parse(&["-i", "f.ir"]).unwrap().mode(), Mode::Interference);
        assert_eq!(parse(&["-s", "f.ir"]).unwrap().mode(), Mode::Spill);
    }

    #[test]
    fn test_options() {
        let cli = parse(&["-v", "-g", "0", "-O", "2", "--registers", "3", "f.ir"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.emit());
        assert_eq!(cli.opt_level, 2);
        assert_eq!(cli.allocator_config().target.k(), 3);
        assert_eq!(parse(&["f.ir"]).unwrap().allocator_config().target.k(), 15);
        assert!(parse(&["-g", "0", "-l", "f.ir"]).unwrap().emit());
        assert!(parse(&["-g", "0", "-s", "f.ir"]).unwrap().emit());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["-l", "-i", "f.ir"]).is_err());
        assert!(parse(&["-g", "2", "f.ir"]).is_err());
        assert!(parse(&["--registers", "0", "f.ir"]).is_err());
    }
}
