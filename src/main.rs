use std::process;

use chroma::cli::Cli;
use chroma::driver;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    log::debug!("optimization level {} requested", cli.opt_level);

    match driver::run_file(cli.mode(), &cli.source, &cli.allocator_config()) {
        Ok(output) => {
            if cli.emit() {
                print!("{}", output);
            }
        }
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(1);
        }
    }
}
