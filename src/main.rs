use clap::Parser;

fn main() {
    env_logger::init();
    let cli = crunchcel::cli::Cli::parse();
    if let Err(err) = crunchcel::cli::run(&cli) {
        eprintln!("crunchcel: {}", err);
        std::process::exit(1);
    }
}
