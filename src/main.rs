use logrelay::cli::Cli;
use logrelay::tracing_init::{init_tracing, DEFAULT_FILTER};

#[tokio::main]
async fn main() {
    init_tracing(DEFAULT_FILTER);

    match Cli::run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
    }
}
