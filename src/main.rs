use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = mailsweep::cli::Cli::parse();

    if let Err(err) = mailsweep::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
