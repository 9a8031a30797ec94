use env_logger::Env;

#[tokio::main]
async fn main() -> pwa_cache::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    #[cfg(feature = "cli")]
    {
        pwa_cache::cli::run().await
    }
    #[cfg(not(feature = "cli"))]
    {
        eprintln!("CLI support not compiled in");
        std::process::exit(1);
    }
}
