//! Fleet server binary: boot the manager, run its periodic jobs and the
//! operational HTTP surface side by side. Run with `--port`, defaults to
//! 8080.

const DEFAULT_PORT: u16 = 8080;

fn parse_port(args: &[String]) -> u16 {
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().unwrap_or(DEFAULT_PORT);
        }
        i += 1;
    }
    DEFAULT_PORT
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_port(&args);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let config = fleetcore::config::ensure_loaded();
        let manager = fleetserver::boot(config).await?;
        manager.start().await?;

        let manager_for_jobs = manager.clone();
        tokio::spawn(async move { manager_for_jobs.run().await });

        fleetserver::run_http_server(manager, port).await?;
        Ok(())
    })
}
