//! QuickFeather Programmer: main entry point

use clap::Parser;
use tracing::{info, error, debug};
use tracing_subscriber::{EnvFilter, fmt};
use rmcp::{ServiceExt, transport::stdio};

use quickfeather_program::{Args, Config, DeviceProgrammer, DirectoryProducts, QuickfeatherToolHandler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = Config::from_args(&args);

    if let Some(name) = &args.program {
        info!("Programming '{}' from {}", name, config.build_dir.display());
        let mut products = DirectoryProducts::new(&config.build_dir);
        if config.keep_files {
            products = products.in_place();
        }
        let report = DeviceProgrammer::new(config.programmer)
            .program(&products, name)
            .await
            .inspect_err(|e| error!("Programming failed: {}", e))?;
        info!("Done: session {} in {:?}", report.session_id, report.elapsed);
        return Ok(());
    }

    info!("Starting QuickFeather MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let service = QuickfeatherToolHandler::new(config)
        .serve(stdio()).await.inspect_err(|e| {
            error!("Serving error: {:?}", e);
        })?;

    service.waiting().await?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    debug!("Logging initialized with level: {}", args.log_level);
    Ok(())
}
