use std::time::Duration;

use anyhow::{Context, Result};
use nvtop::{
    arg_parser::{ArgsOptions, select_devices},
    command::{CommandRunner, ReplayRunner, SystemRunner},
    config::Config,
    logger,
    monitor::Monitor,
    session::Session,
};
use tracing::{debug, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logger::init_logging();

    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    let config = match &args_options.config_file_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_overrides(&args_options);
    debug!("Configuration: {config:?}");

    let runner: Box<dyn CommandRunner> = match &args_options.replay_dir {
        Some(dir) => {
            info!("Replaying nvidia-smi output from {dir:?}");
            Box::new(ReplayRunner::new(dir, &config.nvidia_smi, SystemRunner))
        }
        None => Box::new(SystemRunner),
    };

    let session = Session::init(runner.as_ref(), &config)
        .with_context(|| "Failed to read the GPU list")?;

    let selection = select_devices(
        args_options.gpus.as_deref(),
        &session.device_indices(),
    );
    for entry in &selection.invalid {
        eprintln!("Invalid GPU id number: {entry}");
    }
    debug!(
        "Showing GPUs {:?} out of {}",
        selection.valid,
        session.device_count()
    );

    let interval = config.interval_secs;
    let monitor = Monitor::new(runner, session, config, selection.valid);

    if args_options.json {
        let frame = monitor.refresh().with_context(|| "Failed to refresh")?;
        let json = serde_json::to_string_pretty(&frame)
            .with_context(|| "Failed to serialize the frame")?;
        println!("{json}");

        return Ok(());
    }

    match interval {
        Some(secs) => {
            let interval = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid refresh interval {secs}"))?;

            monitor
                .run(interval)
                .await
                .with_context(|| "Live view failed")?;
        }
        None => {
            let frame = monitor.refresh().with_context(|| "Failed to refresh")?;
            println!("{}", monitor.draw(&frame));
        }
    }

    Ok(())
}
