use std::time::Duration;

use anyhow::{bail, Result};
use sitegen_core::config::Settings;
use sitegen_core::watcher::DirectoryWatcher;
use sitegen_core::Pipeline;
use tracing::info;

use crate::{connect_uploader, WatchArgs};

pub async fn handle_watch(settings: &Settings, args: WatchArgs) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| settings.layout.output_root.clone());
    if args.interval_ms == 0 {
        bail!("--interval-ms must be greater than zero");
    }

    let mut pipeline = Pipeline::new().require_doctype(settings.require_doctype);
    if args.execute {
        pipeline = pipeline.with_uploader(connect_uploader(settings).await?);
    } else {
        println!(
            "Dry run: new files are reported, not uploaded. Re-run with --execute to publish."
        );
    }

    let watcher = DirectoryWatcher::new(&dir).await?;
    println!("Watching {} every {} ms (Ctrl-C to stop)", dir.display(), args.interval_ms);

    tokio::select! {
        _ = watcher.run(&pipeline, Duration::from_millis(args.interval_ms), args.execute) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("watch stopped");
        }
    }

    Ok(())
}
