use chrono::Local;
use ghg_harvest::{info_time, process::upload_outputs, run_pipeline, Config, Error, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let config = Config::from_env()?;

    let summary = run_pipeline(&config).await?;
    info_time!("{}", summary);

    if let Some(bucket) = config.bucket.as_deref() {
        let uploaded = upload_outputs(&config, bucket).await?;
        info_time!("Uploaded {} files to bucket {}", uploaded, bucket);
    }
    info_time!(start_time, "Full program time:");

    if !summary.is_complete() {
        return Err(Error::IncompleteRun {
            failures: summary.failure_count(),
        });
    }
    Ok(())
}
