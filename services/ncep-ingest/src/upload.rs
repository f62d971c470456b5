//! Column-store sync to S3.
//!
//! Thin glue: after the transpose completes, freshly written om files are
//! uploaded so downstream readers can serve from object storage.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Upload every om file under `store_root` to `bucket` with the domain
/// name as key prefix.
pub async fn upload_store(bucket: &str, prefix: &str, store_root: &Path) -> Result<()> {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    let client = aws_sdk_s3::Client::new(&config);

    let mut uploaded = 0usize;
    let mut entries = tokio::fs::read_dir(store_root)
        .await
        .context("reading store root")?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("om") {
            continue;
        }
        let file_name = entry.file_name();
        let key = format!("{}/{}", prefix, file_name.to_string_lossy());

        let body = aws_sdk_s3::primitives::ByteStream::from_path(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("uploading {}", key))?;

        debug!(key = %key, "Uploaded");
        uploaded += 1;
    }

    info!(bucket = %bucket, files = uploaded, "Store upload complete");
    Ok(())
}
