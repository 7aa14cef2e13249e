use anyhow::{Context, Result};
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use log::info;
use std::path::Path;

/// Publishes finished reels to an S3 bucket.
pub struct S3Uploader {
    client: Client,
    bucket: String,
    /// Optional endpoint override (for example, "http://127.0.0.1:9000" for MinIO)
    endpoint: Option<String>,
}

impl S3Uploader {
    /// Creates a new S3Uploader.
    ///
    /// * `bucket` - The S3 bucket name.
    /// * `endpoint` - An optional endpoint override (e.g. Some("http://127.0.0.1:9000")
    ///   to use a local S3-compatible service like MinIO).
    ///
    /// Credentials come from the usual AWS environment chain.
    pub async fn new(bucket: &str, endpoint: Option<&str>) -> Result<Self> {
        let region_provider = RegionProviderChain::default_provider().or_else(Region::new("us-east-1"));
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ep) = endpoint {
            config = config.endpoint_url(ep).force_path_style(true);
        }
        let client = Client::from_conf(config.build());

        Ok(S3Uploader {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.map(|s| s.to_string()),
        })
    }

    /// Key for a reel: its file name.
    pub fn object_key(path: &Path) -> Result<String> {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("{} has no usable file name", path.display()))
    }

    /// Streams the reel at `path` to the bucket. Returns the object URL.
    pub async fn upload_reel(&self, path: &Path) -> Result<String> {
        let key = Self::object_key(path)?;
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type(path))
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to bucket {}", key, self.bucket))?;

        let url = object_url(self.endpoint.as_deref(), &self.bucket, &key);
        info!("Uploaded reel to {}", url);
        Ok(url)
    }
}

/// Where an uploaded object can be fetched from.
pub fn object_url(endpoint: Option<&str>, bucket: &str, object_key: &str) -> String {
    match endpoint {
        Some(ep) => format!("{}/{}/{}", ep.trim_end_matches('/'), bucket, object_key),
        None => format!("https://{}.s3.amazonaws.com/{}", bucket, object_key),
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogv") => "video/ogg",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
