use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_stream::{Stream, StreamExt};

use crate::error::DownloadError;
use crate::models::{ClipRecord, LocalClipFile};
use crate::resolver::ClipSourceResolver;

/// Write buffer size; the body is never held in memory as a whole.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Path a clip is downloaded to, `<dir>/<clip id>.mp4`.
pub fn clip_path(dir: &Path, clip_id: &str) -> Result<PathBuf, DownloadError> {
    let usable = !clip_id.is_empty()
        && clip_id != "."
        && clip_id != ".."
        && !clip_id.contains(['/', '\\', '\0']);
    if !usable {
        return Err(DownloadError::InvalidClipId(clip_id.to_string()));
    }
    Ok(dir.join(format!("{}.mp4", clip_id)))
}

/// Fails unless `dir` already exists as a directory. Never creates it.
pub async fn ensure_destination(dir: &Path) -> Result<(), DownloadError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(DownloadError::InvalidDestination(dir.to_path_buf())),
    }
}

/// Copies a byte stream into `file`, returning the number of bytes written.
pub async fn write_stream<S, E>(mut stream: S, file: File) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<DownloadError>,
{
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Resolves a clip's media URL and streams it to disk.
pub struct ClipDownloader {
    http: Client,
    resolver: Box<dyn ClipSourceResolver>,
}

impl ClipDownloader {
    pub fn new(http: Client, resolver: Box<dyn ClipSourceResolver>) -> Self {
        Self { http, resolver }
    }

    pub async fn download(
        &self,
        clip: &ClipRecord,
        destination: &Path,
    ) -> Result<LocalClipFile, DownloadError> {
        info!("Downloading clip {}", clip.id);
        ensure_destination(destination).await?;
        let path = clip_path(destination, &clip.id)?;

        let source = self.resolver.resolve(clip).await?;
        let resp = self.http.get(source.clone()).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            warn!("Error when downloading clip {}: {}", clip.id, status);
            return Err(DownloadError::Upstream {
                url: source.to_string(),
                status,
            });
        }

        let file = File::create(&path).await?;
        match write_stream(Box::pin(resp.bytes_stream()), file).await {
            Ok(bytes) => {
                debug!("Wrote {} bytes to {}", bytes, path.display());
                info!("Downloaded {}", path.display());
                Ok(LocalClipFile {
                    clip_id: clip.id.clone(),
                    path,
                })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!("Couldn't remove partial file {}: {}", path.display(), rm);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use async_trait::async_trait;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Points every clip at `<base>/<clip id>.mp4`.
    struct FixedResolver {
        base: String,
    }

    #[async_trait]
    impl ClipSourceResolver for FixedResolver {
        async fn resolve(&self, clip: &ClipRecord) -> Result<Url, ResolveError> {
            Ok(Url::parse(&format!("{}/{}.mp4", self.base, clip.id)).unwrap())
        }
    }

    fn clip(id: &str) -> ClipRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "broadcaster_id": "5582097",
            "view_count": 250,
            "created_at": "2017-11-30T22:34:18Z"
        }))
        .unwrap()
    }

    fn downloader(server: &MockServer) -> ClipDownloader {
        ClipDownloader::new(
            Client::new(),
            Box::new(FixedResolver { base: server.uri() }),
        )
    }

    #[tokio::test]
    async fn streams_body_to_clip_file() {
        let server = MockServer::start().await;
        let payload = vec![7u8; 3 * CHUNK_SIZE + 17];
        Mock::given(method("GET"))
            .and(path("/RandomClip1.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let local = downloader(&server)
            .download(&clip("RandomClip1"), dir.path())
            .await
            .unwrap();

        assert_eq!(local.path, dir.path().join("RandomClip1.mp4"));
        assert_eq!(std::fs::read(&local.path).unwrap(), payload);
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let err = downloader(&server)
            .download(&clip("Gone"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Upstream { status: 403, .. }));
        assert!(!dir.path().join("Gone.mp4").exists());
    }

    #[tokio::test]
    async fn missing_destination_is_not_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = downloader(&server)
            .download(&clip("RandomClip1"), &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidDestination(_)));
        assert!(err.is_fatal());
        assert!(!missing.exists());
    }

    #[test]
    fn clip_ids_that_escape_the_directory() {
        let dir = Path::new("/clips");
        assert_eq!(
            clip_path(dir, "AwkwardHelplessSalamanderSwiftRage-x1").unwrap(),
            PathBuf::from("/clips/AwkwardHelplessSalamanderSwiftRage-x1.mp4")
        );
        for bad in ["", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(matches!(clip_path(dir, bad), Err(DownloadError::InvalidClipId(_))));
        }
    }

    #[tokio::test]
    async fn write_stream_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defg")),
        ];
        let file = File::create(&target).await.unwrap();

        let total = write_stream(tokio_stream::iter(chunks), file).await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcdefg");
    }
}
