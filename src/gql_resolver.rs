use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::ResolveError;
use crate::models::ClipRecord;
use crate::resolver::ClipSourceResolver;

const OPERATION_NAME: &str = "VideoAccessToken_Clip";
const PERSISTED_QUERY_HASH: &str = "36b89d2507fce29e5ca551df756d27c1cfe079e2609642b4390aa4c35796eb11";

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

#[derive(Debug, Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    clip: Option<GqlClip>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlClip {
    playback_access_token: Option<PlaybackAccessToken>,
    #[serde(default)]
    video_qualities: Vec<VideoQuality>,
}

#[derive(Debug, Deserialize)]
struct PlaybackAccessToken {
    signature: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQuality {
    pub quality: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
}

/// Picks `preferred` when offered, otherwise the highest numeric quality.
pub fn select_quality<'a>(
    qualities: &'a [VideoQuality],
    preferred: Option<&str>,
) -> Option<&'a VideoQuality> {
    if let Some(wanted) = preferred {
        if let Some(found) = qualities.iter().find(|q| q.quality == wanted) {
            return Some(found);
        }
    }
    qualities
        .iter()
        .max_by_key(|q| q.quality.parse::<u32>().unwrap_or(0))
}

/// Asks the GraphQL endpoint for the clip's quality variants and a playback token.
pub struct GqlResolver {
    http: Client,
    endpoint: String,
    client_id: String,
    preferred_quality: Option<String>,
}

impl GqlResolver {
    pub fn new(http: Client, endpoint: &str, client_id: &str, preferred_quality: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            client_id: client_id.to_string(),
            preferred_quality,
        }
    }
}

#[async_trait]
impl ClipSourceResolver for GqlResolver {
    async fn resolve(&self, clip: &ClipRecord) -> Result<Url, ResolveError> {
        info!("Querying playback access for clip {}", clip.id);
        let body = json!({
            "operationName": OPERATION_NAME,
            "variables": { "slug": clip.id },
            "extensions": {
                "persistedQuery": { "version": 1, "sha256Hash": PERSISTED_QUERY_HASH }
            }
        });
        let resp = self
            .http
            .post(&self.endpoint)
            .header("Client-ID", &self.client_id)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(ResolveError::Upstream {
                url: self.endpoint.clone(),
                status,
            });
        }

        let parsed: GqlResponse = resp.json().await?;
        if let Some(first) = parsed.errors.first() {
            return Err(ResolveError::Query {
                clip_id: clip.id.clone(),
                message: first.message.clone(),
            });
        }
        let gql_clip = parsed
            .data
            .and_then(|d| d.clip)
            .ok_or_else(|| ResolveError::ClipNotFound(clip.id.clone()))?;
        let token = gql_clip.playback_access_token.ok_or_else(|| ResolveError::Query {
            clip_id: clip.id.clone(),
            message: "no playback access token".to_string(),
        })?;
        let quality = select_quality(&gql_clip.video_qualities, self.preferred_quality.as_deref())
            .ok_or_else(|| ResolveError::ClipNotFound(clip.id.clone()))?;
        debug!("Clip {} using quality {}", clip.id, quality.quality);

        let mut url = Url::parse(&quality.source_url).map_err(|e| ResolveError::InvalidUrl {
            url: quality.source_url.clone(),
            message: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("sig", &token.signature)
            .append_pair("token", &token.value);
        info!("Clip {} source is {}", clip.id, url.as_str());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn clip() -> ClipRecord {
        serde_json::from_value(json!({
            "id": "AwkwardHelplessSalamanderSwiftRage",
            "broadcaster_id": "5582097",
            "view_count": 250,
            "created_at": "2017-11-30T22:34:18Z"
        }))
        .unwrap()
    }

    fn qualities() -> serde_json::Value {
        json!([
            {"frameRate": 30, "quality": "360", "sourceURL": "https://media.example/360.mp4"},
            {"frameRate": 60, "quality": "1080", "sourceURL": "https://media.example/1080.mp4"},
            {"frameRate": 60, "quality": "720", "sourceURL": "https://media.example/720.mp4"}
        ])
    }

    async fn server_with(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gql"))
            .and(header("Client-ID", "kimne78kx3ncx6brgo4mv6wki5h1ko"))
            .and(body_partial_json(json!({
                "operationName": "VideoAccessToken_Clip",
                "variables": {"slug": "AwkwardHelplessSalamanderSwiftRage"}
            })))
            .respond_with(response)
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn resolver(server: &MockServer, preferred: Option<&str>) -> GqlResolver {
        GqlResolver::new(
            Client::new(),
            &format!("{}/gql", server.uri()),
            "kimne78kx3ncx6brgo4mv6wki5h1ko",
            preferred.map(str::to_string),
        )
    }

    #[test]
    fn highest_quality_by_default() {
        let list: Vec<VideoQuality> = serde_json::from_value(qualities()).unwrap();
        assert_eq!(select_quality(&list, None).unwrap().quality, "1080");
        assert_eq!(select_quality(&list, Some("720")).unwrap().quality, "720");
        assert_eq!(select_quality(&list, Some("4k")).unwrap().quality, "1080");
        assert!(select_quality(&[], None).is_none());
    }

    #[tokio::test]
    async fn signs_selected_source() {
        let server = server_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"clip": {
                "id": "123",
                "playbackAccessToken": {"signature": "f00d", "value": "{\"clip_uri\":\"x\"}"},
                "videoQualities": qualities()
            }}
        })))
        .await;

        let url = resolver(&server, Some("720")).resolve(&clip()).await.unwrap();
        assert_eq!(url.path(), "/720.mp4");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("sig".to_string(), "f00d".to_string()),
                ("token".to_string(), "{\"clip_uri\":\"x\"}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_clip() {
        let server = server_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"clip": null}
        })))
        .await;
        let err = resolver(&server, None).resolve(&clip()).await.unwrap_err();
        assert!(matches!(err, ResolveError::ClipNotFound(id) if id == "AwkwardHelplessSalamanderSwiftRage"));
    }

    #[tokio::test]
    async fn query_error() {
        let server = server_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "PersistedQueryNotFound"}]
        })))
        .await;
        let err = resolver(&server, None).resolve(&clip()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Query { message, .. } if message == "PersistedQueryNotFound"));
    }

    #[tokio::test]
    async fn http_error_status() {
        let server = server_with(ResponseTemplate::new(500)).await;
        let err = resolver(&server, None).resolve(&clip()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Upstream { status: 500, .. }));
    }
}
