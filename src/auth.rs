use log::info;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ApiError;
use crate::helix::check_status;
use crate::models::Credentials;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// An app access token from the client-credentials flow.
///
/// `revoke` consumes the token; it can't be used afterwards.
#[derive(Debug)]
pub struct AppAccessToken {
    http: Client,
    oauth_url: String,
    client_id: String,
    token: String,
}

impl AppAccessToken {
    pub async fn request(
        http: Client,
        oauth_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, ApiError> {
        info!("Requesting an app access token for {}", client_id);
        let oauth_url = oauth_url.trim_end_matches('/').to_string();
        let resp = http
            .post(format!("{}/token", oauth_url))
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let resp = check_status("oauth2/token", resp).await?;
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::malformed("oauth2/token", e))?;
        info!("Got an app access token");

        Ok(Self {
            http,
            oauth_url,
            client_id: client_id.to_string(),
            token: body.access_token,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.client_id, &self.token)
    }

    /// True when the validation endpoint answers 200.
    pub async fn validate(&self) -> Result<bool, ApiError> {
        let resp = self
            .http
            .get(format!("{}/validate", self.oauth_url))
            .header("Authorization", format!("OAuth {}", self.token))
            .send()
            .await?;
        let valid = resp.status().as_u16() == 200;
        info!("App access token is valid: {}", valid);
        Ok(valid)
    }

    pub async fn revoke(self) -> Result<(), ApiError> {
        info!("Revoking app access token");
        let resp = self
            .http
            .post(format!("{}/revoke", self.oauth_url))
            .form(&[("client_id", self.client_id.as_str()), ("token", self.token.as_str())])
            .send()
            .await?;
        check_status("oauth2/revoke", resp).await?;
        info!("App access token was revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "uo6dggojyb8d6soh92zknwmi5ej1q2";
    const TOKEN: &str = "prau3ol6mg5glgek8m89ec2s9q5i3i";

    async fn token_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": TOKEN,
                "expires_in": 5011271,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn request_and_validate() {
        let server = token_server().await;
        Mock::given(method("GET"))
            .and(path("/validate"))
            .and(header("Authorization", format!("OAuth {TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let token = AppAccessToken::request(Client::new(), &server.uri(), CLIENT_ID, "secret")
            .await
            .unwrap();
        assert_eq!(token.credentials().token, TOKEN);
        assert_eq!(token.credentials().client_id, CLIENT_ID);
        assert!(token.validate().await.unwrap());
    }

    #[tokio::test]
    async fn invalid_token_is_not_an_error() {
        let server = token_server().await;
        Mock::given(method("GET"))
            .and(path("/validate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let token = AppAccessToken::request(Client::new(), &server.uri(), CLIENT_ID, "secret")
            .await
            .unwrap();
        assert!(!token.validate().await.unwrap());
    }

    #[tokio::test]
    async fn bad_secret_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "status": 403,
                "message": "invalid client secret"
            })))
            .mount(&server)
            .await;

        let err = AppAccessToken::request(Client::new(), &server.uri(), CLIENT_ID, "wrong")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid client secret"));
    }

    #[tokio::test]
    async fn revoke_posts_token() {
        let server = token_server().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains(TOKEN))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let token = AppAccessToken::request(Client::new(), &server.uri(), CLIENT_ID, "secret")
            .await
            .unwrap();
        token.revoke().await.unwrap();
    }
}
