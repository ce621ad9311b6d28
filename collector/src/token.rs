use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::http_client::HttpClient;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue,
};
use serde::Deserialize;
use std::fmt;

pub const WORKSPACE: HeaderName = HeaderName::from_static("workspace");

/// Bearer credential for the data service.
///
/// Lives for one aggregation request and is never refreshed or cached.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    bearer: HeaderValue,
}

impl Token {
    pub fn new(value: &str) -> Result<Self, InvalidHeaderValue> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {value}"))?;
        bearer.set_sensitive(true);
        Ok(Token { bearer })
    }

    /// `Authorization` header value for this token.
    pub fn bearer(&self) -> &HeaderValue {
        &self.bearer
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

pub struct TokenProvider<'a> {
    client: &'a HttpClient,
    config: &'a AuthConfig,
}

impl<'a> TokenProvider<'a> {
    pub fn new(client: &'a HttpClient, config: &'a AuthConfig) -> Self {
        Self { client, config }
    }

    pub async fn fetch_token(&self) -> Result<Token, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = self
            .client
            .post(&self.config.url, &self.config.body, &headers)
            .await?;

        let response: TokenResponse =
            serde_json::from_value(body).map_err(|_| AuthError::MalformedTokenResponse)?;

        match response.token {
            Some(token) if !token.is_empty() => {
                Token::new(&token).map_err(|_| AuthError::MalformedTokenResponse)
            }
            _ => Err(AuthError::MalformedTokenResponse),
        }
    }
}

/// Headers sent with every data service request.
pub fn data_headers(workspace: &HeaderValue, token: &Token) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(WORKSPACE, workspace.clone());
    headers.insert(AUTHORIZATION, token.bearer().clone());
    headers
}
