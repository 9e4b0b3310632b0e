//! Unrestrict API client: one bearer-authenticated POST per mirror link.

use serde::Deserialize;
use std::time::Duration;

use super::{ResolveError, Resolver};
use crate::config::{HttpConfig, UnrestrictConfig};

/// Responses larger than this are not a link payload.
const MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Debug, Deserialize)]
struct UnrestrictResponse {
    download: String,
}

/// Extracts the direct URL from a 200 response body (`{"download": "..."}`).
pub fn parse_unrestrict_body(body: &[u8]) -> Result<String, ResolveError> {
    let parsed: UnrestrictResponse =
        serde_json::from_slice(body).map_err(|e| ResolveError::Malformed(e.to_string()))?;
    let url = parsed.download.trim();
    if url.is_empty() {
        return Err(ResolveError::Malformed("empty download field".to_string()));
    }
    Ok(url.to_string())
}

/// Client for the unrestrict endpoint.
#[derive(Debug, Clone)]
pub struct UnrestrictClient {
    endpoint: String,
    token: Option<String>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl UnrestrictClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(unrestrict: &UnrestrictConfig, http: &HttpConfig) -> Self {
        let mut client = Self::new(unrestrict.endpoint.clone(), unrestrict.effective_token());
        client.connect_timeout = http.connect_timeout();
        client
    }

    pub fn with_timeouts(mut self, connect: Duration, total: Duration) -> Self {
        self.connect_timeout = connect;
        self.timeout = total;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn post_link(&self, token: &str, mirror_url: &str) -> Result<(u32, Vec<u8>), ResolveError> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("link", mirror_url)
            .finish();

        let mut easy = curl::easy::Easy::new();
        easy.url(&self.endpoint)?;
        easy.post(true)?;
        easy.post_fields_copy(form.as_bytes())?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;

        let mut list = curl::easy::List::new();
        list.append(&format!("Authorization: Bearer {}", token.trim()))?;
        list.append("Accept: application/json")?;
        easy.http_headers(list)?;

        let mut body = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                if body.len() + data.len() > MAX_BODY_BYTES {
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        Ok((code, body))
    }
}

impl Resolver for UnrestrictClient {
    fn resolve(&self, mirror_url: &str) -> Result<String, ResolveError> {
        let token = self.token.as_deref().ok_or(ResolveError::MissingToken)?;
        let (code, body) = self.post_link(token, mirror_url)?;
        if code != 200 {
            tracing::debug!(code, link = mirror_url, "unrestrict rejected link");
            return Err(ResolveError::Status(code));
        }
        parse_unrestrict_body(&body)
    }
}
