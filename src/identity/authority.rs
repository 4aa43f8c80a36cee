//! Authority URL handling and OpenID tenant discovery.

use serde::Deserialize;

use super::IdentityError;

const TENANT_DISCOVERY_PATH: &str = "/v2.0/.well-known/openid-configuration";

/// Endpoints discovered for an authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub authority_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

#[derive(Deserialize)]
struct TenantDiscoveryResponse {
    authorization_endpoint: String,
    token_endpoint: String,
}

impl Authority {
    /// Fetch the OpenID configuration for `authority_url`.
    pub async fn discover(http: &reqwest::Client, authority_url: &str) -> Result<Self, IdentityError> {
        let authority_url = authority_url.trim_end_matches('/');
        let url = discovery_url(authority_url);
        tracing::debug!(%url, "tenant discovery");

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| IdentityError::Discovery(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IdentityError::Discovery(e.to_string()))?;
        if !status.is_success() {
            return Err(IdentityError::Discovery(format!("{url} returned {status}: {body}")));
        }

        parse_discovery(authority_url, &body)
    }
}

#[must_use]
pub fn discovery_url(authority_url: &str) -> String {
    format!("{}{TENANT_DISCOVERY_PATH}", authority_url.trim_end_matches('/'))
}

fn parse_discovery(authority_url: &str, body: &str) -> Result<Authority, IdentityError> {
    let doc: TenantDiscoveryResponse =
        serde_json::from_str(body).map_err(|e| IdentityError::Discovery(format!("unexpected response: {e}")))?;
    Ok(Authority {
        authority_url: authority_url.to_string(),
        authorization_endpoint: doc.authorization_endpoint,
        token_endpoint: doc.token_endpoint,
    })
}

#[cfg(test)]
#[path = "authority_test.rs"]
mod tests;
