// Token endpoint exchanges (OAuth2 client_credentials and refresh_token grants)

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;
use url::Url;

use super::credentials::Credentials;
use super::types::{GrantType, Token, TokenResponse};
use crate::classifier::extract_error_message;
use crate::error::{ClientError, Result};
use crate::models::ApiRequest;
use crate::transport::Transport;

/// Lifetime assumed when the server omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longest lifetime honored from the server (one year)
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 3600;

/// Where and how tokens are obtained
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: Url,
    pub scope: Option<String>,
    pub resource: Option<String>,
    /// Subtracted from the server lifetime so tokens are replaced early
    pub expiry_skew: Duration,
    pub timeout: Duration,
}

/// Exchange the credentials for a fresh token
pub async fn acquire_token<T: Transport>(
    transport: &T,
    endpoint: &TokenEndpoint,
    creds: &Credentials,
) -> Result<Token> {
    tracing::info!(principal = %creds.principal(), "Acquiring access token...");

    let mut form = vec![
        ("grant_type", GrantType::ClientCredentials.as_str()),
        ("client_id", creds.principal()),
        ("client_secret", creds.secret()),
    ];
    if let Some(scope) = endpoint.scope.as_deref() {
        form.push(("scope", scope));
    }
    if let Some(resource) = endpoint.resource.as_deref() {
        form.push(("resource", resource));
    }

    exchange(transport, endpoint, GrantType::ClientCredentials, &form).await
}

/// Exchange a refresh token for a new token
pub async fn refresh_token<T: Transport>(
    transport: &T,
    endpoint: &TokenEndpoint,
    creds: &Credentials,
    refresh: &str,
) -> Result<Token> {
    tracing::info!("Refreshing access token via refresh_token grant...");

    let mut form = vec![
        ("grant_type", GrantType::RefreshToken.as_str()),
        ("refresh_token", refresh),
        ("client_id", creds.principal()),
    ];
    if let Some(scope) = endpoint.scope.as_deref() {
        form.push(("scope", scope));
    }

    exchange(transport, endpoint, GrantType::RefreshToken, &form).await
}

async fn exchange<T: Transport>(
    transport: &T,
    endpoint: &TokenEndpoint,
    grant: GrantType,
    form: &[(&str, &str)],
) -> Result<Token> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form.iter())
        .finish();

    let mut request = ApiRequest::new(Method::POST, endpoint.url.clone())
        .without_auth()
        .timeout(endpoint.timeout)
        .body(body);
    request.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    request
        .headers_mut()
        .insert(ACCEPT, HeaderValue::from_static("application/json"));

    tracing::debug!(
        url = %endpoint.url,
        grant_type = grant.as_str(),
        "Token endpoint request"
    );

    let response = match tokio::time::timeout(endpoint.timeout, transport.send(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(error = %e, grant_type = grant.as_str(), "Token endpoint unreachable");
            return Err(ClientError::TransportFailed {
                attempts: 1,
                status: None,
                message: format!("Token endpoint request failed: {}", e),
            });
        }
        Err(_) => {
            tracing::error!(grant_type = grant.as_str(), "Token endpoint request timed out");
            return Err(ClientError::TransportFailed {
                attempts: 1,
                status: None,
                message: format!(
                    "Token endpoint did not answer within {:?}",
                    endpoint.timeout
                ),
            });
        }
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text();
        let message = extract_error_message(&error_text);
        tracing::error!(
            status = status.as_u16(),
            grant_type = grant.as_str(),
            body = %error_text,
            "Token endpoint rejected the request"
        );

        if status.is_client_error() && status.as_u16() != 408 && status.as_u16() != 429 {
            return Err(ClientError::AuthenticationFailed(format!(
                "{} grant rejected: {} - {}",
                grant.as_str(),
                status.as_u16(),
                message
            )));
        }
        return Err(ClientError::TransportFailed {
            attempts: 1,
            status: Some(status.as_u16()),
            message: format!("Token endpoint error: {} - {}", status.as_u16(), message),
        });
    }

    let data: TokenResponse = serde_json::from_slice(response.body()).map_err(|e| {
        ClientError::AuthenticationFailed(format!("Failed to parse token response: {}", e))
    })?;

    if data.access_token.is_empty() {
        return Err(ClientError::AuthenticationFailed(
            "Token response does not contain access_token".to_string(),
        ));
    }

    let expires_at = expiry_from(data.expires_in, endpoint.expiry_skew);
    tracing::info!(
        grant_type = grant.as_str(),
        expires = %expires_at.to_rfc3339(),
        "Access token obtained"
    );

    Ok(Token {
        access_token: data.access_token,
        refresh_token: data.refresh_token,
        expires_at,
        token_type: data.token_type.unwrap_or_else(|| "Bearer".to_string()),
        scope: data.scope,
    })
}

/// Absolute expiry with the skew applied (capped at half the lifetime)
///
/// Non-positive lifetimes are treated as missing and very large ones are
/// clamped, so the result is never already expired and never overflows.
fn expiry_from(expires_in: Option<i64>, skew: Duration) -> DateTime<Utc> {
    let lifetime = match expires_in {
        Some(secs) if secs > 0 => secs.min(MAX_EXPIRES_IN_SECS),
        Some(secs) => {
            tracing::warn!(expires_in = secs, "Ignoring non-positive token lifetime");
            DEFAULT_EXPIRES_IN_SECS
        }
        None => DEFAULT_EXPIRES_IN_SECS,
    };
    let skew = i64::try_from(skew.as_secs())
        .unwrap_or(i64::MAX)
        .min(lifetime / 2);

    ChronoDuration::try_seconds(lifetime - skew)
        .and_then(|remaining| Utc::now().checked_add_signed(remaining))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
