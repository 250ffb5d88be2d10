// # Cloudflare DNS Provider
//
// Implements the `DnsProvider` trait over Cloudflare API v4.
//
// The provider is a stateless single-shot client: it never retries,
// never sleeps, and never decides whether a rotation is due. Errors come
// back classified so the engine can tell an expired token from a missing
// record from a backend hiccup:
//
// - 401/403            -> auth fault
// - 404                -> record-scope fault
// - other 4xx          -> record-scope fault (payload rejected)
// - 429, 5xx, network  -> transient fault
//
// Updates preserve `type`, `name`, `proxied`, and `ttl`; only the record
// value ever changes. The API token never appears in logs or in Debug
// output.
//
// API reference: https://developers.cloudflare.com/api/
// - List zones:     GET /zones
// - List records:   GET /zones/:zone_id/dns_records
// - Read record:    GET /zones/:zone_id/dns_records/:record_id
// - Update record:  PUT /zones/:zone_id/dns_records/:record_id
// - Verify token:   GET /user/tokens/verify

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rotor_core::config::Account;
use rotor_core::traits::dns_provider::{
    DnsProvider, DnsRecord, ProviderFactory, RecordKind, TokenCheck, Zone,
};
use rotor_core::{Error, Result};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Per-request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for listing endpoints
const PAGE_SIZE: u32 = 100;

/// Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ZonePayload {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordPayload {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    content: String,
    #[serde(default)]
    proxied: bool,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

/// Cloudflare DNS provider bound to one account token
pub struct CloudflareProvider {
    api_token: String,
    client: reqwest::Client,
}

// The API token must never leak through Debug output.
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider for the given API token
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { api_token, client })
    }

    /// Issue a GET and decode the envelope
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Envelope<T>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(classify_network)?;
        decode(response).await
    }

    fn zone_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", CLOUDFLARE_API_BASE, zone_id)
    }
}

/// Map a reqwest transport error to the engine taxonomy
fn classify_network(e: reqwest::Error) -> Error {
    Error::transient(format!("HTTP request failed: {}", e))
}

/// Decode an envelope, classifying non-success statuses
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = parse_errors(&body);
        return Err(match status.as_u16() {
            401 | 403 => Error::auth(format!(
                "token rejected or missing permission ({}): {}",
                status, detail
            )),
            404 => Error::record(format!("not found ({}): {}", status, detail)),
            429 => Error::transient(format!("rate limited ({}): {}", status, detail)),
            500..=599 => Error::transient(format!("server error ({}): {}", status, detail)),
            _ => Error::record(format!("request rejected ({}): {}", status, detail)),
        });
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| Error::transient(format!("failed to parse response: {}", e)))?;
    if !envelope.success {
        let detail = envelope
            .errors
            .iter()
            .map(|e| format!("{} {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::record(format!("API reported failure: {}", detail)));
    }
    Ok(envelope)
}

/// Best-effort extraction of error messages from an error body
fn parse_errors(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        errors: Vec<ApiError>,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .iter()
            .map(|e| format!("{} {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; "),
        _ => "no detail".to_string(),
    }
}

fn to_record(payload: RecordPayload) -> Result<DnsRecord> {
    let kind = match payload.kind.as_str() {
        "A" => RecordKind::A,
        "AAAA" => RecordKind::Aaaa,
        other => {
            return Err(Error::record(format!(
                "record {} has unsupported type {}",
                payload.name, other
            )));
        }
    };
    let value: IpAddr = payload.content.parse().map_err(|e| {
        Error::record(format!(
            "record {} has non-address content {:?}: {}",
            payload.name, payload.content, e
        ))
    })?;
    Ok(DnsRecord {
        id: payload.id,
        name: payload.name,
        kind,
        value,
        proxied: payload.proxied,
        ttl: payload.ttl,
    })
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/zones?page={}&per_page={}",
                CLOUDFLARE_API_BASE, page, PAGE_SIZE
            );
            let envelope: Envelope<Vec<ZonePayload>> = self.get_json(&url).await?;
            let batch = envelope.result.unwrap_or_default();
            zones.extend(batch.into_iter().map(|z| Zone {
                id: z.id,
                name: z.name,
            }));

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page += 1,
                _ => break,
            }
        }
        Ok(zones)
    }

    async fn list_records(
        &self,
        zone_id: &str,
        kind: Option<RecordKind>,
    ) -> Result<Vec<DnsRecord>> {
        let type_filter = match kind {
            Some(k) => format!("&type={}", k.as_str()),
            None => String::new(),
        };

        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}?page={}&per_page={}{}",
                self.zone_url(zone_id),
                page,
                PAGE_SIZE,
                type_filter
            );
            let envelope: Envelope<Vec<RecordPayload>> = self.get_json(&url).await?;
            for payload in envelope.result.unwrap_or_default() {
                // Unfiltered listings include record types the engine
                // never manages; skip them rather than erroring.
                if matches!(payload.kind.as_str(), "A" | "AAAA") {
                    records.push(to_record(payload)?);
                }
            }

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page += 1,
                _ => break,
            }
        }
        Ok(records)
    }

    async fn get_record(&self, zone_id: &str, record_id: &str) -> Result<DnsRecord> {
        let url = format!("{}/{}", self.zone_url(zone_id), record_id);
        let envelope: Envelope<RecordPayload> = self.get_json(&url).await?;
        let payload = envelope
            .result
            .ok_or_else(|| Error::record(format!("record {} missing from response", record_id)))?;
        to_record(payload)
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        value: IpAddr,
    ) -> Result<DnsRecord> {
        // Read first so type, name, proxied, and ttl are preserved
        // verbatim in the PUT.
        let current = self.get_record(zone_id, record_id).await?;

        if current.value == value {
            tracing::debug!(record = %current.name, %value, "value already current, skipping PUT");
            return Ok(current);
        }

        let url = format!("{}/{}", self.zone_url(zone_id), record_id);
        let payload = serde_json::json!({
            "type": current.kind.as_str(),
            "name": current.name,
            "content": value.to_string(),
            "proxied": current.proxied,
            "ttl": current.ttl,
        });

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(classify_network)?;
        let envelope: Envelope<RecordPayload> = decode(response).await?;
        let updated = envelope
            .result
            .ok_or_else(|| Error::record(format!("record {} missing from response", record_id)))?;

        tracing::info!(record = %updated.name, from = %current.value, to = %value, "record updated");
        to_record(updated)
    }

    async fn verify_token(&self) -> Result<TokenCheck> {
        let url = format!("{}/user/tokens/verify", CLOUDFLARE_API_BASE);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(classify_network)?;

        // An outright rejection means the token is bad, not that the
        // call failed.
        if matches!(response.status().as_u16(), 401 | 403) {
            let body = response.text().await.unwrap_or_default();
            return Ok(TokenCheck {
                valid: false,
                missing_permissions: vec![parse_errors(&body)],
            });
        }

        let envelope: Envelope<TokenStatus> = decode(response).await?;
        let active = envelope
            .result
            .map(|s| s.status == "active")
            .unwrap_or(false);
        Ok(TokenCheck {
            valid: active,
            missing_permissions: Vec::new(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory handing the engine one provider per account
pub struct CloudflareFactory;

impl ProviderFactory for CloudflareFactory {
    fn create(&self, account: &Account) -> Result<Arc<dyn DnsProvider>> {
        Ok(Arc::new(CloudflareProvider::new(account.token.clone())?))
    }
}
