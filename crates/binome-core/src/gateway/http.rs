//! HTTP client for the remote table API.
//!
//! Routes: `GET {base}/{table}` (paged with `pageSize`/`offset`),
//! `GET|PATCH|DELETE {base}/{table}/{id}` and `POST {base}/{table}`.
//! Write bodies are `{"fields": {...}}`.

use std::fmt;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{FieldFilter, Fields, GatewayError, GatewayResult, RemoteRecord, RemoteTable};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const PAGE_SIZE: u32 = 100;
/// Upper bound on pages fetched per listing, guards against a looping cursor.
const MAX_PAGES: usize = 1_000;

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum GatewayAuth {
    /// Send `Authorization: Bearer <token>` on every request
    Bearer(String),
    /// Send no credential; a trusted intermediary injects it
    Proxied,
}

impl fmt::Debug for GatewayAuth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => formatter.write_str("Bearer([REDACTED])"),
            Self::Proxied => formatter.write_str("Proxied"),
        }
    }
}

/// [`RemoteTable`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTableGateway {
    base_url: String,
    auth: GatewayAuth,
    client: reqwest::Client,
}

impl HttpTableGateway {
    pub fn new(base_url: impl Into<String>, auth: GatewayAuth) -> GatewayResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        if let GatewayAuth::Bearer(token) = &auth {
            if token.trim().is_empty() {
                return Err(GatewayError::InvalidConfiguration(
                    "API token must not be empty".to_string(),
                ));
            }
        }
        Ok(Self {
            base_url,
            auth,
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Returns the normalized base URL used by this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn auth(&self) -> &GatewayAuth {
        &self.auth
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(table))
    }

    fn record_url(&self, table: &str, id: &str) -> String {
        format!("{}/{}", self.table_url(table), urlencoding::encode(id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.auth {
            GatewayAuth::Bearer(token) => request.bearer_auth(token.trim()),
            GatewayAuth::Proxied => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<T> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|error| {
            GatewayError::InvalidPayload(format!("{error}: {}", compact_text(&body)))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<RemoteRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[async_trait]
impl RemoteTable for HttpTableGateway {
    async fn list(
        &self,
        table: &str,
        filter: Option<&FieldFilter>,
    ) -> GatewayResult<Vec<RemoteRecord>> {
        let formula = filter.map(filter_formula);
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(formula) = &formula {
                query.push(("filterByFormula", formula.clone()));
            }
            if let Some(offset) = &offset {
                query.push(("offset", offset.clone()));
            }

            let page: ListPage = self
                .send_json(self.client.get(self.table_url(table)).query(&query))
                .await?;
            records.extend(page.records);

            match normalize_text_option(page.offset) {
                Some(next) => offset = Some(next),
                None => {
                    tracing::debug!("Listed {} rows from remote table {}", records.len(), table);
                    return Ok(records);
                }
            }
        }

        Err(GatewayError::InvalidPayload(format!(
            "listing {table} did not finish after {MAX_PAGES} pages"
        )))
    }

    async fn get(&self, table: &str, id: &str) -> GatewayResult<RemoteRecord> {
        self.send_json(self.client.get(self.record_url(table, id)))
            .await
    }

    async fn create(&self, table: &str, fields: &Fields) -> GatewayResult<RemoteRecord> {
        let body = serde_json::json!({ "fields": fields });
        self.send_json(self.client.post(self.table_url(table)).json(&body))
            .await
    }

    async fn update(&self, table: &str, id: &str, fields: &Fields) -> GatewayResult<RemoteRecord> {
        let body = serde_json::json!({ "fields": fields });
        self.send_json(self.client.patch(self.record_url(table, id)).json(&body))
            .await
    }

    async fn delete(&self, table: &str, id: &str) -> GatewayResult<()> {
        let response = self
            .authorize(self.client.delete(self.record_url(table, id)))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Nested { error: ApiErrorDetail },
    Flat {
        message: Option<String>,
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorDetail {
    Object {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
    },
    Text(String),
}

fn api_error(status: StatusCode, body: &str) -> GatewayError {
    GatewayError::Api {
        status: status.as_u16(),
        message: parse_api_error_message(body),
    }
}

fn parse_api_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = match parsed {
        Some(ApiErrorBody::Nested {
            error: ApiErrorDetail::Object { message, kind },
        }) => message.or(kind),
        Some(ApiErrorBody::Nested {
            error: ApiErrorDetail::Text(text),
        }) => Some(text),
        Some(ApiErrorBody::Flat { message, error }) => message.or(error),
        None => None,
    };

    match normalize_text_option(message) {
        Some(message) => compact_text(&message),
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => compact_text(body),
    }
}

/// Render a filter as a table formula, e.g. `{ownerId} = 'team-1'`.
fn filter_formula(filter: &FieldFilter) -> String {
    let value = filter.value.replace('\\', "\\\\").replace('\'', "\\'");
    let owned = format!("{{{}}} = '{}'", filter.field, value);
    match filter.unclaimed_by.as_deref() {
        Some(id_field) => format!(
            "OR({owned}, AND({{{id_field}}} = '', {{{}}} = ''))",
            filter.field
        ),
        None => owned,
    }
}

fn normalize_base_url(raw: String) -> GatewayResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        GatewayError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(GatewayError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("tables.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url(" https://tables.example.com/v0/base/ ".to_string()).unwrap(),
            "https://tables.example.com/v0/base"
        );
    }

    #[test]
    fn bearer_auth_requires_token() {
        assert!(HttpTableGateway::new(
            "https://tables.example.com",
            GatewayAuth::Bearer("  ".to_string())
        )
        .is_err());
        assert!(HttpTableGateway::new("https://tables.example.com", GatewayAuth::Proxied).is_ok());
    }

    #[test]
    fn auth_debug_redacts_token() {
        let debug = format!("{:?}", GatewayAuth::Bearer("secret".to_string()));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn urls_encode_table_and_record_ids() {
        let gateway =
            HttpTableGateway::new("https://tables.example.com/v0/app", GatewayAuth::Proxied)
                .unwrap();
        assert_eq!(
            gateway.record_url("field visits", "rec/1"),
            "https://tables.example.com/v0/app/field%20visits/rec%2F1"
        );
    }

    #[test]
    fn filter_formula_escapes_quotes() {
        let formula = filter_formula(&FieldFilter::equals("ownerId", "o'brien"));
        assert_eq!(formula, r"{ownerId} = 'o\'brien'");
    }

    #[test]
    fn filter_formula_includes_unclaimed_rows() {
        let filter = FieldFilter::equals("ownerId", "team-1").or_unclaimed("localId");
        assert_eq!(
            filter_formula(&filter),
            "OR({ownerId} = 'team-1', AND({localId} = '', {ownerId} = ''))"
        );
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        assert_eq!(
            parse_api_error_message(
                r#"{"error":{"type":"INVALID_REQUEST","message":"Unknown field"}}"#
            ),
            "Unknown field"
        );
        assert_eq!(
            parse_api_error_message(r#"{"error":"NOT_FOUND"}"#),
            "NOT_FOUND"
        );
        assert_eq!(
            parse_api_error_message(r#"{"message":"rate limited"}"#),
            "rate limited"
        );
        assert_eq!(parse_api_error_message("  "), "empty response body");
        assert_eq!(parse_api_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn list_page_tolerates_missing_offset() {
        let page: ListPage =
            serde_json::from_str(r#"{"records":[{"id":"rec1","fields":{"name":"North"}}]}"#)
                .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.offset, None);
    }
}
