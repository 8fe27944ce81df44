//! Supabase REST API client.

use crate::{BackingStore, Collection, RowQuery, StoreError, StoreResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Supabase client for PostgREST tables and edge functions.
///
/// Requests authenticate with the publishable key plus the current session's
/// access token when one is set; cloned clients share the token.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project API URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The Supabase publishable API key
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Replace the session access token. `None` falls back to the publishable key.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().expect("access token lock poisoned") = token;
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token
            .read()
            .expect("access token lock poisoned")
            .is_some()
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.api_url, name)
    }

    /// URL of a scan, with PostgREST filter, order, and limit parameters.
    fn query_url(&self, query: &RowQuery) -> StoreResult<Url> {
        let mut url = Url::parse(&self.rest_url(query.collection.table()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, value) in &query.filters {
                pairs.append_pair(column, &format!("eq.{}", value));
            }
            if let Some((column, descending)) = &query.order_by {
                let direction = if *descending { "desc" } else { "asc" };
                pairs.append_pair("order", &format!("{}.{}", column, direction));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    fn filter_url(&self, table: &str, filters: &[(String, String)]) -> StoreResult<Url> {
        let mut url = Url::parse(&self.rest_url(table))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (column, value) in filters {
                pairs.append_pair(column, &format!("eq.{}", value));
            }
        }
        Ok(url)
    }

    fn bearer(&self) -> String {
        let token = self
            .access_token
            .read()
            .expect("access token lock poisoned")
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
    }

    /// Invoke an edge function with a JSON body.
    ///
    /// `extra_headers` are forwarded as-is; their values are never logged.
    pub async fn invoke_function<T: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &T,
        extra_headers: &[(&str, &str)],
    ) -> StoreResult<Value> {
        let url = Url::parse(&self.function_url(name))?;
        let mut request = self
            .request(reqwest::Method::POST, url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        debug!(function = name, forwarded_headers = extra_headers.len(), "Invoking edge function");
        let response = request.send().await?;
        let text = self.check_response(response, name).await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Check HTTP response for errors, returning the body text on success.
    async fn check_response(&self, response: reqwest::Response, what: &str) -> StoreResult<String> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let body_summary = summarize_response_body(&body);
            error!(status = %status, body_summary = %body_summary, resource = what, "Supabase request failed");
            return Err(StoreError::Supabase {
                status: status.as_u16(),
                message: body_summary,
            });
        }
        Ok(body)
    }

    fn first_row(table: &str, rows: Vec<Value>) -> StoreResult<Value> {
        rows.into_iter().next().ok_or_else(|| StoreError::InvalidRecord {
            table: table.to_string(),
            message: "empty representation".to_string(),
        })
    }
}

#[async_trait]
impl BackingStore for SupabaseClient {
    async fn select(&self, query: &RowQuery) -> StoreResult<Vec<Value>> {
        let table = query.collection.table();
        let url = self.query_url(query)?;

        let response = self.request(reqwest::Method::GET, url).send().await?;
        let body = self.check_response(response, table).await?;
        let rows: Vec<Value> = serde_json::from_str(&body)?;

        debug!(table, count = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, row: Value) -> StoreResult<Value> {
        let table = collection.table();
        let url = Url::parse(&self.rest_url(table))?;

        let response = self
            .request(reqwest::Method::POST, url)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let body = self.check_response(response, table).await?;

        debug!(table, "Inserted row");
        Self::first_row(table, serde_json::from_str(&body)?)
    }

    async fn upsert(&self, collection: Collection, row: Value, on_conflict: &str) -> StoreResult<Value> {
        let table = collection.table();
        let mut url = Url::parse(&self.rest_url(table))?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);

        let response = self
            .request(reqwest::Method::POST, url)
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row)
            .send()
            .await?;
        let body = self.check_response(response, table).await?;

        debug!(table, on_conflict, "Upserted row");
        Self::first_row(table, serde_json::from_str(&body)?)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[(String, String)],
        patch: Value,
    ) -> StoreResult<Vec<Value>> {
        let table = collection.table();
        if filters.is_empty() {
            return Err(StoreError::Config(format!("refusing unfiltered update of {}", table)));
        }
        let url = self.filter_url(table, filters)?;

        let response = self
            .request(reqwest::Method::PATCH, url)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let body = self.check_response(response, table).await?;
        let rows: Vec<Value> = serde_json::from_str(&body)?;

        debug!(table, count = rows.len(), "Updated rows");
        Ok(rows)
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("api_url", &self.api_url)
            .field("has_access_token", &self.has_access_token())
            .finish_non_exhaustive()
    }
}
