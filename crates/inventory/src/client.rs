use std::time::Duration;

use async_trait::async_trait;
use axonbot_core::config::InventoryConfig;
use axonbot_core::{
    EntityKind, FieldLookup, FieldSchema, FieldSelection, InventoryClient, InventoryError,
    QueryFields, QueryRequest, Row, SavedQuery,
};
use reqwest::{Client, Method, Proxy, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filter::field_filter;

pub const DEFAULT_PAGE_SIZE: usize = 2_000;
/// Upper bound on pages fetched for one query.
pub const MAX_PAGES: usize = 1_000;

/// Inventory collaborator over the service's REST API.
pub struct HttpInventoryClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    api_secret: SecretString,
    page_size: usize,
}

impl HttpInventoryClient {
    pub fn new(config: &InventoryConfig) -> Result<Self, InventoryError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("axonbot/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = config.https_proxy.as_deref().map(str::trim).filter(|p| !p.is_empty())
        {
            let proxy = Proxy::https(proxy)
                .map_err(|error| remote("invalid inventory https proxy", error))?;
            builder = builder.proxy(proxy);
        }

        let http =
            builder.build().map_err(|error| remote("could not build inventory client", error))?;

        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn endpoint(&self, kind: EntityKind, path: &str) -> String {
        format!("{}/api/{}/{path}", self.base_url, kind.plural())
    }

    fn request(&self, method: Method, kind: EntityKind, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(kind, path))
            .header("api-key", self.api_key.expose_secret())
            .header("api-secret", self.api_secret.expose_secret())
    }

    async fn send<T>(&self, request: RequestBuilder, label: &str) -> Result<T, InventoryError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|error| remote(label, error))?;
        let status = response.status();
        debug!(
            event_name = "inventory.request.completed",
            request = label,
            status = status.as_u16(),
            "inventory request completed"
        );

        if !status.is_success() {
            return Err(InventoryError::Remote(format!("{label} returned {status}")));
        }

        response.json::<T>().await.map_err(|error| remote(&format!("{label} decode"), error))
    }

    async fn fetch_all(
        &self,
        kind: EntityKind,
        filter: &str,
        fields: &QueryFields,
    ) -> Result<Vec<Row>, InventoryError> {
        let mut rows = Vec::new();
        let mut offset = 0_usize;
        let mut previous: Option<Vec<Row>> = None;

        for _ in 0..MAX_PAGES {
            let body = QueryBody::new(filter, fields, self.page_size, offset);
            let page: RowsPage = self
                .send(self.request(Method::POST, kind, "query").json(&body), "query")
                .await?;
            let fetched = page.rows.len();

            if fetched < self.page_size {
                rows.extend(page.rows);
                return Ok(rows);
            }
            if previous.as_ref() == Some(&page.rows) {
                return Err(InventoryError::Remote(format!(
                    "{} query returned the same page at offset {offset}; paging is not advancing",
                    kind.plural()
                )));
            }
            rows.extend(page.rows.iter().cloned());
            previous = Some(page.rows);
            offset += fetched;
        }

        Err(InventoryError::Remote(format!(
            "{} query did not finish within {MAX_PAGES} pages of {}",
            kind.plural(),
            self.page_size
        )))
    }

    async fn change_labels(
        &self,
        method: Method,
        kind: EntityKind,
        rows: &[Row],
        labels: &[String],
    ) -> Result<u64, InventoryError> {
        let entities = rows.iter().filter_map(Row::id).collect::<Vec<_>>();
        if entities.len() < rows.len() {
            warn!(
                event_name = "inventory.labels.rows_without_id",
                entity = kind.plural(),
                skipped = rows.len() - entities.len(),
                "some rows carry no internal id and were skipped"
            );
        }

        let body = LabelsBody { entities, labels };
        let changed: CountResponse =
            self.send(self.request(method, kind, "labels").json(&body), "labels").await?;
        Ok(changed.count)
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    fn instance_url(&self) -> &str {
        &self.base_url
    }

    async fn schema(&self, kind: EntityKind) -> Result<FieldSchema, InventoryError> {
        self.send(self.request(Method::GET, kind, "fields"), "fields").await
    }

    async fn count(&self, kind: EntityKind) -> Result<u64, InventoryError> {
        let response: CountResponse =
            self.send(self.request(Method::GET, kind, "count"), "count").await?;
        Ok(response.count)
    }

    async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<Vec<Row>, InventoryError> {
        let rows = self.fetch_all(kind, &request.filter, &request.fields).await?;
        if rows.len() < request.min_results {
            return Err(InventoryError::TooFewResults {
                kind,
                required: request.min_results,
                found: rows.len(),
            });
        }
        Ok(rows)
    }

    async fn get_by_field(
        &self,
        kind: EntityKind,
        lookup: &FieldLookup,
        fields: &FieldSelection,
    ) -> Result<Vec<Row>, InventoryError> {
        let request = QueryRequest {
            filter: field_filter(lookup),
            fields: QueryFields::Selection(fields.clone()),
            min_results: lookup.min_results,
        };
        self.query(kind, &request).await
    }

    async fn list_saved_queries(
        &self,
        kind: EntityKind,
    ) -> Result<Vec<SavedQuery>, InventoryError> {
        self.send(self.request(Method::GET, kind, "saved_queries"), "saved_queries").await
    }

    async fn get_saved_query(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<SavedQuery, InventoryError> {
        self.list_saved_queries(kind)
            .await?
            .into_iter()
            .find(|query| query.name == name)
            .ok_or_else(|| InventoryError::SavedQueryNotFound { kind, name: name.to_owned() })
    }

    async fn add_labels(
        &self,
        kind: EntityKind,
        rows: &[Row],
        labels: &[String],
    ) -> Result<u64, InventoryError> {
        self.change_labels(Method::POST, kind, rows, labels).await
    }

    async fn delete_labels(
        &self,
        kind: EntityKind,
        rows: &[Row],
        labels: &[String],
    ) -> Result<u64, InventoryError> {
        self.change_labels(Method::DELETE, kind, rows, labels).await
    }
}

fn remote(context: &str, error: impl std::fmt::Display) -> InventoryError {
    InventoryError::Remote(format!("{context}: {error}"))
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    filter: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manual_fields: Option<&'a [String]>,
    page_size: usize,
    offset: usize,
}

impl<'a> QueryBody<'a> {
    fn new(filter: &'a str, fields: &'a QueryFields, page_size: usize, offset: usize) -> Self {
        let (fields, manual_fields) = match fields {
            QueryFields::Selection(selection) => (Some(selection), None),
            QueryFields::Manual(manual) => (None, Some(manual.as_slice())),
        };
        Self { filter, fields, manual_fields, page_size, offset }
    }
}

#[derive(Debug, Serialize)]
struct LabelsBody<'a> {
    entities: Vec<&'a str>,
    labels: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RowsPage {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}
