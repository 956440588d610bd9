use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::common::str_field;
use crate::fetch::{ApiRequest, FetchError, RestClient};
use crate::IntegrationContext;

pub const NOTION_API_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Page,
    Database,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub url: String,
    pub last_edited_time: String,
    pub created_time: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
}

impl PageSummary {
    pub fn last_edited(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_edited_time)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageDetail {
    pub id: String,
    pub title: String,
    pub url: String,
    pub properties: BTreeMap<String, String>,
    pub last_edited_time: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatabaseRow {
    pub id: String,
    pub url: String,
    pub properties: BTreeMap<String, String>,
    pub last_edited_time: String,
}

/// Canonical hyphenated form of a Notion id; rejects anything that is not a
/// UUID with or without hyphens.
pub fn normalize_id(kind: &str, raw: &str) -> Result<String, FetchError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| FetchError::Invalid(format!("Invalid {kind} id \"{raw}\". Expected a UUID.")))
}

fn joined(items: Option<&Value>, key: &str, separator: &str) -> String {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.get(key).and_then(Value::as_str).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(separator)
        })
        .unwrap_or_default()
}

fn scalar(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Flattens one Notion property object to display text. Unknown types and
/// empty values come back as an empty string.
pub fn simplify_property(property: &Value) -> String {
    let kind = property.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "title" | "rich_text" => joined(property.get(kind), "plain_text", ""),
        "multi_select" => joined(property.get(kind), "name", ", "),
        "people" => joined(property.get(kind), "name", ", "),
        "select" | "status" => {
            property.get(kind).and_then(|value| str_field(value, "name")).unwrap_or_default()
        }
        "date" => property.get(kind).and_then(|value| str_field(value, "start")).unwrap_or_default(),
        "checkbox" => property.get(kind).and_then(Value::as_bool).unwrap_or(false).to_string(),
        "number" | "url" | "email" => scalar(property.get(kind)),
        _ => String::new(),
    }
}

fn simplify_properties(properties: Option<&Map<String, Value>>) -> BTreeMap<String, String> {
    properties
        .into_iter()
        .flatten()
        .map(|(name, property)| (name.clone(), simplify_property(property)))
        .filter(|(_, value)| !value.is_empty())
        .collect()
}

fn extract_title(properties: Option<&Map<String, Value>>) -> String {
    properties
        .into_iter()
        .flat_map(Map::values)
        .find(|property| property.get("type").and_then(Value::as_str) == Some("title"))
        .map(|property| joined(property.get("title"), "plain_text", ""))
        .unwrap_or_else(|| "Untitled".to_string())
}

fn page_summary(result: &Value) -> PageSummary {
    let properties = result.get("properties").and_then(Value::as_object);
    let kind = if result.get("object").and_then(Value::as_str) == Some("database") {
        ObjectKind::Database
    } else {
        ObjectKind::Page
    };
    PageSummary {
        id: str_field(result, "id").unwrap_or_default(),
        title: extract_title(properties),
        url: str_field(result, "url").unwrap_or_default(),
        last_edited_time: str_field(result, "last_edited_time").unwrap_or_default(),
        created_time: str_field(result, "created_time").unwrap_or_default(),
        kind,
    }
}

fn results(response: &Value) -> &[Value] {
    response.get("results").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default()
}

#[derive(Clone, Debug)]
pub struct NotionClient {
    rest: RestClient,
    allowed_databases: Vec<String>,
}

impl NotionClient {
    pub fn new(
        token: &SecretString,
        base_url: &str,
        context: &IntegrationContext,
        allowed_databases: &[String],
    ) -> Result<Self, FetchError> {
        let rest = RestClient::new(base_url, context.policy.clone(), context.cache.clone())?
            .with_bearer(token)?
            .with_header("notion-version", NOTION_VERSION)?;
        let allowed_databases = allowed_databases
            .iter()
            .map(|id| normalize_id("database", id).unwrap_or_else(|_| id.clone()))
            .collect();
        Ok(Self { rest, allowed_databases })
    }

    fn check_database(&self, database_id: &str) -> Result<String, FetchError> {
        let normalized = normalize_id("database", database_id)?;
        if !self.allowed_databases.is_empty() && !self.allowed_databases.contains(&normalized) {
            return Err(FetchError::Invalid(format!(
                "Database \"{database_id}\" is not in the allowed list. Allowed: {}",
                self.allowed_databases.join(", ")
            )));
        }
        Ok(normalized)
    }

    pub async fn search(&self, query: &str, page_size: u32) -> Result<Vec<PageSummary>, FetchError> {
        let body = json!({
            "query": query,
            "page_size": page_size,
            "sort": {"direction": "descending", "timestamp": "last_edited_time"},
        });
        let response = self.rest.send(ApiRequest::post("/v1/search", body)).await?;
        Ok(results(&response).iter().map(page_summary).collect())
    }

    pub async fn get_page(&self, page_id: &str) -> Result<PageDetail, FetchError> {
        let page_id = normalize_id("page", page_id)?;
        let page = self.rest.send(ApiRequest::get(format!("/v1/pages/{page_id}"))).await?;
        let properties = page.get("properties").and_then(Value::as_object);
        Ok(PageDetail {
            id: str_field(&page, "id").unwrap_or(page_id),
            title: extract_title(properties),
            url: str_field(&page, "url").unwrap_or_default(),
            properties: simplify_properties(properties),
            last_edited_time: str_field(&page, "last_edited_time").unwrap_or_default(),
        })
    }

    pub async fn query_database(
        &self,
        database_id: &str,
        page_size: u32,
        filter: Option<Value>,
    ) -> Result<Vec<DatabaseRow>, FetchError> {
        let database_id = self.check_database(database_id)?;
        let mut body = json!({ "page_size": page_size });
        if let (Some(filter), Some(object)) = (filter, body.as_object_mut()) {
            object.insert("filter".to_string(), filter);
        }
        let path = format!("/v1/databases/{database_id}/query");
        let response = self.rest.send(ApiRequest::post(path, body)).await?;

        Ok(results(&response)
            .iter()
            .map(|row| DatabaseRow {
                id: str_field(row, "id").unwrap_or_default(),
                url: str_field(row, "url").unwrap_or_default(),
                properties: simplify_properties(row.get("properties").and_then(Value::as_object)),
                last_edited_time: str_field(row, "last_edited_time").unwrap_or_default(),
            })
            .collect())
    }

    /// Most recently edited pages, newest first.
    pub async fn recently_edited(&self, page_size: u32) -> Result<Vec<PageSummary>, FetchError> {
        let body = json!({
            "page_size": page_size,
            "sort": {"direction": "descending", "timestamp": "last_edited_time"},
            "filter": {"property": "object", "value": "page"},
        });
        let response = self.rest.send(ApiRequest::post("/v1/search", body)).await?;
        Ok(results(&response).iter().map(page_summary).collect())
    }
}
