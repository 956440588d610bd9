use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::common::{compact_object, flexible_i64, flexible_opt_i64, LabelInput};
use crate::fetch::{ApiRequest, FetchError, RestClient};
use crate::IntegrationContext;

pub const SHORTCUT_API_URL: &str = "https://api.app.shortcut.com/api/v3";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryType {
    Feature,
    Bug,
    Chore,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateStory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub story_type: Option<StoryType>,
    #[serde(default)]
    pub labels: Option<Vec<LabelInput>>,
    #[serde(default)]
    pub owner_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    pub workflow_state_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    pub project_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    pub estimate: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateStory {
    #[serde(deserialize_with = "flexible_i64")]
    pub story_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub story_type: Option<StoryType>,
    #[serde(default)]
    pub owner_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    pub workflow_state_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    pub estimate: Option<i64>,
    #[serde(default)]
    pub labels: Option<Vec<LabelInput>>,
}

/// Project and workflow state applied to new stories that name neither.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoryDefaults {
    pub project_id: Option<i64>,
    pub workflow_state_id: Option<i64>,
}

fn labels_json(labels: Option<Vec<LabelInput>>) -> Option<Value> {
    labels.map(|labels| Value::Array(labels.iter().map(LabelInput::to_json).collect()))
}

impl CreateStory {
    pub fn into_body(self, defaults: StoryDefaults) -> Value {
        compact_object([
            ("name", Some(json!(self.name))),
            ("description", self.description.filter(|text| !text.is_empty()).map(Value::from)),
            ("story_type", self.story_type.map(|kind| json!(kind))),
            ("labels", labels_json(self.labels)),
            ("owner_ids", self.owner_ids.map(|ids| json!(ids))),
            ("estimate", self.estimate.map(Value::from)),
            (
                "workflow_state_id",
                self.workflow_state_id.or(defaults.workflow_state_id).map(Value::from),
            ),
            ("project_id", self.project_id.or(defaults.project_id).map(Value::from)),
        ])
    }
}

impl UpdateStory {
    pub fn into_body(self) -> (i64, Value) {
        let body = compact_object([
            ("name", self.name.map(Value::from)),
            ("description", self.description.map(Value::from)),
            ("story_type", self.story_type.map(|kind| json!(kind))),
            ("owner_ids", self.owner_ids.map(|ids| json!(ids))),
            ("workflow_state_id", self.workflow_state_id.map(Value::from)),
            ("estimate", self.estimate.map(Value::from)),
            ("labels", labels_json(self.labels)),
        ]);
        (self.story_id, body)
    }
}

#[derive(Clone, Debug)]
pub struct ShortcutClient {
    rest: RestClient,
    defaults: StoryDefaults,
    reference_ttl: Duration,
}

impl ShortcutClient {
    pub fn new(
        token: &SecretString,
        base_url: &str,
        context: &IntegrationContext,
        defaults: StoryDefaults,
    ) -> Result<Self, FetchError> {
        let rest = RestClient::new(base_url, context.policy.clone(), context.cache.clone())?
            .with_header("shortcut-token", token.expose_secret())?;
        Ok(Self { rest, defaults, reference_ttl: context.reference_ttl })
    }

    pub async fn create_story(&self, story: CreateStory) -> Result<Value, FetchError> {
        self.rest.send(ApiRequest::post("/stories", story.into_body(self.defaults))).await
    }

    pub async fn update_story(&self, update: UpdateStory) -> Result<Value, FetchError> {
        let (story_id, body) = update.into_body();
        self.rest.send(ApiRequest::put(format!("/stories/{story_id}"), body)).await
    }

    pub async fn get_story(&self, story_id: i64) -> Result<Value, FetchError> {
        self.rest.send(ApiRequest::get(format!("/stories/{story_id}"))).await
    }

    /// Raw search response: `{ "data": [...], "next": ... }`.
    pub async fn search_stories(&self, query: &str) -> Result<Value, FetchError> {
        self.rest.send(ApiRequest::get("/search/stories").query("query", query)).await
    }

    pub async fn add_comment(&self, story_id: i64, text: &str) -> Result<Value, FetchError> {
        let path = format!("/stories/{story_id}/comments");
        self.rest.send(ApiRequest::post(path, json!({ "text": text }))).await
    }

    pub async fn list_members(&self) -> Result<Value, FetchError> {
        self.reference("/members", "shortcut:members").await
    }

    pub async fn list_workflows(&self) -> Result<Value, FetchError> {
        self.reference("/workflows", "shortcut:workflows").await
    }

    pub async fn list_labels(&self) -> Result<Value, FetchError> {
        self.reference("/labels", "shortcut:labels").await
    }

    pub async fn list_projects(&self) -> Result<Value, FetchError> {
        self.reference("/projects", "shortcut:projects").await
    }

    async fn reference(&self, path: &str, cache_key: &str) -> Result<Value, FetchError> {
        self.rest.send(ApiRequest::get(path).cached(cache_key, self.reference_ttl)).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateStory, StoryDefaults, UpdateStory};

    fn parse_create(input: serde_json::Value) -> Result<CreateStory, String> {
        serde_json::from_value(input).map_err(|e| e.to_string())
    }

    #[test]
    fn create_body_falls_back_to_configured_defaults() -> Result<(), String> {
        let story = parse_create(json!({
            "name": "Fix login redirect",
            "story_type": "bug",
            "labels": ["auth"],
            "estimate": 2
        }))?;
        let defaults = StoryDefaults { project_id: Some(7), workflow_state_id: Some(500) };

        assert_eq!(
            story.into_body(defaults),
            json!({
                "name": "Fix login redirect",
                "story_type": "bug",
                "labels": [{"name": "auth"}],
                "estimate": 2,
                "workflow_state_id": 500,
                "project_id": 7
            })
        );
        Ok(())
    }

    #[test]
    fn explicit_ids_override_defaults() -> Result<(), String> {
        let story = parse_create(json!({"name": "x", "project_id": "9", "workflow_state_id": 12.0}))?;
        let body = story.into_body(StoryDefaults { project_id: Some(1), workflow_state_id: Some(2) });

        assert_eq!(body["project_id"], 9);
        assert_eq!(body["workflow_state_id"], 12);
        Ok(())
    }

    #[test]
    fn unknown_story_types_are_rejected() {
        assert!(parse_create(json!({"name": "x", "story_type": "epic"})).is_err());
    }

    #[test]
    fn update_body_contains_only_given_fields() -> Result<(), String> {
        let update: UpdateStory = serde_json::from_value(json!({
            "story_id": 42,
            "workflow_state_id": 500,
            "labels": [{"name": "ui"}]
        }))
        .map_err(|e| e.to_string())?;

        let (story_id, body) = update.into_body();
        assert_eq!(story_id, 42);
        assert_eq!(body, json!({"workflow_state_id": 500, "labels": [{"name": "ui"}]}));
        Ok(())
    }
}
