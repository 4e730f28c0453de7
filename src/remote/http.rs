//! Blocking HTTP implementation of the remote transport.

use crate::config::{CustomFieldMap, ProjectMeta};
use crate::error::{JiloError, Result};
use crate::remote::{ProjectDetails, SearchPage, Transport};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

const API_PREFIX: &str = "rest/api/2";

/// Jira-style REST transport over a blocking `reqwest` client.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build the transport with sane timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| JiloError::TransportUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn url(project: &ProjectMeta, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", project.jira_server())
    }

    fn authed(builder: RequestBuilder, project: &ProjectMeta) -> RequestBuilder {
        match &project.username {
            Some(user) => builder.basic_auth(user, project.password.as_deref()),
            None => builder,
        }
    }

    fn send(builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .map_err(|e| JiloError::TransportUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(JiloError::ApiError {
            status: status.as_u16(),
            message: truncate(&message, 400),
        })
    }

    fn get_json(&self, project: &ProjectMeta, path: &str, query: &[(&str, String)]) -> Result<Value> {
        debug!(path, "GET {}", project.jira_server());
        let builder = Self::authed(self.client.get(Self::url(project, path)), project).query(query);
        Self::send(builder)?
            .json()
            .map_err(|e| JiloError::TransportUnavailable(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn get_project_details(&self, project: &ProjectMeta) -> Result<ProjectDetails> {
        let data = self.get_json(
            project,
            "issue/createmeta",
            &[
                ("projectKeys", project.key.clone()),
                ("expand", "projects.issuetypes.fields".to_string()),
            ],
        )?;

        let meta = data
            .get("projects")
            .and_then(Value::as_array)
            .and_then(|p| p.first())
            .ok_or_else(|| JiloError::ApiError {
                status: 200,
                message: format!("no createmeta returned for project {}", project.key),
            })?;

        let mut details = ProjectDetails {
            name: meta.get("name").and_then(Value::as_str).map(String::from),
            ..ProjectDetails::default()
        };

        for issuetype in meta
            .get("issuetypes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(name) = issuetype.get("name").and_then(Value::as_str) {
                details.issuetypes.insert(name.to_string());
            }
            let fields = issuetype.get("fields").and_then(Value::as_object);
            if let Some(fields) = fields {
                if details.priorities.is_empty() {
                    details.priorities = priorities_from_fields(fields);
                }
                merge_customfields(&mut details.customfields, fields);
            }
        }

        let components = self.get_json(
            project,
            &format!("project/{}/components", project.key),
            &[],
        )?;
        details.components = components
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| c.get("name").and_then(Value::as_str))
            .map(String::from)
            .collect();

        Ok(details)
    }

    fn fetch_updated(
        &self,
        project: &ProjectMeta,
        since: Option<&str>,
        start_at: usize,
        max_results: usize,
    ) -> Result<SearchPage> {
        let jql = match since {
            Some(watermark) => {
                format!("project = {} AND updated > \"{watermark}\"", project.key)
            }
            None => format!("project = {}", project.key),
        };

        let data = self.get_json(
            project,
            "search",
            &[
                ("jql", jql),
                ("startAt", start_at.to_string()),
                ("maxResults", max_results.to_string()),
            ],
        )?;

        Ok(SearchPage {
            issues: data
                .get("issues")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            total: data
                .get("total")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
        })
    }

    fn fetch_issue(&self, project: &ProjectMeta, key: &str) -> Result<Value> {
        self.get_json(project, &format!("issue/{key}"), &[])
    }

    fn create_issue(&self, project: &ProjectMeta, fields: &Map<String, Value>) -> Result<String> {
        let builder = Self::authed(self.client.post(Self::url(project, "issue")), project)
            .json(&json!({ "fields": fields }));
        let data: Value = Self::send(builder)?
            .json()
            .map_err(|e| JiloError::TransportUnavailable(e.to_string()))?;

        data.get("key")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| JiloError::ApiError {
                status: 200,
                message: "create response missing key".to_string(),
            })
    }

    fn update_issue(
        &self,
        project: &ProjectMeta,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<()> {
        let builder = Self::authed(
            self.client.put(Self::url(project, &format!("issue/{key}"))),
            project,
        )
        .json(&json!({ "fields": fields }));
        Self::send(builder)?;
        Ok(())
    }
}

fn priorities_from_fields(fields: &Map<String, Value>) -> BTreeSet<String> {
    fields
        .get("priority")
        .and_then(|p| p.get("allowedValues"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.get("name").and_then(Value::as_str))
        .map(String::from)
        .collect()
}

/// Extract the customfield ids this application understands from a
/// createmeta field listing.
fn merge_customfields(custom: &mut CustomFieldMap, fields: &Map<String, Value>) {
    for (field_key, props) in fields {
        if !field_key.starts_with("customfield_") {
            continue;
        }
        let slot = match props.get("name").and_then(Value::as_str) {
            Some("Epic Link") => &mut custom.epic_link,
            Some("Epic Name") => &mut custom.epic_name,
            Some("Sprint") => &mut custom.sprint,
            Some("Story Points") => &mut custom.story_points,
            Some("Parent Link") => &mut custom.parent_link,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(field_key.clone());
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
