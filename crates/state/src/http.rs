//! REST implementation of [`ProjectBackend`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pandaura_primitives::{ModuleId, ModuleState, ProjectId, ProjectState, Version, VersionNumber, VersionSummary};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::{Error, ProjectBackend, Result, RollbackOutcome, schema};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to `{base}/projects/{id}/...` with a bearer token.
///
/// Snapshots are run through [`schema::normalize`], so any stored layout
/// arrives as the current [`ProjectState`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
	client: Client,
	base: Url,
	token: Option<String>,
}

#[derive(Serialize)]
struct CreateVersionBody<'a> {
	state: &'a ProjectState,
	message: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedVersion {
	version_number: VersionNumber,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVersion {
	version_number: VersionNumber,
	#[serde(default)]
	message: String,
	#[serde(default)]
	is_auto: bool,
	created_at: DateTime<Utc>,
	#[serde(default)]
	snapshot: Value,
}

impl HttpBackend {
	pub fn new(base: Url, token: Option<String>) -> Result<Self> {
		let client = Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|err| Error::Storage(err.to_string()))?;
		Ok(Self { client, base, token })
	}

	/// `{base}/projects/{id}/{segments...}`.
	fn endpoint(&self, project_id: ProjectId, segments: &[&str]) -> Result<Url> {
		let mut url = self.base.clone();
		url.path_segments_mut()
			.map_err(|()| Error::Storage(format!("base URL {} cannot carry a path", self.base)))?
			.pop_if_empty()
			.push("projects")
			.push(&project_id.to_string())
			.extend(segments);
		Ok(url)
	}

	fn request(&self, method: Method, url: Url) -> RequestBuilder {
		trace!(%method, %url, "state.http.request");
		let builder = self.client.request(method, url);
		match &self.token {
			Some(token) => builder.bearer_auth(token),
			None => builder,
		}
	}

	async fn send(&self, builder: RequestBuilder, version: Option<VersionNumber>) -> Result<Response> {
		let response = builder.send().await.map_err(|err| Error::Storage(err.to_string()))?;
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		if status == StatusCode::NOT_FOUND
			&& let Some(version) = version
		{
			return Err(Error::VersionNotFound(version));
		}
		let body = response.text().await.unwrap_or_default();
		debug!(%status, body = %body, "state.http.rejected");
		Err(Error::Storage(format!("HTTP {status}: {body}")))
	}

	async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder, version: Option<VersionNumber>) -> Result<T> {
		let response = self.send(builder, version).await?;
		let bytes = response.bytes().await.map_err(|err| Error::Storage(err.to_string()))?;
		Ok(serde_json::from_slice(&bytes)?)
	}

	async fn snapshot(&self, builder: RequestBuilder, version: Option<VersionNumber>) -> Result<ProjectState> {
		let raw: Value = self.json(builder, version).await?;
		Ok(schema::normalize(raw, Utc::now())?)
	}

	async fn post_version(&self, project_id: ProjectId, segments: &[&str], state: &ProjectState, message: &str) -> Result<VersionNumber> {
		let url = self.endpoint(project_id, segments)?;
		let builder = self.request(Method::POST, url).json(&CreateVersionBody { state, message });
		let created: CreatedVersion = self.json(builder, None).await.map_err(Error::into_save)?;
		Ok(created.version_number)
	}
}

#[async_trait]
impl ProjectBackend for HttpBackend {
	async fn get_project_state(&self, project_id: ProjectId) -> Result<ProjectState> {
		let url = self.endpoint(project_id, &["state"])?;
		self.snapshot(self.request(Method::GET, url), None).await
	}

	async fn save_module_state(&self, project_id: ProjectId, module: &ModuleId, state: &ModuleState) -> Result<()> {
		let url = self.endpoint(project_id, &["state", module.as_str()])?;
		let builder = self.request(Method::PUT, url).json(state);
		self.send(builder, None).await.map_err(Error::into_save)?;
		Ok(())
	}

	async fn get_version_history(&self, project_id: ProjectId) -> Result<Vec<VersionSummary>> {
		let url = self.endpoint(project_id, &["versions"])?;
		let mut history: Vec<VersionSummary> = self.json(self.request(Method::GET, url), None).await?;
		history.sort_by(|a, b| b.version_number.cmp(&a.version_number));
		Ok(history)
	}

	async fn create_version(&self, project_id: ProjectId, state: &ProjectState, message: &str) -> Result<VersionNumber> {
		self.post_version(project_id, &["versions"], state, message).await
	}

	async fn get_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<Version> {
		let url = self.endpoint(project_id, &["versions", &version.0.to_string()])?;
		let raw: RawVersion = self.json(self.request(Method::GET, url), Some(version)).await?;
		Ok(Version {
			version_number: raw.version_number,
			message: raw.message,
			is_auto: raw.is_auto,
			created_at: raw.created_at,
			snapshot: schema::normalize(raw.snapshot, raw.created_at)?,
		})
	}

	async fn get_version_snapshot(&self, project_id: ProjectId, version: VersionNumber) -> Result<ProjectState> {
		let url = self.endpoint(project_id, &["versions", &version.0.to_string(), "snapshot"])?;
		self.snapshot(self.request(Method::GET, url), Some(version)).await
	}

	async fn rollback_to_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<RollbackOutcome> {
		let url = self.endpoint(project_id, &["versions", &version.0.to_string(), "rollback"])?;
		self.json(self.request(Method::POST, url), Some(version)).await.map_err(Error::into_save)
	}

	async fn delete_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<()> {
		let url = self.endpoint(project_id, &["versions", &version.0.to_string()])?;
		self.send(self.request(Method::DELETE, url), Some(version)).await?;
		Ok(())
	}

	async fn create_auto_save_version(&self, project_id: ProjectId, state: &ProjectState, message: &str) -> Result<VersionNumber> {
		self.post_version(project_id, &["versions", "auto"], state, message).await
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn backend(base: &str) -> HttpBackend {
		HttpBackend::new(Url::parse(base).unwrap(), Some("t".into())).unwrap()
	}

	#[test]
	fn endpoints_extend_the_base_path() {
		let backend = backend("http://localhost:5000/api");
		let url = backend.endpoint(ProjectId(4), &["versions", "7", "rollback"]).unwrap();
		assert_eq!(url.as_str(), "http://localhost:5000/api/projects/4/versions/7/rollback");

		let backend = self::backend("http://localhost:5000/api/");
		let url = backend.endpoint(ProjectId(4), &["state", "LogicStudio"]).unwrap();
		assert_eq!(url.as_str(), "http://localhost:5000/api/projects/4/state/LogicStudio");
	}

	#[test]
	fn versions_deserialize_with_loose_snapshots() {
		let raw: RawVersion = serde_json::from_str(
			r#"{"versionNumber":3,"createdAt":"2024-01-02T03:04:05Z","snapshot":{"LogicStudio":{"code":"x"}}}"#,
		)
		.unwrap();
		assert_eq!(raw.version_number, VersionNumber(3));
		assert!(!raw.is_auto);
		let state = schema::normalize(raw.snapshot, raw.created_at).unwrap();
		assert!(state.module(&ModuleId::logic_studio()).is_some());
	}
}
