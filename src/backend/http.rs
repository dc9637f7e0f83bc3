//! HTTP project backend client

use async_trait::async_trait;
use layer_types::{
    AddGroupRequest, AddLayerRequest, ApiMessage, FeatureCollection, LayerSelectionRequest,
    ProjectTree, RemoveNodesRequest, RenameGroupRequest, SelectedFeaturesRequest,
    SelectedFeaturesResponse, TreeOrderRequest,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ImportPayload, ProjectBackend};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};

/// Characters of an unstructured error body kept in the error
const ERROR_BODY_LIMIT: usize = 200;

/// `tree.json` arrives wrapped (`{"tree": {...}}`) or bare
#[derive(Deserialize)]
#[serde(untagged)]
enum TreeEnvelope {
    Wrapped { tree: ProjectTree },
    Bare(ProjectTree),
}

/// reqwest client for the project backend
#[derive(Debug, Clone)]
pub struct HttpProjectBackend {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpProjectBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Token {}", token)),
            None => builder,
        }
    }

    /// Map a non-2xx response to [`BackendError::Status`] with the backend's
    /// own message when it sent one
    async fn check(response: Response) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = Self::check(builder.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            BackendError::Malformed(format!(
                "{}: {}",
                e,
                body.chars().take(ERROR_BODY_LIMIT).collect::<String>()
            ))
        })
    }

    /// POST a JSON body; a 2xx envelope with `success: false` is still a failure
    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> BackendResult<()> {
        tracing::debug!(path, "backend POST");
        let response = Self::check(self.request(Method::POST, path).json(body).send().await?).await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        reject_unsuccessful(status.as_u16(), &text)
    }
}

fn error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<ApiMessage>(body) {
        Ok(envelope) => envelope.text(),
        Err(_) if body.trim().is_empty() => None,
        Err(_) => Some(body.chars().take(ERROR_BODY_LIMIT).collect()),
    }
}

fn reject_unsuccessful(status: u16, body: &str) -> BackendResult<()> {
    match serde_json::from_str::<ApiMessage>(body) {
        Ok(envelope) if envelope.success == Some(false) => Err(BackendError::Status {
            status,
            message: envelope.text(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl ProjectBackend for HttpProjectBackend {
    async fn fetch_tree(&self, project: &str) -> BackendResult<ProjectTree> {
        let builder = self
            .request(Method::GET, "/api/projects/new/json")
            .query(&[("project", project), ("published", "false"), ("save", "false")]);
        let envelope: TreeEnvelope = self.send_json(builder).await?;
        let tree = match envelope {
            TreeEnvelope::Wrapped { tree } => tree,
            TreeEnvelope::Bare(tree) => tree,
        };
        tracing::debug!(project, roots = tree.children.len(), "fetched project tree");
        Ok(tree)
    }

    async fn change_order(&self, request: &TreeOrderRequest) -> BackendResult<()> {
        self.post("/api/projects/tree/order", request).await
    }

    async fn set_layer_visibility(&self, request: &LayerSelectionRequest) -> BackendResult<()> {
        self.post("/api/layer/selection", request).await
    }

    async fn remove_nodes(&self, request: &RemoveNodesRequest) -> BackendResult<()> {
        self.post("/api/groups/layer/remove", request).await
    }

    async fn import_layer(&self, payload: &ImportPayload) -> BackendResult<()> {
        let mut form = Form::new();
        for file in &payload.files {
            let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
            form = form.part(file.field, part);
        }
        for (name, value) in payload.text_fields() {
            form = form.text(name, value);
        }

        let path = format!("/api/layer/add/{}/", payload.format.endpoint());
        tracing::debug!(path = %path, files = payload.files.len(), "backend multipart import");
        let response = Self::check(
            self.request(Method::POST, &path)
                .multipart(form)
                .send()
                .await?,
        )
        .await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        reject_unsuccessful(status.as_u16(), &text)
    }

    async fn add_layer(&self, request: &AddLayerRequest) -> BackendResult<()> {
        self.post("/api/layer/add", request).await
    }

    async fn add_group(&self, request: &AddGroupRequest) -> BackendResult<()> {
        self.post("/api/groups/add", request).await
    }

    async fn rename_group(&self, request: &RenameGroupRequest) -> BackendResult<()> {
        self.post("/api/groups/name", request).await
    }

    async fn selected_features(
        &self,
        request: &SelectedFeaturesRequest,
    ) -> BackendResult<FeatureCollection> {
        let builder = self
            .request(Method::POST, "/api/layer/features/selected")
            .json(request);
        let response: SelectedFeaturesResponse = self.send_json(builder).await?;
        if !response.success {
            return Err(BackendError::Status {
                status: 200,
                message: response.message,
            });
        }
        Ok(response.data)
    }
}
