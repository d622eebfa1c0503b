use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use galley_core::{IgnoreRules, KitchenName, RecipeName, RecipePath, RecipeStatus};
use galley_sync::remote::{
    ChangeSet, MergeFileRequest, MergeFileResponse, MergeHeads, MergePreview, RecipeTree,
    ResolvedContent, ServingSummary, UpdateResponse, BASELINE_EXPIRED_HINT,
};
use galley_sync::{
    LocalStateTracker, LocalStatusComputer, RecipeRemote, RemoteError, RemoteManifest, SyncError,
};

use crate::wire::{
    encode, ErrorBody, GetRequest, KitchenMergeRequest, KitchenMergeResponse, MergeRequest,
    ServingsResponse, UpdateRequest, WireMergeResponse, WirePreview, WireTree,
    WireUpdateResponse,
};

const API_PREFIX: &str = "v2";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Blocking JSON client for the remote recipe store.
pub struct HttpRemote {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    status: LocalStatusComputer,
}

impl HttpRemote {
    /// `base_url` must be an `http://` or `https://` URL; a trailing `/` is
    /// ignored. `ignore` filters the local scan behind
    /// [`RecipeRemote::recipe_status`].
    pub fn new(
        base_url: &str,
        token: Option<String>,
        ignore: IgnoreRules,
    ) -> Result<Self, RemoteError> {
        let raw = base_url.trim();
        let invalid = |reason: String| RemoteError::InvalidHandle {
            reason: format!("'{raw}' is not an http(s) URL: {reason}"),
        };
        let mut base_url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base_url.scheme())));
        }
        match base_url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty();
            }
            Err(()) => return Err(invalid("URL cannot carry a path".to_string())),
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build();
        Ok(Self {
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            agent,
            status: LocalStatusComputer::new(ignore),
        })
    }

    /// Endpoint URL; each segment is percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(API_PREFIX).extend(segments);
        }
        url.into()
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        tracing::debug!("GET {url}");
        let response = self.authorize(self.agent.get(url)).call();
        finish(url, response)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        tracing::debug!("POST {url}");
        let body = serde_json::to_value(body).map_err(|e| RemoteError::InvalidHandle {
            reason: format!("could not encode request for {url}: {e}"),
        })?;
        let response = self.authorize(self.agent.post(url)).send_json(body);
        finish(url, response)
    }
}

impl RecipeRemote for HttpRemote {
    fn recipe_status(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        local_path: &Path,
    ) -> Result<RecipeStatus, RemoteError> {
        let url = self.url(&["recipe", "manifest", kitchen.0.as_str(), recipe.0.as_str()]);
        let manifest: RemoteManifest = self.get_json(&url)?;
        let local = |e: SyncError| RemoteError::LocalState {
            reason: e.to_string(),
        };
        let tracker = LocalStateTracker::open(local_path).map_err(local)?;
        self.status
            .compute(recipe, local_path, &manifest, &tracker)
            .map_err(local)
    }

    fn get_recipe(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        paths: Option<&[String]>,
    ) -> Result<RecipeTree, RemoteError> {
        let url = self.url(&["recipe", "get", kitchen.0.as_str(), recipe.0.as_str()]);
        let wire: WireTree = self.post_json(&url, &GetRequest { paths })?;
        wire.into_tree().map_err(|reason| decode_err(&url, reason))
    }

    fn merge_file(&self, request: &MergeFileRequest) -> Result<MergeFileResponse, RemoteError> {
        let mut segments: Vec<&str> = vec![
            "file",
            "merge",
            request.kitchen.0.as_str(),
            request.recipe.0.as_str(),
        ];
        segments.extend(request.path.segments());
        let url = self.url(&segments);
        let body = MergeRequest {
            file: encode(&request.content),
            orig_head: request.baseline_id.clone(),
            last_file_sha: request.last_file_id.clone(),
        };
        let wire: WireMergeResponse = self.post_json(&url, &body)?;
        wire.into_response(&request.path)
            .map_err(|reason| decode_err(&url, reason))
    }

    fn update_files(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        message: &str,
        changes: &ChangeSet,
    ) -> Result<UpdateResponse, RemoteError> {
        let url = self.url(&["recipe", "update", kitchen.0.as_str(), recipe.0.as_str()]);
        tracing::info!("submitting {} changes to {kitchen}/{recipe}", changes.len());
        let wire: WireUpdateResponse = self.post_json(&url, &UpdateRequest::new(message, changes))?;
        wire.into_response().map_err(|reason| decode_err(&url, reason))
    }

    fn kitchen_merge_preview(
        &self,
        source: &KitchenName,
        target: &KitchenName,
    ) -> Result<MergePreview, RemoteError> {
        let url = self.url(&["kitchen", "merge-preview", source.0.as_str(), target.0.as_str()]);
        let wire: WirePreview = self.get_json(&url)?;
        wire.into_preview().map_err(|reason| decode_err(&url, reason))
    }

    fn kitchens_merge(
        &self,
        source: &KitchenName,
        target: &KitchenName,
        heads: &MergeHeads,
        resolved: &BTreeMap<RecipePath, ResolvedContent>,
    ) -> Result<Option<String>, RemoteError> {
        let url = self.url(&["kitchen", "merge", source.0.as_str(), target.0.as_str()]);
        let body = KitchenMergeRequest {
            source_kitchen_sha: &heads.source_kitchen_sha,
            target_kitchen_sha: &heads.target_kitchen_sha,
            resolved: KitchenMergeRequest::resolved(resolved),
        };
        let response: KitchenMergeResponse = self.post_json(&url, &body)?;
        match response.error.filter(|e| !e.is_empty()) {
            Some(message) if response.sha_expired || message.contains(BASELINE_EXPIRED_HINT) => {
                Err(RemoteError::BaselineExpired { message })
            }
            Some(message) => Err(RemoteError::Rejected { message }),
            None if response.sha_expired => Err(RemoteError::BaselineExpired {
                message: format!("{target} changed since the preview"),
            }),
            None => Ok(response.url),
        }
    }

    fn active_servings(&self, kitchen: &KitchenName) -> Result<Vec<ServingSummary>, RemoteError> {
        let url = self.url(&["order", "servings", kitchen.0.as_str()]);
        let response: ServingsResponse = self.get_json(&url)?;
        Ok(response.servings)
    }
}

fn finish<T: DeserializeOwned>(
    url: &str,
    response: Result<ureq::Response, ureq::Error>,
) -> Result<T, RemoteError> {
    match response {
        Ok(response) => response
            .into_json::<T>()
            .map_err(|e| decode_err(url, e.to_string())),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(http_error(url, status, &body))
        }
        Err(ureq::Error::Transport(transport)) => Err(RemoteError::Transport {
            url: url.to_string(),
            reason: transport.to_string(),
        }),
    }
}

fn decode_err(url: &str, reason: String) -> RemoteError {
    RemoteError::Decode {
        url: url.to_string(),
        reason,
    }
}

/// Map a non-2xx body, recognising the expired-baseline reply.
fn http_error(url: &str, status: u16, body: &str) -> RemoteError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    if parsed.sha_expired || message.contains(BASELINE_EXPIRED_HINT) {
        return RemoteError::BaselineExpired { message };
    }
    tracing::warn!("HTTP {status} from {url}");
    RemoteError::Http {
        status,
        url: url.to_string(),
        body: message,
    }
}
