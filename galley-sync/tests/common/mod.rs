//! In-memory remote shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;

use galley_core::{ContentId, IgnoreRules, KitchenName, RecipeName, RecipePath, RecipeStatus};
use galley_sync::remote::{
    ChangeSet, FileChange, MergeFileRequest, MergeFileResponse, MergeHeads, MergePreview,
    RecipeTree, RemoteFile, ResolvedContent, ServingSummary, UpdateResponse,
};
use galley_sync::status::folder_key;
use galley_sync::{
    content_id_of, LocalStateTracker, LocalStatusComputer, RecipeRemote, RemoteError,
    RemoteManifest,
};

pub fn p(raw: &str) -> RecipePath {
    RecipePath::parse(raw).expect("valid path")
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = p(rel).to_fs_path(root);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, content).expect("write");
}

pub fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(p(rel).to_fs_path(root)).expect("read")
}

pub struct FakeRemote {
    pub recipe: RecipeName,
    pub head: RefCell<ContentId>,
    pub files: RefCell<BTreeMap<RecipePath, Vec<u8>>>,
    pub get_requests: RefCell<Vec<Option<Vec<String>>>>,
    pub merge_requests: RefCell<Vec<RecipePath>>,
    pub merge_responses: RefCell<BTreeMap<RecipePath, MergeFileResponse>>,
    pub update_calls: Cell<usize>,
    /// Every change set passed to `update_files`.
    pub updates: RefCell<Vec<ChangeSet>>,
    /// Served by `recipe_status` instead of the computed status.
    pub status_override: RefCell<Option<RecipeStatus>>,
    pub update_response: RefCell<Option<UpdateResponse>>,
    pub preview: RefCell<MergePreview>,
    pub merges: RefCell<Vec<(MergeHeads, BTreeMap<RecipePath, ResolvedContent>)>>,
    pub expire_merge: Cell<bool>,
}

impl FakeRemote {
    pub fn new(recipe: &str, files: &[(&str, &str)]) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            recipe: RecipeName::from(recipe),
            head: RefCell::new(ContentId::from("head-1")),
            files: RefCell::new(
                files
                    .iter()
                    .map(|(path, content)| (p(path), content.as_bytes().to_vec()))
                    .collect(),
            ),
            get_requests: RefCell::new(Vec::new()),
            merge_requests: RefCell::new(Vec::new()),
            merge_responses: RefCell::new(BTreeMap::new()),
            update_calls: Cell::new(0),
            updates: RefCell::new(Vec::new()),
            status_override: RefCell::new(None),
            update_response: RefCell::new(None),
            preview: RefCell::new(MergePreview::default()),
            merges: RefCell::new(Vec::new()),
            expire_merge: Cell::new(false),
        }
    }

    /// Change a file on the remote and move the head.
    pub fn edit(&self, path: &str, content: &str) {
        self.files
            .borrow_mut()
            .insert(p(path), content.as_bytes().to_vec());
        let next = format!("head-{}", self.files.borrow().len() + self.update_calls.get() + 7);
        *self.head.borrow_mut() = ContentId(next);
    }

    pub fn id_of(&self, path: &str) -> ContentId {
        content_id_of(&self.files.borrow()[&p(path)])
    }

    fn tree(&self, selected: impl Fn(&RecipePath) -> bool) -> RecipeTree {
        let mut tree = RecipeTree {
            baseline_id: self.head.borrow().clone(),
            folders: BTreeMap::new(),
        };
        for (path, content) in self.files.borrow().iter().filter(|(path, _)| selected(path)) {
            tree.folders
                .entry(folder_key(&self.recipe, path.parent().as_ref()))
                .or_default()
                .push(RemoteFile {
                    filename: path.file_name().to_string(),
                    content_id: content_id_of(content),
                    content: content.clone(),
                });
        }
        tree
    }
}

impl RecipeRemote for FakeRemote {
    fn recipe_status(
        &self,
        _kitchen: &KitchenName,
        recipe: &RecipeName,
        local_path: &Path,
    ) -> Result<RecipeStatus, RemoteError> {
        if let Some(status) = self.status_override.borrow().clone() {
            return Ok(status);
        }
        let manifest = RemoteManifest {
            recipe_sha: self.head.borrow().clone(),
            files: self
                .files
                .borrow()
                .iter()
                .map(|(path, content)| (path.clone(), content_id_of(content)))
                .collect(),
        };
        let tracker = LocalStateTracker::open(local_path).map_err(|e| RemoteError::LocalState {
            reason: e.to_string(),
        })?;
        LocalStatusComputer::new(IgnoreRules::default())
            .compute(recipe, local_path, &manifest, &tracker)
            .map_err(|e| RemoteError::LocalState {
                reason: e.to_string(),
            })
    }

    fn get_recipe(
        &self,
        _kitchen: &KitchenName,
        _recipe: &RecipeName,
        paths: Option<&[String]>,
    ) -> Result<RecipeTree, RemoteError> {
        self.get_requests
            .borrow_mut()
            .push(paths.map(<[String]>::to_vec));
        let Some(paths) = paths else {
            return Ok(self.tree(|_| true));
        };
        Ok(self.tree(|file| {
            paths.iter().any(|requested| match requested.strip_suffix("/*") {
                Some(dir) => p(dir).is_strict_ancestor_of(file),
                None => requested == file.as_str(),
            })
        }))
    }

    fn merge_file(&self, request: &MergeFileRequest) -> Result<MergeFileResponse, RemoteError> {
        self.merge_requests.borrow_mut().push(request.path.clone());
        if let Some(response) = self.merge_responses.borrow().get(&request.path) {
            return Ok(response.clone());
        }
        Ok(MergeFileResponse {
            merged_content: self.files.borrow().get(&request.path).cloned(),
            error: None,
        })
    }

    fn update_files(
        &self,
        _kitchen: &KitchenName,
        _recipe: &RecipeName,
        _message: &str,
        changes: &ChangeSet,
    ) -> Result<UpdateResponse, RemoteError> {
        self.update_calls.set(self.update_calls.get() + 1);
        self.updates.borrow_mut().push(changes.clone());
        if let Some(response) = self.update_response.borrow().clone() {
            return Ok(response);
        }
        let mut results = BTreeMap::new();
        for (path, change) in changes {
            match change {
                FileChange::Upsert { contents, .. } => {
                    self.files.borrow_mut().insert(path.clone(), contents.clone());
                }
                FileChange::Delete => {
                    self.files.borrow_mut().remove(path);
                }
            }
            results.insert(path.clone(), true);
        }
        let head = ContentId(format!("head-update-{}", self.update_calls.get()));
        *self.head.borrow_mut() = head.clone();
        Ok(UpdateResponse {
            results,
            recipe_sha: Some(head),
            ..UpdateResponse::default()
        })
    }

    fn kitchen_merge_preview(
        &self,
        _source: &KitchenName,
        _target: &KitchenName,
    ) -> Result<MergePreview, RemoteError> {
        Ok(self.preview.borrow().clone())
    }

    fn kitchens_merge(
        &self,
        _source: &KitchenName,
        _target: &KitchenName,
        heads: &MergeHeads,
        resolved: &BTreeMap<RecipePath, ResolvedContent>,
    ) -> Result<Option<String>, RemoteError> {
        if self.expire_merge.get() {
            return Err(RemoteError::BaselineExpired {
                message: "target kitchen moved".to_string(),
            });
        }
        self.merges
            .borrow_mut()
            .push((heads.clone(), resolved.clone()));
        Ok(Some("https://remote.test/merge/1".to_string()))
    }

    fn active_servings(&self, _kitchen: &KitchenName) -> Result<Vec<ServingSummary>, RemoteError> {
        Ok(Vec::new())
    }
}
