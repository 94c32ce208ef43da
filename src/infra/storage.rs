//! Object store backends for rendered documents.

use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url, header};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::{
    application::artifacts::{ObjectStore, StorageError},
    infra::error::InfraError,
};

/// Directory-rooted store; keys are relative paths below the root.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    /// Create the store, creating the root directory if needed.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let invalid = key.trim().is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            });
        if invalid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), StorageError> {
        let absolute = self.resolve(key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let staging = absolute.with_extension(format!("{}.part", Uuid::new_v4().simple()));
        let mut file = fs::File::create(&staging).await?;
        if let Err(err) = file.write_all(&bytes).await {
            drop(file);
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        file.flush().await?;
        drop(file);

        if let Err(err) = fs::rename(&staging, &absolute).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let absolute = self.resolve(key)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let absolute = self.resolve(key)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Remote store addressed as `{base_url}/{key}` with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpObjectStore {
    /// `timeout` bounds each request, including the response body.
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("quotepdf/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(InfraError::client("object store"))?;

        // A trailing slash keeps `join` from replacing the last path segment.
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        self.base_url
            .join(key)
            .map_err(|_| StorageError::InvalidKey(key.to_string()))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn unexpected(method: &str, key: &str, status: StatusCode) -> StorageError {
    StorageError::backend(format!("{method} {key} returned {status}"))
}

fn request_failed(method: &'static str, key: &str) -> impl FnOnce(reqwest::Error) -> StorageError {
    let key = key.to_string();
    move |err| {
        if err.is_timeout() {
            StorageError::backend(format!("{method} {key} timed out"))
        } else {
            StorageError::backend(format!("{method} {key}: {err}"))
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.put(url))
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(request_failed("PUT", key))?;

        if !response.status().is_success() {
            return Err(unexpected("PUT", key, response.status()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(request_failed("DELETE", key))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(unexpected("DELETE", key, status))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(request_failed("GET", key))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(unexpected("GET", key, status));
        }
        let body = response
            .bytes()
            .await
            .map_err(request_failed("GET", key))?;
        Ok(Some(body))
    }
}
