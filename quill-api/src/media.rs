//! Client for the external image hosting service. The service is a black
//! box: it takes file bytes and hands back a dereferenceable URL plus an
//! opaque identifier we keep for later deletion.

use async_trait::async_trait;
use quill_common::model::post::MediaAsset;
use serde::Deserialize;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("The media service could not be reached: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("The media service replied with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait MediaStore: Send + Sync + Debug {
    async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaAsset, MediaError>;

    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

/// Cloudinary-style unsigned upload over plain HTTP multipart.
#[derive(Clone, Debug)]
pub struct HttpMediaStore {
    client: reqwest::Client,
    upload_url: String,
    delete_url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct UploadResponse {
    url: String,
    public_id: String,
}

impl HttpMediaStore {
    #[must_use]
    pub fn new(upload_url: String, delete_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
            delete_url,
        }
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaAsset, MediaError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_owned())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MediaError::Rejected(response.status()));
        }

        let uploaded: UploadResponse = response.json().await?;
        Ok(MediaAsset {
            url: uploaded.url,
            public_id: uploaded.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        let response = self
            .client
            .post(&self.delete_url)
            .form(&[("public_id", public_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MediaError::Rejected(response.status()));
        }

        Ok(())
    }
}
