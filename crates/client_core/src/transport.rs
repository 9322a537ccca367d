//! reqwest-backed implementations of the generation and template services.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    error::ServiceFailure,
    protocol::{
        fields, routes, DeleteTemplateRequest, GenerateResponse, TemplateListResponse,
        TemplateMutationResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    config::endpoint,
    error::ClientError,
    generation::{GenerationRequest, GenerationService},
    templates::{TemplateService, TemplateUpload},
};

fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ClientError::Config(format!("failed to build http client: {err}")))
}

/// Decodes the JSON body even on non-success HTTP statuses, because the
/// services report failures as `{status: "error", message}` with 4xx/5xx.
async fn read_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .context("failed to read response body")?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(body) => Ok(body),
        Err(_) if !status.is_success() => Err(anyhow!(ServiceFailure::new(
            Some(status.as_u16()),
            format!("service returned {status}"),
        ))),
        Err(err) => Err(anyhow!("malformed response body: {err}")),
    }
}

pub struct HttpGenerationService {
    http: Client,
    generate_url: Url,
}

impl HttpGenerationService {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(timeout)?,
            generate_url: endpoint(service_url, routes::GENERATE)?,
        })
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse> {
        let photo = Part::bytes(request.photo.content().to_vec())
            .file_name(request.photo.filename().to_string())
            .mime_str(request.photo.format().mime())?;
        let form = request
            .form_fields()
            .into_iter()
            .fold(Form::new().part(fields::PHOTO, photo), |form, (name, value)| {
                form.text(name, value)
            });

        debug!(url = %self.generate_url, request_id = %request.request_id, "posting generation request");
        let response = self
            .http
            .post(self.generate_url.clone())
            .multipart(form)
            .send()
            .await?;
        read_body(response).await
    }
}

pub struct HttpTemplateService {
    http: Client,
    list_url: Url,
    upload_url: Url,
    delete_url: Url,
}

impl HttpTemplateService {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(timeout)?,
            list_url: endpoint(service_url, routes::TEMPLATES)?,
            upload_url: endpoint(service_url, routes::TEMPLATES_UPLOAD)?,
            delete_url: endpoint(service_url, routes::TEMPLATES_DELETE)?,
        })
    }
}

#[async_trait]
impl TemplateService for HttpTemplateService {
    async fn list(&self) -> Result<TemplateListResponse> {
        let response = self.http.get(self.list_url.clone()).send().await?;
        read_body(response).await
    }

    async fn upload(&self, upload: TemplateUpload) -> Result<TemplateMutationResponse> {
        let mut form = Form::new()
            .text(fields::STYLE_NAME, upload.style_name)
            .text(fields::DESCRIPTION, upload.description.unwrap_or_default());
        if let Some(image) = upload.image {
            let part = Part::bytes(image.bytes)
                .file_name(image.filename)
                .mime_str(&image.mime_type)?;
            form = form.part(fields::TEMPLATE, part);
        }

        let response = self
            .http
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await?;
        read_body(response).await
    }

    async fn delete(&self, style_name: &str) -> Result<TemplateMutationResponse> {
        let response = self
            .http
            .post(self.delete_url.clone())
            .json(&DeleteTemplateRequest {
                style_name: style_name.to_string(),
            })
            .send()
            .await?;
        read_body(response).await
    }
}
