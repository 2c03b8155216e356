// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! HTTP uploader

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{SiteConfig, UploadPayload, Uploader};

/// POSTs each archive record, with the station location, as a JSON body
pub struct HttpUploader {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let url = site
            .url
            .clone()
            .ok_or_else(|| anyhow!("site {} has no url", site.label()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(site.timeout_secs))
            .user_agent(concat!("wxcore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name: site.label().to_string(),
            url,
            client,
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, payload: &UploadPayload<'_>) -> Result<()> {
        self.client
            .post(&self.url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
