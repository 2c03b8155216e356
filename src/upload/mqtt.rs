// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! MQTT uploader

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SiteConfig, UploadPayload, Uploader};

/// Publishes each archive record as JSON on a topic
pub struct MqttUploader {
    name: String,
    topic: String,
    client: AsyncClient,
}

impl MqttUploader {
    /// Create the client and spawn its event loop
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn connect(site: &SiteConfig) -> Result<Self> {
        let broker = site
            .broker
            .clone()
            .ok_or_else(|| anyhow!("site {} has no broker", site.label()))?;
        let topic = site
            .topic
            .clone()
            .ok_or_else(|| anyhow!("site {} has no topic", site.label()))?;
        let client_id = site
            .client_id
            .clone()
            .unwrap_or_else(|| format!("wxcore-{}", std::process::id()));

        let mut options = MqttOptions::new(client_id, &broker, site.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&site.username, &site.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        let label = site.label().to_string();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT site {} connected", label);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        debug!("MQTT site {} disconnected", label);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT site {} error: {:?}", label, e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!("MQTT client initialized for {}:{}", broker, site.port);
        Ok(Self {
            name: site.label().to_string(),
            topic,
            client,
        })
    }
}

#[async_trait]
impl Uploader for MqttUploader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, payload: &UploadPayload<'_>) -> Result<()> {
        let payload = serde_json::to_vec(payload)?;
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("MQTT disconnect failed: {}", e))?;
        Ok(())
    }
}
