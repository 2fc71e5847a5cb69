//! Officer message gateway.
//!
//! After a case is attended, the assigned officer gets a text message with
//! the case summary and its location via an external HTTP gateway.

use patrol_desk_case_models::Incident;
use serde::{Deserialize, Serialize};

use crate::{StoreConfig, StoreError, retry};

/// Body posted to the message gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentMessage {
    /// Officer phone number.
    pub phone_number: String,
    /// Case latitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Case longitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Short label for the pin shown with the message.
    pub name: String,
    /// Case address.
    pub address: String,
    /// Message text.
    pub message: String,
}

impl AssignmentMessage {
    /// Builds the message for an attended case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] if the case has no assigned officer.
    pub fn for_incident(incident: &Incident) -> Result<Self, StoreError> {
        let phone_number = incident
            .assigned_to
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StoreError::Invalid {
                message: format!("case {} has no assigned officer", incident.id),
            })?;

        Ok(Self {
            phone_number: phone_number.to_string(),
            latitude: incident.latitude,
            longitude: incident.longitude,
            name: format!("CaseId: {}, Title: {}", incident.id, incident.title),
            address: incident.address.clone().unwrap_or_default(),
            message: format!(
                "Case {}, Case Type: {}, Case Status: {}, Reporter Number: {}, Assigned to you",
                incident.id,
                incident.title,
                incident.status,
                incident.phone_number.as_deref().unwrap_or("unknown"),
            ),
        })
    }
}

/// Client for the officer message gateway.
#[derive(Debug, Clone)]
pub struct OfficerMessenger {
    client: reqwest::Client,
    url: String,
}

impl OfficerMessenger {
    /// Creates a messenger posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Creates a messenger from config, or `None` when no gateway is set.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Option<Self> {
        config.message_url.as_deref().map(Self::new)
    }

    /// Gateway endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Tells the assigned officer about `incident`. Returns the gateway's
    /// confirmation text, if it sent one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] if the case has no assigned officer,
    /// or another [`StoreError`] if the gateway rejects the message.
    pub async fn notify_assignment(&self, incident: &Incident) -> Result<String, StoreError> {
        let body = AssignmentMessage::for_incident(incident)?;
        log::info!(
            "Sending assignment for case {} to {}",
            incident.id,
            body.phone_number
        );
        let response = retry::send_json(|| self.client.post(&self.url).json(&body)).await?;
        Ok(response
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}
