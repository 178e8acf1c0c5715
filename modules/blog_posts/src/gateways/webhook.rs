//! Identity-provider webhook translation. Signature verification happens in
//! front of this layer.

use live_sync::{MutationCall, MutationGateway, ServiceError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::contract::model::NewUser;
use crate::functions::STORE_USER;

pub const USER_CREATED: &str = "user.created";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {message}")]
    Malformed { message: String },
}

impl WebhookError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// What happened to one delivered webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    UserStored { token_identifier: String },
    /// The store call failed; the delivery is still acknowledged.
    StoreFailed { error: ServiceError },
    Ignored { event_type: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct EmailAddress {
    email_address: String,
}

#[derive(Deserialize)]
struct CreatedUser {
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// Translate a webhook body into the data-service call it implies, if any.
pub fn translate(body: &str) -> Result<Option<MutationCall>, WebhookError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| WebhookError::malformed(e.to_string()))?;
    if envelope.event_type != USER_CREATED {
        return Ok(None);
    }

    let user: CreatedUser = serde_json::from_value(envelope.data)
        .map_err(|e| WebhookError::malformed(e.to_string()))?;
    let email = user
        .email_addresses
        .into_iter()
        .next()
        .map(|e| e.email_address)
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| WebhookError::malformed("user has no email address"))?;

    let name = user
        .first_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.clone());
    let profile_image = user
        .image_url
        .filter(|u| !u.is_empty())
        .and_then(|u| match Url::parse(&u) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(error = %e, "Ignoring unparsable profile image");
                None
            }
        });

    let args = serde_json::to_value(NewUser {
        token_identifier: email,
        name,
        profile_image,
    })
    .map_err(|e| WebhookError::malformed(e.to_string()))?;
    Ok(Some(MutationCall::new(STORE_USER, args)))
}

/// Translate and forward one webhook delivery.
#[instrument(name = "blog_posts.webhook.handle", skip_all)]
pub async fn handle(
    gateway: &dyn MutationGateway,
    body: &str,
) -> Result<WebhookOutcome, WebhookError> {
    let Some(call) = translate(body)? else {
        let event_type = serde_json::from_str::<Envelope>(body)
            .map(|e| e.event_type)
            .unwrap_or_default();
        debug!(event_type = %event_type, "Ignoring webhook event");
        return Ok(WebhookOutcome::Ignored { event_type });
    };

    let token_identifier = call
        .args
        .get("tokenIdentifier")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match gateway.mutate(call).await {
        Ok(_) => {
            info!("Stored user from webhook");
            Ok(WebhookOutcome::UserStored { token_identifier })
        }
        Err(error) => {
            warn!(error = %error, "Error storing user");
            Ok(WebhookOutcome::StoreFailed { error })
        }
    }
}
