/// Backend PIN verification over HTTP
///
/// `HttpPinValidator` is the production [`PinValidator`]: one POST per
/// completed entry, authenticated with the stored session token. Every
/// transport failure is folded into the typed [`AuthError`] sum so the
/// classifier downstream always has structure to work with; a reachable
/// backend that rejects the entry is an `Ok` outcome, never an error.
use crate::gate::validator::{PinValidator, VerifyOutcome};
use crate::store::{DurableStore, KEY_AUTH_TOKEN};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const VERIFY_PATH: &str = "/v1/auth/pin/verify";

#[derive(Serialize)]
struct VerifyRequest<'a> {
    user_id: &'a str,
    pin: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
}

pub struct HttpPinValidator {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn DurableStore>,
}

impl HttpPinValidator {
    /// Build a validator against `base_url`. The session token is read from
    /// the durable store per call, so the validator never holds a stale
    /// credential.
    pub fn new(base_url: impl Into<String>, store: Arc<dyn DurableStore>) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pinlock/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Unexpected(format!("http client construction: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            store,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PinValidator for HttpPinValidator {
    async fn verify(&self, user_id: &str, pin: &SecretString) -> AuthResult<VerifyOutcome> {
        let url = self.endpoint(VERIFY_PATH);
        tracing::debug!(url = %url, "posting PIN verification");

        let mut request = self.client.post(&url).json(&VerifyRequest {
            user_id,
            pin: pin.expose_secret(),
        });
        if let Some(token) = self.store.get(KEY_AUTH_TOKEN).await? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error("verify request", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16(), response).await);
        }

        let outcome: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unexpected(format!("malformed verify response: {}", e)))?;

        Ok(VerifyOutcome {
            valid: outcome.valid,
            message: outcome.message,
        })
    }
}

/// Fold a reqwest failure into the typed error sum. Timeouts keep their own
/// variant so the offline fallback can distinguish them; everything else
/// that never produced a response is a network failure.
fn transport_error(context: &str, err: &reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout(format!("{}: {}", context, err))
    } else if err.is_decode() {
        AuthError::Unexpected(format!("{}: {}", context, err))
    } else {
        AuthError::Network(format!("{}: {}", context, err))
    }
}

/// Extract the best available message from a non-2xx response. Backends
/// answer `{"message": "..."}`; anything else falls back to the raw body.
async fn status_error(code: u16, response: reqwest::Response) -> AuthError {
    let message = match response.text().await {
        Ok(body) => match serde_json::from_str::<WireError>(&body) {
            Ok(wire) => wire.message,
            Err(_) if !body.is_empty() => body,
            Err(_) => String::from("no response body"),
        },
        Err(_) => String::from("unreadable response body"),
    };
    AuthError::Status { code, message }
}
