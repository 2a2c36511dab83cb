use crate::error::TransportError;
use friday_realtime_types::RealtimeSessionResponse;

/// Ask the token broker to mint an ephemeral credential for one session.
///
/// The broker holds the long-lived provider key; the client only ever
/// receives this short-lived secret, which authorizes exactly one SDP
/// exchange.
pub async fn fetch_ephemeral_credential(
    http: &reqwest::Client,
    broker_url: &str,
    language: &str,
) -> Result<String, TransportError> {
    let response = http
        .post(broker_url)
        .json(&serde_json::json!({ "language": language }))
        .send()
        .await
        .map_err(|e| TransportError::Credential(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "token broker rejected session request");
        return Err(TransportError::Credential(format!(
            "broker returned status {}",
            status
        )));
    }

    let session: RealtimeSessionResponse = response
        .json()
        .await
        .map_err(|e| TransportError::Credential(e.to_string()))?;

    session
        .client_secret()
        .map(|secret| secret.value().to_string())
        .ok_or_else(|| TransportError::Credential("response carried no client secret".to_string()))
}
