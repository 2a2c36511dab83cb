/// Failures surfaced by the session transport. Each `init` step maps onto
/// one variant so the host can tell a broker problem from a device problem
/// from a rejected negotiation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("credential request failed: {0}")]
    Credential(String),

    #[error("audio capture failed: {0}")]
    MediaAccess(String),

    #[error("peer negotiation rejected with status {status}")]
    Negotiation { status: u16 },

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),

    #[error("codec error: {0}")]
    Codec(#[from] opus::Error),
}
