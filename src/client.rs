use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rubato::Resampler;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::interceptor::registry::Registry;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use friday_realtime_types::events::client::{ConversationItemCreateEvent, ResponseCreateEvent};
use friday_realtime_types::{ClientEvent, Item, ServerEvent};
use friday_realtime_utils::audio::{OPUS_FRAME_MS, OPUS_FRAME_SAMPLES, OPUS_SAMPLE_RATE};
use friday_realtime_utils::capture::{CAPTURE_CHUNK_SIZE, MicCapture};

use crate::broker;
use crate::error::TransportError;

pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

const REALTIME_BASE_URL: &str = "https://api.openai.com/v1/realtime";
const DATA_CHANNEL_LABEL: &str = "oai-events";
const EVENT_CHANNEL_CAPACITY: usize = 1024;
const AUDIO_CHANNEL_CAPACITY: usize = 1024;
const ENCODED_FRAME_CAPACITY: usize = 256;
const MAX_OPUS_PACKET: usize = 4000;
/// 120ms at 48kHz, the largest frame Opus will hand back.
const MAX_DECODED_SAMPLES: usize = 5760;

pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;
/// Decoded mono 48kHz samples from the remote audio track.
pub type AudioRx = tokio::sync::mpsc::Receiver<Vec<f32>>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    broker_url: String,
    model: String,
    input_device: Option<String>,
}

impl SessionConfig {
    pub fn new(broker_url: &str) -> Self {
        Self {
            broker_url: broker_url.to_string(),
            model: DEFAULT_MODEL.to_string(),
            input_device: None,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_input_device(mut self, device: Option<String>) -> Self {
        self.input_device = device;
        self
    }
}

/// One realtime voice session over a WebRTC peer connection.
///
/// `init` performs the full setup sequence: mint an ephemeral credential at
/// the token broker, open the peer connection and microphone, create the
/// control data channel, then negotiate SDP directly with the provider using
/// the short-lived credential. Any failure along the way tears down whatever
/// was already built, so a failed `init` leaves the session reusable.
pub struct RealtimeSession {
    config: SessionConfig,
    http: reqwest::Client,
    peer: Option<Arc<RTCPeerConnection>>,
    data_channel: Option<Arc<RTCDataChannel>>,
    capture: Option<MicCapture>,
    event_tx: Option<tokio::sync::broadcast::Sender<ServerEvent>>,
    pipeline: Vec<tokio::task::JoinHandle<()>>,
}

impl RealtimeSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            peer: None,
            data_channel: None,
            capture: None,
            event_tx: None,
            pipeline: Vec::new(),
        }
    }

    /// Connect and return the inbound event stream plus the decoded remote
    /// audio stream. Errors if already connected.
    pub async fn init(&mut self, language: &str) -> Result<(ServerRx, AudioRx), TransportError> {
        if self.peer.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        match self.try_init(language).await {
            Ok(handles) => Ok(handles),
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    async fn try_init(&mut self, language: &str) -> Result<(ServerRx, AudioRx), TransportError> {
        let token =
            broker::fetch_ephemeral_credential(&self.http, &self.config.broker_url, language)
                .await?;

        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        let peer = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);
        self.peer = Some(peer.clone());

        peer.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            tracing::debug!(state = %state, "peer connection state changed");
            Box::pin(async {})
        }));

        // Remote audio: decode each track into mono f32 and hand the chunks
        // to the host for playback.
        let (audio_tx, audio_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(AUDIO_CHANNEL_CAPACITY);
        peer.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let audio_tx = audio_tx.clone();
            Box::pin(async move {
                decode_remote_track(track, audio_tx).await;
            })
        }));

        // Microphone before negotiation, so the offer advertises the track.
        let (capture, chunk_rx) = MicCapture::start(self.config.input_device.clone())
            .map_err(|e| TransportError::MediaAccess(e.to_string()))?;
        let input_rate = capture.sample_rate();
        self.capture = Some(capture);

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: OPUS_SAMPLE_RATE as u32,
                channels: 1,
                ..Default::default()
            },
            "audio".to_string(),
            "friday-mic".to_string(),
        ));
        let rtp_sender = peer
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        self.pipeline.push(tokio::spawn(async move {
            // Keep the sender's RTCP path drained.
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        }));

        let (frame_tx, mut frame_rx) =
            tokio::sync::mpsc::channel::<Bytes>(ENCODED_FRAME_CAPACITY);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = encode_loop(chunk_rx, input_rate, frame_tx) {
                tracing::error!(error = %e, "mic encode loop failed");
            }
        });
        self.pipeline.push(tokio::spawn(async move {
            while let Some(payload) = frame_rx.recv().await {
                let sample = Sample {
                    data: payload,
                    duration: Duration::from_millis(OPUS_FRAME_MS),
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::warn!(error = %e, "dropping outbound audio frame");
                }
            }
        }));

        // Control channel: every inbound frame is parsed and fanned out;
        // unknown types are forwarded rather than dropped.
        let (event_tx, event_rx) =
            tokio::sync::broadcast::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);
        self.event_tx = Some(event_tx.clone());
        let data_channel = peer.create_data_channel(DATA_CHANNEL_LABEL, None).await?;
        data_channel.on_open(Box::new(|| {
            tracing::info!("control channel open");
            Box::pin(async {})
        }));
        data_channel.on_close(Box::new(|| {
            tracing::info!("control channel closed");
            Box::pin(async {})
        }));
        data_channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let event_tx = event_tx.clone();
            Box::pin(async move {
                if !msg.is_string {
                    tracing::warn!("unexpected binary frame on control channel");
                    return;
                }
                let text = match std::str::from_utf8(&msg.data) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "control frame is not utf-8");
                        return;
                    }
                };
                if let Some(event) = parse_server_event(text) {
                    tracing::debug!(kind = event.kind(), "received server event");
                    if event_tx.send(event).is_err() {
                        tracing::debug!("no event subscribers, dropping frame");
                    }
                }
            })
        }));
        self.data_channel = Some(data_channel);

        // SDP exchange: wait for ICE gathering so the offer is complete,
        // then trade it for the provider's answer over plain HTTPS.
        let offer = peer.create_offer(None).await?;
        let mut gather_complete = peer.gathering_complete_promise().await;
        peer.set_local_description(offer).await?;
        let _ = gather_complete.recv().await;
        let local = peer
            .local_description()
            .await
            .ok_or(TransportError::Negotiation { status: 0 })?;

        let response = self
            .http
            .post(format!("{}?model={}", REALTIME_BASE_URL, self.config.model))
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(local.sdp)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "sdp negotiation rejected");
            return Err(TransportError::Negotiation {
                status: status.as_u16(),
            });
        }
        let answer_sdp = response.text().await?;
        let answer = RTCSessionDescription::answer(answer_sdp)?;
        peer.set_remote_description(answer).await?;

        tracing::info!(model = %self.config.model, "realtime session negotiated");
        Ok((event_rx, audio_rx))
    }

    /// True while the control channel is open.
    pub fn is_connected(&self) -> bool {
        self.data_channel
            .as_ref()
            .is_some_and(|dc| dc.ready_state() == RTCDataChannelState::Open)
    }

    /// A cloneable handle for sending tool results, valid for the lifetime
    /// of the current connection.
    pub fn control_handle(&self) -> Option<ControlHandle> {
        self.data_channel.as_ref().map(|dc| ControlHandle {
            data_channel: dc.clone(),
        })
    }

    /// Return a tool call's result to the model and ask for a follow-up
    /// response.
    pub async fn send_tool_result(&self, call_id: &str, output: &str) -> Result<(), TransportError> {
        match self.data_channel.as_ref() {
            Some(dc) => send_tool_result_on(dc, call_id, output).await,
            None => {
                tracing::warn!("control channel not connected, dropping tool result");
                Ok(())
            }
        }
    }

    /// Inject a typed user message into the conversation and ask for a
    /// response.
    pub async fn send_text_message(&self, text: &str) -> Result<(), TransportError> {
        match self.data_channel.as_ref() {
            Some(dc) => {
                send_event_on(
                    dc,
                    &ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
                        Item::user_message(text),
                    )),
                )
                .await?;
                send_event_on(dc, &ClientEvent::ResponseCreate(ResponseCreateEvent::new())).await
            }
            None => {
                tracing::warn!("control channel not connected, dropping text message");
                Ok(())
            }
        }
    }

    /// Tear the session down. Safe to call at any time, including twice and
    /// before `init`.
    pub async fn disconnect(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        for handle in self.pipeline.drain(..) {
            handle.abort();
        }
        if let Some(dc) = self.data_channel.take() {
            if let Err(e) = dc.close().await {
                tracing::debug!(error = %e, "error closing control channel");
            }
        }
        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                tracing::debug!(error = %e, "error closing peer connection");
            }
        }
        self.event_tx = None;
    }
}

/// Send seam handed to the conversation layer; lives only as long as the
/// underlying data channel.
#[derive(Clone)]
pub struct ControlHandle {
    data_channel: Arc<RTCDataChannel>,
}

impl ControlHandle {
    pub async fn send_tool_result(&self, call_id: &str, output: &str) -> Result<(), TransportError> {
        send_tool_result_on(&self.data_channel, call_id, output).await
    }
}

async fn send_tool_result_on(
    dc: &RTCDataChannel,
    call_id: &str,
    output: &str,
) -> Result<(), TransportError> {
    send_event_on(
        dc,
        &ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
            Item::function_call_output(call_id, output),
        )),
    )
    .await?;
    send_event_on(dc, &ClientEvent::ResponseCreate(ResponseCreateEvent::new())).await
}

async fn send_event_on(dc: &RTCDataChannel, event: &ClientEvent) -> Result<(), TransportError> {
    if dc.ready_state() != RTCDataChannelState::Open {
        tracing::warn!("control channel not open, dropping outbound event");
        return Ok(());
    }
    match serde_json::to_string(event) {
        Ok(text) => {
            dc.send_text(text).await?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize client event");
            Ok(())
        }
    }
}

/// Parse an inbound control frame, falling back to [`ServerEvent::Unknown`]
/// for frames whose `type` is not in the vocabulary.
fn parse_server_event(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(raw) if raw.get("type").is_some() => Some(ServerEvent::Unknown(raw)),
            Ok(raw) => {
                tracing::error!(error = %e, frame = %raw, "control frame has no type field");
                None
            }
            Err(_) => {
                tracing::error!(error = %e, "control frame is not JSON");
                None
            }
        },
    }
}

/// Resample native-rate mic chunks to 48kHz and pack them into encoded
/// 20ms Opus frames. Runs on a blocking thread; exits when either side of
/// its channels goes away.
fn encode_loop(
    chunk_rx: std::sync::mpsc::Receiver<Vec<f32>>,
    input_rate: u32,
    frame_tx: tokio::sync::mpsc::Sender<Bytes>,
) -> anyhow::Result<()> {
    let mut resampler = friday_realtime_utils::audio::create_resampler(
        input_rate as f64,
        OPUS_SAMPLE_RATE,
        CAPTURE_CHUNK_SIZE,
    )?;
    let mut encoder = opus::Encoder::new(
        OPUS_SAMPLE_RATE as u32,
        opus::Channels::Mono,
        opus::Application::Voip,
    )?;

    let mut inbound: VecDeque<f32> = VecDeque::new();
    let mut pending: Vec<f32> = Vec::new();

    while let Ok(chunk) = chunk_rx.recv() {
        inbound.extend(chunk);
        while inbound.len() >= CAPTURE_CHUNK_SIZE {
            let block: Vec<f32> = inbound.drain(..CAPTURE_CHUNK_SIZE).collect();
            let resampled = resampler.process(&[block], None)?;
            pending.extend_from_slice(&resampled[0]);
        }
        while pending.len() >= OPUS_FRAME_SAMPLES {
            let frame: Vec<f32> = pending.drain(..OPUS_FRAME_SAMPLES).collect();
            let encoded = encoder.encode_vec_float(&frame, MAX_OPUS_PACKET)?;
            if frame_tx.blocking_send(Bytes::from(encoded)).is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn decode_remote_track(track: Arc<TrackRemote>, audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>) {
    tracing::info!(ssrc = track.ssrc(), "remote track started");
    let mut decoder = match opus::Decoder::new(OPUS_SAMPLE_RATE as u32, opus::Channels::Mono) {
        Ok(decoder) => decoder,
        Err(e) => {
            tracing::error!(error = %e, "failed to create audio decoder");
            return;
        }
    };
    let mut pcm = vec![0.0f32; MAX_DECODED_SAMPLES];

    while let Ok((rtp, _)) = track.read_rtp().await {
        if rtp.payload.is_empty() {
            continue;
        }
        match decoder.decode_float(&rtp.payload, &mut pcm, false) {
            Ok(samples) => {
                if audio_tx.send(pcm[..samples].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to decode audio packet"),
        }
    }
    tracing::debug!("remote track ended");
}
