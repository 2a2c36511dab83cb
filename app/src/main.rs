use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use friday_core::conversation::{ControlChannel, ConversationState, VoiceConversation};
use friday_core::language::Language;
use friday_core::store::{ChatMessageFields, ChatRole, PostgrestStore, Store};
use friday_core::tools::ToolKind;
use friday_core::{Update, messages};
use friday_realtime::{ControlHandle, RealtimeSession, SessionConfig};
use friday_realtime_utils::audio::{OPUS_FRAME_SAMPLES, OPUS_SAMPLE_RATE};
use friday_realtime_utils::{audio, device};
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;

const OUTPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_LATENCY_MS: usize = 1000;

#[derive(Parser)]
#[command(name = "friday", about = "Voice assistant client", version)]
struct Cli {
    /// Assistant language (en or it).
    #[arg(short, long, default_value = "en")]
    language: Language,

    /// Input device name; defaults to the system input.
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name; defaults to the system output.
    #[arg(long)]
    output_device: Option<String>,

    /// List available input devices and exit.
    #[arg(long)]
    list_devices: bool,
}

/// Adapts the transport's send path to the conversation layer.
struct SessionControl(ControlHandle);

#[async_trait::async_trait]
impl ControlChannel for SessionControl {
    async fn send_tool_result(&self, call_id: &str, output: String) -> anyhow::Result<()> {
        self.0.send_tool_result(call_id, &output).await?;
        Ok(())
    }
}

/// Why a session's update loop ended.
enum SessionEnd {
    Quit,
    Errored,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(Level::INFO.to_string())),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        println!("{}", device::list_inputs()?);
        return Ok(());
    }

    let broker_url = std::env::var("FRIDAY_BROKER_URL")
        .unwrap_or_else(|_| "http://localhost:3000/realtime-session".to_string());
    let store_url = std::env::var("FRIDAY_STORE_URL").context("FRIDAY_STORE_URL must be set")?;
    let store_key = std::env::var("FRIDAY_STORE_KEY").context("FRIDAY_STORE_KEY must be set")?;
    let store = Arc::new(PostgrestStore::new(store_url, store_key));

    // Output device and playback ring buffer. The stream stays on this
    // thread and outlives individual sessions.
    let output = device::get_or_default_output(cli.output_device.clone())?;
    let output_config = output.default_output_config()?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channel_count = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0 as f64;
    tracing::info!(device = ?output.name(), config = ?output_config, "output ready");

    let audio_out_buffer =
        audio::shared_buffer(output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (mut audio_out_tx, mut audio_out_rx) = audio_out_buffer.split();

    // The output callback duplicates the mono sample across channels.
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        for frame in data.chunks_mut(output_channel_count) {
            let sample = audio_out_rx.try_pop().unwrap_or(0.0);
            for channel in frame.iter_mut() {
                *channel = sample;
            }
        }
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!(error = %err, "output stream error"),
        None,
    )?;
    output_stream.play()?;

    // Decoded 48kHz chunks from whichever session is live get resampled to
    // the device rate and pushed into the playback buffer.
    let (pcm_tx, mut pcm_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(256);
    let playback = tokio::spawn(async move {
        let mut resampler = match audio::create_resampler(
            OPUS_SAMPLE_RATE,
            output_sample_rate,
            OPUS_FRAME_SAMPLES,
        ) {
            Ok(resampler) => resampler,
            Err(e) => {
                tracing::error!(error = %e, "failed to create playback resampler");
                return;
            }
        };
        while let Some(chunk) = pcm_rx.recv().await {
            for samples in audio::split_for_chunks(&chunk, OPUS_FRAME_SAMPLES) {
                let Ok(resampled) = resampler.process(&[samples.as_slice()], None) else {
                    continue;
                };
                if let Some(resampled) = resampled.first() {
                    for sample in resampled {
                        if audio_out_tx.try_push(*sample).is_err() {
                            tracing::trace!("playback buffer full, dropping sample");
                        }
                    }
                }
            }
        }
    });

    // One iteration per session. Reconnecting is always a user decision.
    loop {
        let mut session = RealtimeSession::new(
            SessionConfig::new(&broker_url).with_input_device(cli.input_device.clone()),
        );
        let (event_rx, mut audio_rx) = match session.init(cli.language.code()).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::error!(error = %e, "session init failed");
                eprintln!("{}", messages::connection_error(cli.language));
                if prompt_retry(cli.language).await? {
                    continue;
                }
                return Err(e.into());
            }
        };
        let control = SessionControl(
            session
                .control_handle()
                .context("session connected without a control channel")?,
        );

        let forward = tokio::spawn({
            let pcm_tx = pcm_tx.clone();
            async move {
                while let Some(chunk) = audio_rx.recv().await {
                    if pcm_tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            }
        });

        println!("FRIDAY is listening. Press Ctrl+C to quit.");
        let end = run_conversation(cli.language, store.clone(), control, event_rx).await;

        session.disconnect().await;
        forward.abort();

        match end {
            SessionEnd::Quit => break,
            SessionEnd::Errored => {
                eprintln!("{}", messages::connection_error(cli.language));
                if !prompt_retry(cli.language).await? {
                    break;
                }
            }
        }
    }

    playback.abort();
    Ok(())
}

/// Feed the reducer until the user quits, the session errors, or the event
/// stream ends.
async fn run_conversation(
    language: Language,
    store: Arc<PostgrestStore>,
    control: SessionControl,
    mut event_rx: friday_realtime::ServerRx,
) -> SessionEnd {
    let (update_tx, mut update_rx) = tokio::sync::mpsc::channel::<Update>(256);

    let reducer_store = store.clone();
    let reducer = tokio::spawn(async move {
        let mut conversation = VoiceConversation::new(language);
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            if let Err(e) = VoiceConversation::handle_event(
                &mut conversation,
                reducer_store.as_ref(),
                &control,
                event,
                &update_tx,
            )
            .await
            {
                tracing::error!(error = %e, "event handling failed");
                break;
            }
        }
    });

    let end = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down.");
                break SessionEnd::Quit;
            }
            update = update_rx.recv() => {
                let Some(update) = update else {
                    // Reducer gone means the control channel closed under us.
                    break SessionEnd::Errored;
                };
                match update {
                    Update::State(ConversationState::Error) => break SessionEnd::Errored,
                    Update::Turn { user, assistant } => {
                        persist_turn(store.as_ref(), user, assistant).await;
                    }
                    other => render_update(language, other),
                }
            }
        }
    };

    reducer.abort();
    end
}

async fn persist_turn(store: &PostgrestStore, user: String, assistant: String) {
    for (role, content) in [(ChatRole::User, user), (ChatRole::Assistant, assistant)] {
        let fields = ChatMessageFields {
            conversation_id: None,
            role,
            content,
        };
        if let Err(e) = store.insert_message(fields).await {
            tracing::warn!(error = %e, "failed to persist chat message");
        }
    }
}

fn render_update(language: Language, update: Update) {
    match update {
        Update::State(state) => {
            println!("[{}]", messages::status_line(language, state));
        }
        Update::UserTranscript(text) => {
            println!("You: {}", text.trim());
        }
        Update::PartialTranscriptCleared => {}
        Update::AssistantText(text) => {
            println!("FRIDAY: {}", text.trim());
        }
        Update::ToolNotice(notice) => {
            if notice.kind == ToolKind::File {
                println!("{}", messages::file_generated_notice(language));
            }
            tracing::info!(kind = ?notice.kind, data = %notice.data, "tool call persisted data");
        }
        Update::Turn { .. } => {}
    }
}

async fn prompt_retry(language: Language) -> anyhow::Result<bool> {
    let prompt = match language {
        Language::It => "Riconnettere? [s/N] ",
        Language::En => "Reconnect? [y/N] ",
    };
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;

    Ok(matches!(
        line.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "si" | "sì"
    ))
}
