use crate::{
    api,
    app::{AppCommand, AppEvent},
    config::AppConfig,
    identity::Identity,
    player::AudioPlayer,
    types::{AudioFormat, MusicVariation, VideoAnalysis},
    upload::{self, DurationProbe},
    wizard::{Effect, WizardEvent},
};
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::{sleep, Duration},
};
use tracing::{debug, error, info, warn};

const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    client: api::Client,
    identity: Identity,
    event_tx: UnboundedSender<AppEvent>,
    config: AppConfig,
    probe: Arc<dyn DurationProbe>,
    player: Option<AudioPlayer>,
}

impl ControllerInner {
    fn send(&self, event: AppEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Controller {
    pub fn new(
        client: api::Client,
        identity: Identity,
        event_tx: UnboundedSender<AppEvent>,
        config: AppConfig,
        probe: Arc<dyn DurationProbe>,
        player: Option<AudioPlayer>,
    ) -> Self {
        let inner = ControllerInner { client, identity, event_tx, config, probe, player };
        Self { inner: Arc::new(inner) }
    }

    /// Each command runs on its own task so a slow upload never blocks
    /// playback or download commands issued meanwhile.
    pub fn spawn(self, mut command_rx: UnboundedReceiver<AppCommand>) {
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    if let Err(err) = Controller::handle_command(inner.clone(), command).await {
                        error!("command error: {err:#}");
                        inner.send(AppEvent::Error(format!("{err:#}")));
                    }
                });
            }
        });
    }

    #[cfg(test)]
    async fn execute(&self, command: AppCommand) -> Result<()> {
        Controller::handle_command(self.inner.clone(), command).await
    }

    async fn handle_command(inner: Arc<ControllerInner>, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Effect(effect) => Controller::run_effect(inner, effect).await,
            AppCommand::LoadCredits => {
                Controller::load_credits(inner).await;
                Ok(())
            }
            AppCommand::PreviewVariation { variation } => {
                Controller::preview_variation(inner, variation).await
            }
            AppCommand::StopPlayback => {
                if let Some(player) = &inner.player {
                    player.stop();
                }
                inner.send(AppEvent::PlaybackStopped);
                Ok(())
            }
            AppCommand::DownloadTrack { file_id, format } => {
                Controller::download_track(inner, file_id, format).await
            }
            AppCommand::DownloadExport { video_url } => {
                Controller::download_export(inner, video_url).await
            }
        }
    }

    async fn run_effect(inner: Arc<ControllerInner>, effect: Effect) -> Result<()> {
        let event = match effect {
            Effect::Validate { epoch, path } => {
                match upload::validate_upload(&path, inner.probe.as_ref()).await {
                    Ok(video) => WizardEvent::UploadAccepted { epoch, video },
                    Err(rejection) => {
                        info!("upload rejected: {rejection}");
                        WizardEvent::UploadRejected { epoch, reason: rejection.to_string() }
                    }
                }
            }
            Effect::Analyze { epoch, video } => {
                info!(file = %video.file_name, "analyzing video");
                match inner.client.analyze_video(&video, &inner.identity).await {
                    Ok(analysis) => {
                        trace_analysis(&analysis);
                        WizardEvent::AnalysisSucceeded { epoch, analysis }
                    }
                    Err(err) => {
                        warn!(operation = ?err.operation(), "analysis failed: {err:#}");
                        WizardEvent::AnalysisFailed { epoch, message: err.to_string() }
                    }
                }
            }
            Effect::Generate { epoch, request } => {
                info!(bpm = request.bpm, mood = %request.mood, "generating variations");
                match inner.client.generate_variations(&request, &inner.identity).await {
                    Ok(variations) => WizardEvent::GenerationSucceeded { epoch, variations },
                    Err(err) => {
                        warn!(operation = ?err.operation(), "generation failed: {err:#}");
                        WizardEvent::GenerationFailed { epoch, message: err.to_string() }
                    }
                }
            }
            Effect::Merge { epoch, video, file_id, mix_mode, segments } => {
                info!(%file_id, mix_mode = mix_mode.as_str(), "merging track into video");
                match inner
                    .client
                    .merge_video_audio(&video, &file_id, mix_mode, &segments, &inner.identity)
                    .await
                {
                    Ok(export) => WizardEvent::MergeSucceeded { epoch, export },
                    Err(err) => {
                        warn!(operation = ?err.operation(), "merge failed: {err:#}");
                        WizardEvent::MergeFailed { epoch, message: err.to_string() }
                    }
                }
            }
            Effect::RefreshCredits { epoch } => {
                let credits = inner.client.get_credits(&inner.identity).await;
                inner.send(AppEvent::CreditsUpdated { epoch: Some(epoch), credits });
                return Ok(());
            }
        };
        inner.send(AppEvent::Wizard(event));
        Ok(())
    }

    async fn load_credits(inner: Arc<ControllerInner>) {
        // A freshly minted identity has never been seen by the backend.
        let credits = if inner.identity.is_minted() {
            inner.client.initialize_credits(&inner.identity).await
        } else {
            inner.client.get_credits(&inner.identity).await
        };
        info!(identity = %inner.identity, credits, "credits loaded");
        inner.send(AppEvent::CreditsUpdated { epoch: None, credits });
    }

    async fn preview_variation(
        inner: Arc<ControllerInner>,
        variation: MusicVariation,
    ) -> Result<()> {
        let player =
            inner.player.clone().ok_or_else(|| anyhow!("audio preview is unavailable"))?;

        let cached = inner.config.preview_dir().join(format!("{}.mp3", variation.file_id));
        if !cached.exists() {
            inner
                .client
                .download(&variation.audio_url, &cached)
                .await
                .with_context(|| format!("failed to fetch preview for {}", variation.style_label))?;
        }

        let path = cached.clone();
        let playback = player.clone();
        tokio::task::spawn_blocking(move || playback.play(&path))
            .await
            .context("audio playback task panicked")?
            .with_context(|| format!("failed to play {}", cached.display()))?;

        inner.send(AppEvent::PlaybackStarted { file_id: variation.file_id.clone() });
        Controller::spawn_playback_monitor(inner.clone(), player);
        Ok(())
    }

    fn spawn_playback_monitor(inner: Arc<ControllerInner>, player: AudioPlayer) {
        tokio::spawn(async move {
            loop {
                sleep(PLAYBACK_POLL_INTERVAL).await;
                if !player.is_playing() {
                    inner.send(AppEvent::PlaybackStopped);
                    break;
                }
            }
        });
    }

    async fn download_track(
        inner: Arc<ControllerInner>,
        file_id: String,
        format: AudioFormat,
    ) -> Result<()> {
        let links = inner.client.track_links(&file_id)?;
        let destination = inner
            .config
            .download_dir()
            .join(format!("vibesync_{}.{}", links.file_id, format.extension()));
        let bytes = inner.client.download(links.url(format).as_str(), &destination).await?;
        inner.send(AppEvent::Downloaded { path: destination, bytes });
        Ok(())
    }

    async fn download_export(inner: Arc<ControllerInner>, video_url: String) -> Result<()> {
        let destination = export_destination(&inner.config);
        let bytes = inner.client.download(&video_url, &destination).await?;
        inner.send(AppEvent::Downloaded { path: destination, bytes });
        Ok(())
    }
}

fn export_destination(config: &AppConfig) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    config.download_dir().join(format!("vibesync_{stamp}.mp4"))
}

fn trace_analysis(analysis: &VideoAnalysis) {
    debug!(
        bpm = analysis.bpm,
        key = %analysis.key,
        mood = %analysis.overall_mood,
        arc = %analysis.energy_arc,
        recommended_mix = %analysis.audio_profile.recommended_mix,
        segments = analysis.segments.len(),
        "analysis received"
    );
    for suggestion in &analysis.style_suggestions {
        debug!(label = %suggestion.label, modifier = %suggestion.modifier, "style suggestion");
    }
    if !analysis.reasoning.is_empty() {
        debug!(reasoning = %analysis.reasoning, "analysis reasoning");
    }
}
