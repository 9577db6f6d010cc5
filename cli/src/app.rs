use crate::{
    config::AppConfig,
    types::{AudioFormat, MusicVariation},
    wizard::{Effect, Epoch, Step, Wizard, WizardEvent},
};
use chrono::{DateTime, Local};
use std::{
    env,
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::debug;

const MAX_STATUS_LINES: usize = 8;
const BPM_STEP: i32 = 1;
const BPM_COARSE_STEP: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Prompt,
    NegativePrompt,
    Bpm,
}

impl EditField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Prompt => "Prompt",
            Self::NegativePrompt => "Avoid",
            Self::Bpm => "BPM",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Prompt => Self::NegativePrompt,
            Self::NegativePrompt => Self::Bpm,
            Self::Bpm => Self::Prompt,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Info(String),
    Error(String),
    Wizard(WizardEvent),
    CreditsUpdated { epoch: Option<Epoch>, credits: i64 },
    PlaybackStarted { file_id: String },
    PlaybackStopped,
    Downloaded { path: PathBuf, bytes: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Effect(Effect),
    LoadCredits,
    PreviewVariation { variation: MusicVariation },
    StopPlayback,
    DownloadTrack { file_id: String, format: AudioFormat },
    DownloadExport { video_url: String },
}

#[derive(Debug)]
pub struct AppState {
    pub wizard: Wizard,
    pub credits: Option<i64>,
    pub upload_input: String,
    pub edit_field: EditField,
    pub highlighted: usize,
    pub playing: Option<String>,
    pub status_lines: Vec<StatusLine>,
    pub download_dir: PathBuf,
    step_entered_at: Instant,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            wizard: Wizard::new(),
            credits: None,
            upload_input: String::new(),
            edit_field: EditField::Prompt,
            highlighted: 0,
            playing: None,
            status_lines: Vec::new(),
            download_dir: config.download_dir().clone(),
            step_entered_at: Instant::now(),
        }
    }

    pub fn step(&self) -> Step {
        self.wizard.step()
    }

    pub fn step_elapsed(&self) -> Duration {
        self.step_entered_at.elapsed()
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Vec<AppCommand> {
        match event {
            AppEvent::Info(message) => self.push_status_line(message),
            AppEvent::Error(message) => self.push_error_line(message),
            AppEvent::Wizard(event) => return self.dispatch(event),
            AppEvent::CreditsUpdated { epoch, credits } => {
                if epoch.map_or(true, |epoch| epoch == self.wizard.epoch()) {
                    self.credits = Some(credits);
                } else {
                    debug!(?epoch, "discarding stale credits refresh");
                }
            }
            AppEvent::PlaybackStarted { file_id } => {
                self.playing = Some(file_id);
            }
            AppEvent::PlaybackStopped => {
                self.playing = None;
            }
            AppEvent::Downloaded { path, bytes } => {
                let kilobytes = bytes as f64 / 1024.0;
                self.push_status_line(format!("Saved {} ({kilobytes:.0} KB)", path.display()));
            }
        }
        Vec::new()
    }

    /// Routes an intent through the wizard and turns its effect into commands.
    pub fn dispatch(&mut self, event: WizardEvent) -> Vec<AppCommand> {
        let before = self.wizard.step();
        let previous_error = self.wizard.error().map(str::to_string);
        let stops_playback = matches!(event, WizardEvent::Reset | WizardEvent::VariationPicked(_));
        let is_reset = matches!(event, WizardEvent::Reset);

        let effect = self.wizard.apply(event);
        let after = self.wizard.step();

        let mut commands = Vec::new();
        if stops_playback && self.playing.is_some() {
            commands.push(AppCommand::StopPlayback);
        }
        if is_reset {
            self.upload_input.clear();
            self.edit_field = EditField::Prompt;
            self.highlighted = 0;
            self.push_status_line("Started over".to_string());
        }
        if before != after {
            self.on_step_changed(before, after);
        }
        if let Some(error) = self.wizard.error() {
            if previous_error.as_deref() != Some(error) {
                let error = error.to_string();
                self.push_error_line(error);
            }
        }
        if let Some(effect) = effect {
            commands.push(AppCommand::Effect(effect));
        }
        commands
    }

    fn on_step_changed(&mut self, before: Step, after: Step) {
        self.step_entered_at = Instant::now();
        match (before, after) {
            (Step::Analyzing, Step::Edit) => {
                self.edit_field = EditField::Prompt;
                if let Some(analysis) = self.wizard.analysis() {
                    let line = format!(
                        "Analysis complete: {} BPM, {}, {}",
                        analysis.bpm, analysis.key, analysis.overall_mood
                    );
                    self.push_status_line(line);
                }
            }
            (Step::Generating, Step::Pick) => {
                self.highlighted = 0;
                let count = self.wizard.variations().len();
                self.push_status_line(format!("{count} variations ready"));
            }
            (Step::Merging, Step::Done) => {
                if let Some(export) = self.wizard.export() {
                    let line = format!("Merged video ready ({:.1}s)", export.duration_seconds);
                    self.push_status_line(line);
                }
            }
            _ => {}
        }
    }

    pub fn type_char(&mut self, ch: char) -> Vec<AppCommand> {
        match self.step() {
            Step::Upload if !self.wizard.is_validating() => {
                self.upload_input.push(ch);
                Vec::new()
            }
            Step::Edit => match self.edit_field {
                EditField::Prompt => {
                    let mut prompt = self.wizard.composition().prompt.clone();
                    prompt.push(ch);
                    self.dispatch(WizardEvent::SetPrompt(prompt))
                }
                EditField::NegativePrompt => {
                    let mut negative = self.wizard.composition().negative_prompt.clone();
                    negative.push(ch);
                    self.dispatch(WizardEvent::SetNegativePrompt(negative))
                }
                EditField::Bpm => match ch {
                    '+' | '=' => self.adjust_bpm(BPM_STEP),
                    '-' | '_' => self.adjust_bpm(-BPM_STEP),
                    _ => Vec::new(),
                },
            },
            _ => Vec::new(),
        }
    }

    pub fn backspace(&mut self) -> Vec<AppCommand> {
        match self.step() {
            Step::Upload if !self.wizard.is_validating() => {
                self.upload_input.pop();
                Vec::new()
            }
            Step::Edit => match self.edit_field {
                EditField::Prompt => {
                    let mut prompt = self.wizard.composition().prompt.clone();
                    prompt.pop();
                    self.dispatch(WizardEvent::SetPrompt(prompt))
                }
                EditField::NegativePrompt => {
                    let mut negative = self.wizard.composition().negative_prompt.clone();
                    negative.pop();
                    self.dispatch(WizardEvent::SetNegativePrompt(negative))
                }
                EditField::Bpm => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    pub fn adjust_bpm(&mut self, delta: i32) -> Vec<AppCommand> {
        let current = i32::from(self.wizard.composition().bpm);
        let next = (current + delta).clamp(0, i32::from(u16::MAX)) as u16;
        self.dispatch(WizardEvent::SetBpm(next))
    }

    pub fn adjust_bpm_coarse(&mut self, up: bool) -> Vec<AppCommand> {
        self.adjust_bpm(if up { BPM_COARSE_STEP } else { -BPM_COARSE_STEP })
    }

    pub fn cycle_field(&mut self) {
        self.edit_field = self.edit_field.next();
    }

    pub fn submit(&mut self) -> Vec<AppCommand> {
        match self.step() {
            Step::Upload => {
                let raw = self.upload_input.trim();
                if raw.is_empty() {
                    self.push_status_line("Type the path of a video to upload".to_string());
                    return Vec::new();
                }
                let path = expand_home(raw);
                self.dispatch(WizardEvent::UploadRequested(path))
            }
            Step::Edit => self.dispatch(WizardEvent::GenerateRequested),
            Step::Pick => self.dispatch(WizardEvent::VariationPicked(self.highlighted)),
            _ => Vec::new(),
        }
    }

    pub fn move_highlight(&mut self, delta: isize) {
        let count = self.wizard.variations().len();
        if count == 0 {
            self.highlighted = 0;
            return;
        }
        let current = self.highlighted.min(count - 1) as isize;
        self.highlighted = (current + delta).rem_euclid(count as isize) as usize;
    }

    pub fn highlighted_variation(&self) -> Option<&MusicVariation> {
        self.wizard.variations().get(self.highlighted)
    }

    pub fn toggle_preview(&mut self) -> Vec<AppCommand> {
        if self.step() != Step::Pick {
            return Vec::new();
        }
        let Some(variation) = self.highlighted_variation().cloned() else {
            return Vec::new();
        };
        if self.playing.as_deref() == Some(variation.file_id.as_str()) {
            return vec![AppCommand::StopPlayback];
        }
        vec![AppCommand::PreviewVariation { variation }]
    }

    pub fn download_track(&mut self, format: AudioFormat) -> Vec<AppCommand> {
        let variation = match self.step() {
            Step::Pick => self.highlighted_variation(),
            Step::Done => self.wizard.selected(),
            _ => None,
        };
        match variation {
            Some(variation) => {
                vec![AppCommand::DownloadTrack { file_id: variation.file_id.clone(), format }]
            }
            None => Vec::new(),
        }
    }

    pub fn download_export(&mut self) -> Vec<AppCommand> {
        match (self.step(), self.wizard.export()) {
            (Step::Done, Some(export)) => {
                vec![AppCommand::DownloadExport { video_url: export.video_url.clone() }]
            }
            _ => Vec::new(),
        }
    }

    pub fn push_status_line(&mut self, message: String) {
        self.push_line(message, false);
    }

    pub fn push_error_line(&mut self, message: String) {
        self.push_line(format!("Error: {message}"), true);
    }

    fn push_line(&mut self, message: String, is_error: bool) {
        self.status_lines.push(StatusLine { timestamp: Local::now(), message, is_error });
        if self.status_lines.len() > MAX_STATUS_LINES {
            let overflow = self.status_lines.len() - MAX_STATUS_LINES;
            self.status_lines.drain(0..overflow);
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
