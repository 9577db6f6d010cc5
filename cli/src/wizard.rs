//! The wizard's step machine.
//!
//! Every mutation goes through [`Wizard::apply`], which takes an event and
//! returns at most one [`Effect`] for the controller to run. Network results
//! carry the [`Epoch`] they were dispatched under and are dropped when the
//! epoch has moved on, so a slow response can never overwrite state after a
//! reset or an abandoned step.

use crate::{
    types::{
        GenerateVariationsRequest, MergedExport, MixMode, MusicVariation, VideoAnalysis,
        VideoSegment, MAX_BPM, MIN_BPM,
    },
    upload::SelectedVideo,
};
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_BPM: u16 = 120;
pub const MERGE_MIX_MODE: MixMode = MixMode::Social;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Epoch(u64);

impl Epoch {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Upload,
    Analyzing,
    Edit,
    Generating,
    Pick,
    Merging,
    Done,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::Analyzing => "Analyzing",
            Self::Edit => "Edit prompt",
            Self::Generating => "Generating",
            Self::Pick => "Pick a track",
            Self::Merging => "Merging",
            Self::Done => "Done",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Analyzing | Self::Generating | Self::Merging)
    }

    /// Ordinal among the durable steps, used for the progress header.
    pub fn position(&self) -> usize {
        match self {
            Self::Upload | Self::Analyzing => 0,
            Self::Edit | Self::Generating => 1,
            Self::Pick | Self::Merging => 2,
            Self::Done => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub prompt: String,
    pub negative_prompt: String,
    pub bpm: u16,
}

impl Default for Composition {
    fn default() -> Self {
        Self { prompt: String::new(), negative_prompt: String::new(), bpm: DEFAULT_BPM }
    }
}

impl Composition {
    fn seeded_from(analysis: &VideoAnalysis) -> Self {
        Self {
            prompt: analysis.primary_prompt.clone(),
            negative_prompt: analysis.negative_prompt.clone(),
            bpm: clamp_bpm(analysis.bpm),
        }
    }
}

pub fn clamp_bpm(bpm: u16) -> u16 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    UploadRequested(PathBuf),
    UploadAccepted { epoch: Epoch, video: SelectedVideo },
    UploadRejected { epoch: Epoch, reason: String },
    AnalysisSucceeded { epoch: Epoch, analysis: VideoAnalysis },
    AnalysisFailed { epoch: Epoch, message: String },
    SetPrompt(String),
    SetNegativePrompt(String),
    SetBpm(u16),
    GenerateRequested,
    GenerationSucceeded { epoch: Epoch, variations: Vec<MusicVariation> },
    GenerationFailed { epoch: Epoch, message: String },
    VariationPicked(usize),
    MergeSucceeded { epoch: Epoch, export: MergedExport },
    MergeFailed { epoch: Epoch, message: String },
    Back,
    Forward,
    DismissError,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Validate {
        epoch: Epoch,
        path: PathBuf,
    },
    Analyze {
        epoch: Epoch,
        video: SelectedVideo,
    },
    Generate {
        epoch: Epoch,
        request: GenerateVariationsRequest,
    },
    Merge {
        epoch: Epoch,
        video: SelectedVideo,
        file_id: String,
        mix_mode: MixMode,
        segments: Vec<VideoSegment>,
    },
    RefreshCredits {
        epoch: Epoch,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wizard {
    step: Step,
    epoch: Epoch,
    validating: bool,
    video: Option<SelectedVideo>,
    analysis: Option<VideoAnalysis>,
    composition: Composition,
    variations: Vec<MusicVariation>,
    selected: Option<MusicVariation>,
    export: Option<MergedExport>,
    error: Option<String>,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self {
            step: Step::Upload,
            epoch: Epoch::default(),
            validating: false,
            video: None,
            analysis: None,
            composition: Composition::default(),
            variations: Vec::new(),
            selected: None,
            export: None,
            error: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    pub fn video(&self) -> Option<&SelectedVideo> {
        self.video.as_ref()
    }

    pub fn analysis(&self) -> Option<&VideoAnalysis> {
        self.analysis.as_ref()
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn variations(&self) -> &[MusicVariation] {
        &self.variations
    }

    pub fn selected(&self) -> Option<&MusicVariation> {
        self.selected.as_ref()
    }

    pub fn export(&self) -> Option<&MergedExport> {
        self.export.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn apply(&mut self, event: WizardEvent) -> Option<Effect> {
        match event {
            WizardEvent::UploadRequested(path) => self.request_upload(path),
            WizardEvent::UploadAccepted { epoch, video } => {
                if !self.validating || !self.is_current(epoch, Step::Upload, "upload accepted") {
                    return None;
                }
                self.accept_upload(video)
            }
            WizardEvent::UploadRejected { epoch, reason } => {
                if !self.validating || !self.is_current(epoch, Step::Upload, "upload rejected") {
                    return None;
                }
                self.validating = false;
                self.error = Some(reason);
                None
            }
            WizardEvent::AnalysisSucceeded { epoch, analysis } => {
                if !self.is_current(epoch, Step::Analyzing, "analysis") {
                    return None;
                }
                self.composition = Composition::seeded_from(&analysis);
                self.analysis = Some(analysis);
                self.step = Step::Edit;
                None
            }
            WizardEvent::AnalysisFailed { epoch, message } => {
                self.fail(epoch, Step::Analyzing, Step::Upload, message);
                None
            }
            WizardEvent::SetPrompt(prompt) => {
                if self.step == Step::Edit {
                    self.composition.prompt = prompt;
                }
                None
            }
            WizardEvent::SetNegativePrompt(negative_prompt) => {
                if self.step == Step::Edit {
                    self.composition.negative_prompt = negative_prompt;
                }
                None
            }
            WizardEvent::SetBpm(bpm) => {
                if self.step == Step::Edit {
                    self.composition.bpm = clamp_bpm(bpm);
                }
                None
            }
            WizardEvent::GenerateRequested => self.request_generation(),
            WizardEvent::GenerationSucceeded { epoch, variations } => {
                if !self.is_current(epoch, Step::Generating, "generation") {
                    return None;
                }
                self.variations = variations;
                self.selected = None;
                self.export = None;
                self.step = Step::Pick;
                Some(Effect::RefreshCredits { epoch: self.epoch })
            }
            WizardEvent::GenerationFailed { epoch, message } => {
                self.fail(epoch, Step::Generating, Step::Edit, message);
                None
            }
            WizardEvent::VariationPicked(index) => self.pick(index),
            WizardEvent::MergeSucceeded { epoch, export } => {
                if !self.is_current(epoch, Step::Merging, "merge") {
                    return None;
                }
                self.export = Some(export);
                self.step = Step::Done;
                None
            }
            WizardEvent::MergeFailed { epoch, message } => {
                self.fail(epoch, Step::Merging, Step::Pick, message);
                None
            }
            WizardEvent::Back => {
                self.back();
                None
            }
            WizardEvent::Forward => {
                self.forward();
                None
            }
            WizardEvent::DismissError => {
                self.error = None;
                None
            }
            WizardEvent::Reset => {
                let epoch = self.epoch.next();
                *self = Self::new();
                self.epoch = epoch;
                None
            }
        }
    }

    fn is_current(&self, epoch: Epoch, expected: Step, what: &str) -> bool {
        if epoch != self.epoch || self.step != expected {
            debug!(
                ?epoch,
                current = ?self.epoch,
                step = ?self.step,
                "discarding stale {what} result"
            );
            return false;
        }
        true
    }

    fn fail(&mut self, epoch: Epoch, busy: Step, durable: Step, message: String) {
        if !self.is_current(epoch, busy, "failed") {
            return;
        }
        self.step = durable;
        self.error = Some(message);
    }

    fn request_upload(&mut self, path: PathBuf) -> Option<Effect> {
        if self.step != Step::Upload || self.validating {
            return None;
        }
        self.validating = true;
        self.error = None;
        Some(Effect::Validate { epoch: self.epoch, path })
    }

    fn accept_upload(&mut self, video: SelectedVideo) -> Option<Effect> {
        // A new video invalidates everything derived from the previous one.
        self.epoch = self.epoch.next();
        self.validating = false;
        self.analysis = None;
        self.composition = Composition::default();
        self.variations.clear();
        self.selected = None;
        self.export = None;
        self.error = None;
        self.video = Some(video.clone());
        self.step = Step::Analyzing;
        Some(Effect::Analyze { epoch: self.epoch, video })
    }

    fn request_generation(&mut self) -> Option<Effect> {
        if self.step != Step::Edit {
            return None;
        }
        let analysis = self.analysis.as_ref()?;
        let request = GenerateVariationsRequest {
            prompt: self.composition.prompt.clone(),
            negative_prompt: self.composition.negative_prompt.clone(),
            mood: analysis.overall_mood.clone(),
            bpm: self.composition.bpm,
            style_suggestions: analysis.style_suggestions.clone(),
        };
        self.error = None;
        self.step = Step::Generating;
        Some(Effect::Generate { epoch: self.epoch, request })
    }

    fn pick(&mut self, index: usize) -> Option<Effect> {
        if self.step != Step::Pick {
            return None;
        }
        let video = self.video.clone()?;
        let segments = self.analysis.as_ref()?.segments.clone();
        let variation = self.variations.get(index)?.clone();
        let file_id = variation.file_id.clone();
        // The export belongs to the previous selection; keep it only for a repeat pick.
        let repeat_pick =
            self.selected.as_ref().is_some_and(|selected| selected.file_id == file_id);
        if !repeat_pick {
            self.export = None;
        }
        self.selected = Some(variation);
        self.error = None;
        self.step = Step::Merging;
        Some(Effect::Merge {
            epoch: self.epoch,
            video,
            file_id,
            mix_mode: MERGE_MIX_MODE,
            segments,
        })
    }

    fn back(&mut self) {
        let previous = match self.step {
            Step::Upload => return,
            Step::Edit | Step::Analyzing => Step::Upload,
            Step::Pick | Step::Generating => Step::Edit,
            Step::Done | Step::Merging => Step::Pick,
        };
        if self.step.is_busy() {
            // The outstanding call keeps running but its result will no longer apply.
            self.epoch = self.epoch.next();
        }
        self.step = previous;
    }

    fn forward(&mut self) {
        let next = match self.step {
            Step::Upload if self.analysis.is_some() && !self.validating => Step::Edit,
            Step::Edit if !self.variations.is_empty() => Step::Pick,
            Step::Pick if self.export.is_some() => Step::Done,
            _ => return,
        };
        self.error = None;
        self.step = next;
    }
}
