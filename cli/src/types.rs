use serde::{Deserialize, Serialize};

pub const MIN_BPM: u16 = 40;
pub const MAX_BPM: u16 = 220;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub energy: String,
    pub mood: String,
    pub visual_description: String,
    pub musical_suggestion: String,
}

impl VideoSegment {
    pub fn duration_seconds(&self) -> f64 {
        (self.end_seconds - self.start_seconds).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioProfile {
    pub has_speech: bool,
    pub has_ambient_sound: bool,
    pub is_silent: bool,
    pub recommended_mix: String,
    #[serde(default)]
    pub mix_reasoning: String,
}

impl AudioProfile {
    pub fn recommended_mix_mode(&self) -> Option<MixMode> {
        MixMode::from_name(&self.recommended_mix)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StyleSuggestion {
    pub label: String,
    pub modifier: String,
}

fn default_key() -> String {
    "C minor".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoAnalysis {
    pub bpm: u16,
    #[serde(default = "default_key")]
    pub key: String,
    pub overall_mood: String,
    pub energy_arc: String,
    pub audio_profile: AudioProfile,
    pub segments: Vec<VideoSegment>,
    #[serde(default)]
    pub style_suggestions: Vec<StyleSuggestion>,
    pub primary_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateVariationsRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub mood: String,
    pub bpm: u16,
    pub style_suggestions: Vec<StyleSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MusicVariation {
    pub file_id: String,
    pub audio_url: String,
    pub style_label: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVariationsResponse {
    pub variations: Vec<MusicVariation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergedExport {
    pub video_url: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditBalance {
    pub credits: i64,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// How the generated track is ducked against the video's own audio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MixMode {
    Social,
    Background,
    Balanced,
    Feature,
}

impl MixMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Social => "social",
            Self::Background => "background",
            Self::Balanced => "balanced",
            Self::Feature => "feature",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "social" => Some(Self::Social),
            "background" => Some(Self::Background),
            "balanced" => Some(Self::Balanced),
            "feature" => Some(Self::Feature),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Social => "music level with the original, ducked under speech",
            Self::Background => "music kept subtle under voiceover",
            Self::Balanced => "music and original audio share the mix",
            Self::Feature => "music leads over faint ambience",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_fills_optional_fields_with_defaults() {
        let body = json!({
            "bpm": 96,
            "overall_mood": "wistful",
            "energy_arc": "slow build",
            "audio_profile": {
                "has_speech": true,
                "has_ambient_sound": false,
                "is_silent": false,
                "recommended_mix": "background"
            },
            "segments": [],
            "primary_prompt": "soft lo-fi piano"
        });

        let analysis: VideoAnalysis = serde_json::from_value(body).unwrap();
        assert_eq!(analysis.key, "C minor");
        assert!(analysis.style_suggestions.is_empty());
        assert_eq!(analysis.negative_prompt, "");
        assert_eq!(analysis.audio_profile.mix_reasoning, "");
    }

    #[test]
    fn mix_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_value(MixMode::Social).unwrap(), json!("social"));
        assert_eq!(MixMode::Feature.as_str(), "feature");
    }

    #[test]
    fn recommended_mix_maps_to_mode() {
        let mut profile = AudioProfile {
            has_speech: true,
            has_ambient_sound: false,
            is_silent: false,
            recommended_mix: " Background".into(),
            mix_reasoning: String::new(),
        };
        assert_eq!(profile.recommended_mix_mode(), Some(MixMode::Background));

        profile.recommended_mix = "feature".into();
        assert_eq!(profile.recommended_mix_mode(), Some(MixMode::Feature));

        profile.recommended_mix = "loud".into();
        assert_eq!(profile.recommended_mix_mode(), None);
        assert_eq!(MixMode::from_name("balanced"), Some(MixMode::Balanced));
    }

    #[test]
    fn segment_duration_never_negative() {
        let segment = VideoSegment {
            start_seconds: 12.0,
            end_seconds: 10.0,
            energy: "peak".into(),
            mood: "tense".into(),
            visual_description: "cut to black".into(),
            musical_suggestion: "hit".into(),
        };
        assert_eq!(segment.duration_seconds(), 0.0);
    }
}
