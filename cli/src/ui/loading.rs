use crate::wizard::Step;
use std::time::Duration;

const STAGE_INTERVAL: Duration = Duration::from_secs(4);

const ANALYZING_STAGES: &[&str] = &[
    "Uploading video",
    "Watching every frame",
    "Reading the energy arc",
    "Picking tempo and key",
    "Writing a music prompt",
];

const GENERATING_STAGES: &[&str] = &[
    "Sending your prompt",
    "Composing the original",
    "Rendering style variations",
    "Mastering previews",
];

const MERGING_STAGES: &[&str] = &[
    "Uploading video",
    "Fetching the track",
    "Ducking audio under speech",
    "Encoding the final cut",
];

pub fn stages(step: Step) -> &'static [&'static str] {
    match step {
        Step::Analyzing => ANALYZING_STAGES,
        Step::Generating => GENERATING_STAGES,
        Step::Merging => MERGING_STAGES,
        _ => &[],
    }
}

/// The last stage holds until the backend answers.
pub fn stage_index(step: Step, elapsed: Duration) -> usize {
    let count = stages(step).len();
    if count == 0 {
        return 0;
    }
    let advanced = (elapsed.as_millis() / STAGE_INTERVAL.as_millis()) as usize;
    advanced.min(count - 1)
}

pub fn spinner_frame(elapsed: Duration) -> char {
    const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
    FRAMES[(elapsed.as_millis() / 150) as usize % FRAMES.len()]
}
