//! Deterministic prompt construction.
//!
//! The same analysis always yields the same prompt, which keeps synthesis
//! retries idempotent from the collaborator's point of view.

use std::fmt::Write as _;

use super::Analysis;

/// Sub-attributes included in the image prompt.
const PROMPT_SUB_ATTRIBUTES: usize = 3;

/// Build the image-synthesis prompt for an analysis.
pub fn build_image_prompt(analysis: &Analysis) -> String {
    let mut prompt = format!(
        "A collectible creature card illustration of \"{}\", a monster born from a {}. \
         Element tags: {} and {}.",
        analysis.name.trim(),
        analysis.source_label.trim(),
        analysis.tags[0].trim(),
        analysis.tags[1].trim(),
    );

    let mut strongest: Vec<_> = analysis.sub_attributes.iter().collect();
    // Stable sort keeps analyzer order for equal scores
    strongest.sort_by(|a, b| b.score.cmp(&a.score));

    for attr in strongest.into_iter().take(PROMPT_SUB_ATTRIBUTES) {
        let _ = write!(
            prompt,
            " It shows {} ({}/100): {}.",
            attr.name.trim(),
            attr.score,
            attr.description.trim().trim_end_matches('.'),
        );
    }

    prompt.push_str(" Centered subject, vivid colors, clean background, no text.");
    prompt
}

/// Text handed to the speech synthesizer.
pub fn build_narration_text(analysis: &Analysis) -> String {
    format!("{}. {}", analysis.name.trim(), analysis.narrative.trim())
}
