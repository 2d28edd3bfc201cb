//! Score aggregation and the pass/XP arithmetic applied at the end of a call.

use crate::transcript::{DialogueStep, Speaker};

/// XP granted for finishing a call without passing it.
pub const ATTEMPT_XP: u32 = 10;
/// Base XP granted for passing a call, before the margin bonus.
pub const PASS_BASE_XP: f64 = 25.0;
/// XP needed per level.
pub const XP_PER_LEVEL: u32 = 100;

/// Rounded mean of every scored Agent entry, or `None` if nothing is scored yet.
///
/// `None` is deliberately distinct from a real score of zero.
pub fn average_score(transcript: &[DialogueStep]) -> Option<u8> {
    let scores: Vec<u32> = transcript
        .iter()
        .filter(|step| step.speaker == Speaker::Agent)
        .filter_map(|step| step.score.map(u32::from))
        .collect();

    if scores.is_empty() {
        return None;
    }

    let mean = scores.iter().sum::<u32>() as f64 / scores.len() as f64;
    Some(mean.round() as u8)
}

/// Score of the most recent scored Agent entry.
pub fn latest_score(transcript: &[DialogueStep]) -> Option<u8> {
    transcript
        .iter()
        .rev()
        .filter(|step| step.speaker == Speaker::Agent)
        .find_map(|step| step.score)
}

pub fn is_passing(average_score: u8, passing_score: u8) -> bool {
    average_score >= passing_score
}

/// XP earned for a finished call.
pub fn xp_award(average_score: u8, passing_score: u8) -> u32 {
    if is_passing(average_score, passing_score) {
        let margin = f64::from(average_score) - f64::from(passing_score);
        (PASS_BASE_XP + margin * 0.5).round() as u32
    } else {
        ATTEMPT_XP
    }
}

pub fn level_for_xp(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}
