//! Bypass challenge generation.
//!
//! Challenges escalate with the attempt number inside one lock period:
//!
//! | attempt | challenges |
//! |---|---|
//! | 1 | short reversed-typing |
//! | 2 | long reversed-typing |
//! | 3 | cooldown, then three arithmetic problems |
//! | 4 | free-form justification |
//! | 5+ | cooldown, five arithmetic problems, very long reversed-typing |
//!
//! The leading challenge of each tier carries the mandatory cooldown for the
//! attempt, looked up in the configured table and clamped at its last entry.

use rand::Rng;
use serde::{Deserialize, Serialize};

const TYPING_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%&*";

const SHORT_TYPING_LEN: usize = 30;
const LONG_TYPING_LEN: usize = 50;
const FINAL_TYPING_LEN: usize = 80;

/// Kind of challenge presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    /// Type the prompt back in reverse.
    Typing,
    /// Wait out the cooldown; no content.
    Cooldown,
    /// Solve an arithmetic problem.
    Math,
    /// Write a justification of at least `min_words` words.
    Justification,
}

/// One step of a bypass sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: ChallengeKind,

    pub prompt: String,

    /// Expected answer, for challenges that have one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub answer: Option<String>,

    /// Seconds that must elapse before the content is presented.
    pub cooldown_seconds: u64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_words: Option<u32>,
}

impl Challenge {
    fn typing(prompt: String, cooldown_seconds: u64) -> Self {
        let answer = prompt.chars().rev().collect();
        Self {
            kind: ChallengeKind::Typing,
            prompt,
            answer: Some(answer),
            cooldown_seconds,
            min_words: None,
        }
    }

    fn cooldown(cooldown_seconds: u64) -> Self {
        Self {
            kind: ChallengeKind::Cooldown,
            prompt: String::new(),
            answer: None,
            cooldown_seconds,
            min_words: None,
        }
    }

    fn math<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let a: i64 = rng.gen_range(100..=999);
        let b: i64 = rng.gen_range(10..=99);
        let (symbol, result) = match rng.gen_range(0..3) {
            0 => ('*', a * b),
            1 => ('+', a + b),
            _ => ('-', a - b),
        };
        Self {
            kind: ChallengeKind::Math,
            prompt: format!("{} {} {}", a, symbol, b),
            answer: Some(result.to_string()),
            cooldown_seconds: 0,
            min_words: None,
        }
    }

    fn justification(min_words: u32, cooldown_seconds: u64) -> Self {
        Self {
            kind: ChallengeKind::Justification,
            prompt: format!(
                "Write a {}+ word justification for why you need the tool right now:",
                min_words
            ),
            answer: None,
            cooldown_seconds,
            min_words: Some(min_words),
        }
    }
}

/// Cooldown for an attempt (1-based), clamped to the table's last entry.
///
/// An empty table means no cooldown.
pub fn cooldown_for(attempt: u32, cooldowns: &[u64]) -> u64 {
    let index = (attempt.max(1) - 1) as usize;
    cooldowns
        .get(index)
        .or_else(|| cooldowns.last())
        .copied()
        .unwrap_or(0)
}

/// Build the ordered challenge list for a bypass attempt.
pub fn generate_challenges<R: Rng + ?Sized>(
    attempt: u32,
    cooldowns: &[u64],
    min_words: u32,
    rng: &mut R,
) -> Vec<Challenge> {
    let cooldown = cooldown_for(attempt, cooldowns);

    match attempt {
        0 | 1 => vec![Challenge::typing(
            random_string(SHORT_TYPING_LEN, rng),
            cooldown,
        )],
        2 => vec![Challenge::typing(
            random_string(LONG_TYPING_LEN, rng),
            cooldown,
        )],
        3 => {
            let mut challenges = vec![Challenge::cooldown(cooldown)];
            challenges.extend((0..3).map(|_| Challenge::math(rng)));
            challenges
        }
        4 => vec![Challenge::justification(min_words, cooldown)],
        _ => {
            let mut challenges = vec![Challenge::cooldown(cooldown)];
            challenges.extend((0..5).map(|_| Challenge::math(rng)));
            challenges.push(Challenge::typing(random_string(FINAL_TYPING_LEN, rng), 0));
            challenges
        }
    }
}

/// Random alphanumeric string of `len` characters, used for ids and prompts.
pub fn random_alnum<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    rng.sample_iter(rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn random_string<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    (0..len)
        .map(|_| TYPING_CHARSET[rng.gen_range(0..TYPING_CHARSET.len())] as char)
        .collect()
}
