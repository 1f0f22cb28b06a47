// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword topic and emotion detection used by the heuristic scorer.
//!
//! Matching is case-insensitive substring search over fixed dictionaries.

use std::collections::BTreeSet;
use std::fmt;

/// Conversation topic recognized by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Relapse,
    Craving,
    Triggers,
    Emotions,
    Recovery,
    Relationships,
    Health,
    Goals,
    Coping,
    Celebration,
    Challenge,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Relapse => "relapse",
            Topic::Craving => "craving",
            Topic::Triggers => "triggers",
            Topic::Emotions => "emotions",
            Topic::Recovery => "recovery",
            Topic::Relationships => "relationships",
            Topic::Health => "health",
            Topic::Goals => "goals",
            Topic::Coping => "coping",
            Topic::Celebration => "celebration",
            Topic::Challenge => "challenge",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::Relapse,
        &["relapse", "slipped", "slip up", "used again", "drank again", "fell off", "gave in"],
    ),
    (
        Topic::Craving,
        &["craving", "crave", "urge", "tempted", "temptation", "itching to"],
    ),
    (
        Topic::Triggers,
        &["trigger", "stress", "party", "payday", "lonely", "bored", "argument"],
    ),
    (
        Topic::Emotions,
        &["feel", "emotion", "mood", "overwhelmed"],
    ),
    (
        Topic::Recovery,
        &["recovery", "sober", "sobriety", "clean", "abstinent", "meeting", "sponsor"],
    ),
    (
        Topic::Relationships,
        &[
            "family", "friend", "partner", "wife", "husband", "mom", "dad", "mother", "father",
            "kids", "children", "relationship", "boyfriend", "girlfriend",
        ],
    ),
    (
        Topic::Health,
        &[
            "sleep", "exercise", "workout", "health", "doctor", "therapy", "therapist", "diet",
            "tired", "gym",
        ],
    ),
    (
        Topic::Goals,
        &["goal", "plan", "want to", "hope to", "working toward", "target"],
    ),
    (
        Topic::Coping,
        &["cope", "coping", "breath", "meditat", "walk", "journal", "called my", "distract", "grounding"],
    ),
    (
        Topic::Celebration,
        &["celebrat", "milestone", "proud", "achiev", "accomplish", "streak", "anniversary"],
    ),
    (
        Topic::Challenge,
        &["hard", "difficult", "struggl", "challenge", "tough", "rough day", "setback"],
    ),
];

/// Dominant emotion of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Joyful,
    Sad,
    Angry,
    Anxious,
    Hopeful,
    Ashamed,
    Grateful,
    Proud,
    Neutral,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joyful => "joyful",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Anxious => "anxious",
            Emotion::Hopeful => "hopeful",
            Emotion::Ashamed => "ashamed",
            Emotion::Grateful => "grateful",
            Emotion::Proud => "proud",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Order matters: ties resolve to the earliest entry.
const EMOTION_KEYWORDS: &[(Emotion, &[&str])] = &[
    (
        Emotion::Joyful,
        &["happy", "joy", "excited", "great", "wonderful", "amazing", "good day"],
    ),
    (
        Emotion::Sad,
        &["sad", "down", "depressed", "lonely", "crying", "cried", "miserable", "heartbroken"],
    ),
    (
        Emotion::Angry,
        &["angry", "mad at", "furious", "frustrated", "annoyed", "pissed", "enraged"],
    ),
    (
        Emotion::Anxious,
        &["anxious", "anxiety", "worried", "nervous", "panic", "scared", "afraid", "on edge"],
    ),
    (
        Emotion::Hopeful,
        &["hopeful", "hope", "optimistic", "looking forward", "better tomorrow"],
    ),
    (
        Emotion::Ashamed,
        &["ashamed", "shame", "guilty", "guilt", "embarrassed", "disappointed in myself"],
    ),
    (
        Emotion::Grateful,
        &["grateful", "thankful", "thank you", "appreciate", "blessed"],
    ),
    (
        Emotion::Proud,
        &["proud", "accomplished", "did it", "made it"],
    ),
    (
        Emotion::Neutral,
        &["okay", "fine", "alright", "meh", "so-so"],
    ),
];

/// Every topic with at least one keyword present in `text`.
pub fn detect_topics(text: &str) -> BTreeSet<Topic> {
    let lower = text.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(topic, _)| *topic)
        .collect()
}

/// The emotion whose dictionary has the most keyword hits in `text`.
///
/// Ties go to the emotion listed first; no hits at all means neutral.
pub fn detect_emotion(text: &str) -> Emotion {
    let lower = text.to_lowercase();
    let mut best = (Emotion::Neutral, 0usize);
    for (emotion, keywords) in EMOTION_KEYWORDS {
        let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
        if hits > best.1 {
            best = (*emotion, hits);
        }
    }
    best.0
}
