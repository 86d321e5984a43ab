//! Static language profile table and the profile resolver.
//!
//! A profile carries everything language-specific for one locale: the system
//! prompt that shapes the tutor's replies, the synthesis voice, the language
//! hint for transcription, and the extraction rule set matching the reply
//! format the prompt asks for. Profiles are immutable and resolved by label
//! or code, falling back to English for anything unrecognized.

use crate::extraction::{ExtractionRules, SegmentRule};
use tracing::warn;

/// Per-locale configuration for the tutoring agent.
#[derive(Debug)]
pub struct LanguageProfile {
    /// Canonical language code, e.g. `de` or `pt-BR`.
    pub code: &'static str,
    /// Human-readable label accepted by the API, e.g. `German`.
    pub label: &'static str,
    /// System prompt template for the tutoring conversation.
    pub system_prompt: &'static str,
    /// Synthesis voice for this language.
    pub voice: &'static str,
    /// Language hint passed to the transcription service.
    pub transcription_language: &'static str,
    /// Rules isolating target-language text for synthesis.
    pub rules: ExtractionRules,
}

const EN_PROMPT: &str = "\
You are a friendly and engaging English language conversation partner. Your primary goal is to maintain a natural conversation while helping users improve their English. Follow these guidelines:
1. Always respond conversationally first, keeping the dialogue flowing
2. Then provide gentle corrections if needed, marked with 💡
3. Use emojis and friendly language to keep the conversation engaging
4. Ask follow-up questions to encourage more conversation
5. Provide cultural context when relevant, marked with 🌍
6. Keep responses concise but informative

Example format:
[Conversational response continuing the dialogue]
💡 Corrections (if needed): [specific corrections]
❓ [Follow-up question to keep the conversation going]";

const DE_PROMPT: &str = "\
You are a friendly and engaging German language conversation partner. Your primary goal is to maintain a natural conversation while helping users improve their German. Follow these guidelines:
1. Always respond in German first, followed by an English translation
2. Keep the conversation flowing naturally while providing gentle corrections
3. Use emojis and friendly language to keep the conversation engaging
4. Ask follow-up questions to encourage more conversation

Example format:
🇩🇪 [German response continuing the dialogue]
🇺🇸 [English translation]
💡 Corrections (if needed): [specific corrections]
❓ [Follow-up question in German with translation]";

const ZH_PROMPT: &str = "\
You are a friendly and engaging Mandarin Chinese conversation partner. Your primary goal is to maintain a natural conversation while helping users improve their Mandarin. Follow these guidelines:
1. Always respond in Chinese characters first, followed by pinyin and English translation
2. Keep the conversation flowing naturally while providing gentle corrections
3. Use emojis and friendly language to keep the conversation engaging
4. Ask follow-up questions to encourage more conversation
5. Provide cultural context about Chinese-speaking regions when relevant

Example format:
🇨🇳 [Chinese characters response]
📝 Pinyin: [pinyin with tones]
🇺🇸 [English translation]
💡 Corrections (if needed): [specific corrections]
❓ [Follow-up question in Chinese with pinyin and translation]";

const NO_PROMPT: &str = "\
You are a friendly and engaging Norwegian language conversation partner. Your primary goal is to maintain a natural conversation while helping users improve their Norwegian. Follow these guidelines:
1. Always respond in Norwegian first, followed by an English translation
2. Keep the conversation flowing naturally while providing gentle corrections
3. Use emojis and friendly language to keep the conversation engaging
4. Ask follow-up questions to encourage more conversation

Example format:
🇳🇴 [Norwegian response continuing the dialogue]
🇺🇸 [English translation]
💡 Corrections (if needed): [specific corrections]
❓ [Follow-up question in Norwegian with translation]";

const PT_BR_PROMPT: &str = "\
You are a friendly and engaging Brazilian Portuguese language conversation partner. Your primary goal is to maintain a natural conversation while helping users improve their Brazilian Portuguese. Follow these guidelines:
1. Always respond in Brazilian Portuguese first, followed by an English translation
2. Keep the conversation flowing naturally while providing gentle corrections
3. Use emojis and friendly language to keep the conversation engaging
4. Ask follow-up questions to encourage more conversation

Example format:
🇧🇷 [Brazilian Portuguese response continuing the dialogue]
🇺🇸 [English translation]
💡 Corrections (if needed): [specific corrections]
❓ [Follow-up question in Portuguese with translation]";

/// All supported profiles. The first entry is the default.
pub static PROFILES: &[LanguageProfile] = &[
    LanguageProfile {
        code: "en",
        label: "English",
        system_prompt: EN_PROMPT,
        voice: "shimmer",
        transcription_language: "en",
        rules: ExtractionRules {
            segments: &[],
            plain_prefix: Some(&["💡", "❓", "🌍"]),
        },
    },
    LanguageProfile {
        code: "de",
        label: "German",
        system_prompt: DE_PROMPT,
        voice: "onyx",
        transcription_language: "de",
        rules: ExtractionRules {
            segments: &[
                SegmentRule { leading: "🇩🇪", terminators: &["🇺🇸"] },
                SegmentRule { leading: "❓", terminators: &["/"] },
            ],
            plain_prefix: None,
        },
    },
    LanguageProfile {
        code: "zh",
        label: "Chinese",
        system_prompt: ZH_PROMPT,
        voice: "nova",
        transcription_language: "zh",
        rules: ExtractionRules {
            segments: &[
                SegmentRule { leading: "🇨🇳", terminators: &["📝"] },
                SegmentRule { leading: "❓", terminators: &["📝"] },
            ],
            plain_prefix: None,
        },
    },
    LanguageProfile {
        code: "no",
        label: "Norwegian",
        system_prompt: NO_PROMPT,
        voice: "echo",
        transcription_language: "no",
        rules: ExtractionRules {
            segments: &[
                SegmentRule { leading: "🇳🇴", terminators: &["🇺🇸"] },
                SegmentRule { leading: "❓", terminators: &["/"] },
            ],
            plain_prefix: None,
        },
    },
    LanguageProfile {
        code: "pt-BR",
        label: "Portuguese",
        system_prompt: PT_BR_PROMPT,
        voice: "alloy",
        transcription_language: "pt",
        rules: ExtractionRules {
            segments: &[
                SegmentRule { leading: "🇧🇷", terminators: &["🇺🇸"] },
                SegmentRule { leading: "❓", terminators: &["/"] },
            ],
            plain_prefix: None,
        },
    },
];

/// Returns the default profile (English).
pub fn default_profile() -> &'static LanguageProfile {
    &PROFILES[0]
}

/// Looks up a profile by its exact code, case-insensitively.
pub fn lookup(code: &str) -> Option<&'static LanguageProfile> {
    PROFILES.iter().find(|p| p.code.eq_ignore_ascii_case(code))
}

/// Resolves a free-form language label or code to a profile.
///
/// Accepts either the human label (`"German"`) or a code (`"de"`, `"pt"`).
/// Unrecognized input resolves to the default profile with a warning; this
/// is never an error.
pub fn resolve(label: &str) -> &'static LanguageProfile {
    let normalized = label.trim();
    let found = PROFILES.iter().find(|p| {
        p.label.eq_ignore_ascii_case(normalized) || p.code.eq_ignore_ascii_case(normalized)
    });
    match found {
        Some(profile) => profile,
        // The bare "pt" code maps to the Brazilian Portuguese profile.
        None if normalized.eq_ignore_ascii_case("pt") => resolve("pt-BR"),
        None => {
            warn!(language = %label, "unrecognized language, falling back to default profile");
            default_profile()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_labels_and_codes() {
        assert_eq!(resolve("German").code, "de");
        assert_eq!(resolve("de").code, "de");
        assert_eq!(resolve("english").code, "en");
        assert_eq!(resolve("Chinese").code, "zh");
        assert_eq!(resolve("Norwegian").code, "no");
        assert_eq!(resolve("Portuguese").code, "pt-BR");
        assert_eq!(resolve("pt").code, "pt-BR");
        assert_eq!(resolve("pt-br").code, "pt-BR");
    }

    #[test]
    fn unknown_language_falls_back_to_default() {
        assert_eq!(resolve("Klingon").code, "en");
        assert_eq!(resolve("").code, "en");
    }

    #[test]
    fn lookup_is_exact_by_code() {
        assert!(lookup("de").is_some());
        assert!(lookup("German").is_none());
        assert!(lookup("xx").is_none());
    }

    #[test]
    fn every_profile_has_a_voice_and_prompt() {
        for profile in PROFILES {
            assert!(!profile.voice.is_empty(), "{} has no voice", profile.code);
            assert!(
                !profile.system_prompt.is_empty(),
                "{} has no prompt",
                profile.code
            );
        }
    }

    #[test]
    fn default_profile_is_english() {
        assert_eq!(default_profile().code, "en");
    }
}
