//! Rule-driven extraction of target-language text from a marked model reply.
//!
//! Tutoring replies interleave target-language segments with translations,
//! corrections, and follow-up questions, each introduced by a marker. Only
//! the target-language segments should reach speech synthesis. Each language
//! profile declares its markers as a rule table; one generic scanner applies
//! them, so adding a language never adds scanning code.

/// A single segment rule: a leading marker that opens a target-language
/// segment, and the markers that terminate it on the same line.
#[derive(Debug, Clone, Copy)]
pub struct SegmentRule {
    /// Marker a line must start with to contribute a segment.
    pub leading: &'static str,
    /// The segment ends at the first occurrence of any of these; an empty
    /// slice keeps the rest of the line.
    pub terminators: &'static [&'static str],
}

/// The complete extraction rule set for one language profile.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRules {
    /// Ordered segment rules; the first rule whose leading marker matches a
    /// line wins.
    pub segments: &'static [SegmentRule],
    /// When set, leading unmarked lines are collected until the first line
    /// containing any of these markers. Used by profiles whose replies open
    /// with plain target-language text instead of marked segments.
    pub plain_prefix: Option<&'static [&'static str]>,
}

/// Scans `reply` line by line and returns the concatenated target-language
/// segments, joined with single spaces. Returns an empty string when no rule
/// matched anything.
pub fn extract_segments(reply: &str, rules: &ExtractionRules) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut in_plain_prefix = rules.plain_prefix.is_some();

    for line in reply.lines() {
        let line = line.trim();

        if in_plain_prefix {
            let markers = rules.plain_prefix.unwrap_or_default();
            if markers.iter().any(|m| line.contains(m)) {
                in_plain_prefix = false;
            } else {
                if !line.is_empty() {
                    parts.push(line);
                }
                continue;
            }
        }

        if let Some(rule) = rules.segments.iter().find(|r| line.starts_with(r.leading)) {
            let mut segment = &line[rule.leading.len()..];
            if let Some(end) = rule.terminators.iter().filter_map(|t| segment.find(t)).min() {
                segment = &segment[..end];
            }
            let segment = segment.trim();
            if !segment.is_empty() {
                parts.push(segment);
            }
        }
    }

    parts.join(" ").trim().to_string()
}

/// Returns the text to hand to speech synthesis for `reply`.
///
/// Falls back to the raw reply verbatim when extraction yields nothing, so
/// the function is idempotent: extracted output contains no markers, and
/// running it through again returns it unchanged.
pub fn speech_text(reply: &str, rules: &ExtractionRules) -> String {
    let extracted = extract_segments(reply, rules);
    if extracted.is_empty() {
        reply.to_string()
    } else {
        extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile;

    fn rules_for(code: &str) -> &'static ExtractionRules {
        &profile::lookup(code).expect("profile exists").rules
    }

    #[test]
    fn german_reply_keeps_only_german_segments() {
        let reply = "🇩🇪 Guten Tag! Wie geht es dir? 🇺🇸 Good day! How are you?\n\
                     🇺🇸 (standalone translation line)\n\
                     💡 Corrections (if needed): none\n\
                     ❓ Was machst du heute? / What are you doing today?";
        let extracted = extract_segments(reply, rules_for("de"));
        assert_eq!(
            extracted,
            "Guten Tag! Wie geht es dir? Was machst du heute?"
        );
    }

    #[test]
    fn chinese_reply_stops_at_pinyin_marker() {
        let reply = "🇨🇳 你好！今天怎么样？\n\
                     📝 Pinyin: nǐ hǎo! jīn tiān zěn me yàng?\n\
                     🇺🇸 Hello! How is today?\n\
                     ❓ 你吃饭了吗？ 📝 nǐ chī fàn le ma?";
        let extracted = extract_segments(reply, rules_for("zh"));
        assert_eq!(extracted, "你好！今天怎么样？ 你吃饭了吗？");
    }

    #[test]
    fn segment_without_terminator_keeps_rest_of_line() {
        let reply = "🇳🇴 Hei, hvordan har du det?";
        let extracted = extract_segments(reply, rules_for("no"));
        assert_eq!(extracted, "Hei, hvordan har du det?");
    }

    #[test]
    fn english_collects_plain_prefix_until_first_marker() {
        let reply = "That sounds like a great weekend!\n\
                     I love hiking too.\n\
                     💡 Corrections: \"I goed\" should be \"I went\".\n\
                     ❓ Where did you hike?";
        let extracted = extract_segments(reply, rules_for("en"));
        assert_eq!(
            extracted,
            "That sounds like a great weekend! I love hiking too."
        );
    }

    #[test]
    fn unmarked_reply_with_marked_profile_extracts_nothing() {
        let reply = "Hallo! Schön dich zu sehen.";
        assert_eq!(extract_segments(reply, rules_for("de")), "");
    }

    #[test]
    fn speech_text_falls_back_to_raw_reply() {
        let reply = "Hallo! Schön dich zu sehen.";
        assert_eq!(speech_text(reply, rules_for("de")), reply);
    }

    #[test]
    fn speech_text_is_idempotent_on_marked_text() {
        let reply = "🇩🇪 Das Wetter ist schön. 🇺🇸 The weather is nice.\n\
                     ❓ Gehst du spazieren? / Are you going for a walk?";
        let rules = rules_for("de");
        let once = speech_text(reply, rules);
        let twice = speech_text(&once, rules);
        assert_eq!(once, twice);
        assert_eq!(once, "Das Wetter ist schön. Gehst du spazieren?");
    }

    #[test]
    fn speech_text_is_idempotent_on_plain_prefix_text() {
        let reply = "Nice to meet you!\nWhat brings you here?\n❓ Anything else?";
        let rules = rules_for("en");
        let once = speech_text(reply, rules);
        assert_eq!(speech_text(&once, rules), once);
    }

    #[test]
    fn empty_reply_extracts_nothing() {
        let rules = rules_for("de");
        assert_eq!(extract_segments("", rules), "");
        assert_eq!(speech_text("", rules), "");
    }
}
