// Streaming transcript reconciliation
//
// Fragments arrive as deltas per speaker. Consecutive fragments from the same
// speaker extend one open entry; a fragment from the other speaker, a final
// hint or a completed turn closes it. Closed entries are never touched again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

/// Ordered transcript of one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment. Returns true if the log changed.
    pub fn apply_fragment(&mut self, speaker: Speaker, delta: &str, is_final: bool) -> bool {
        if delta.is_empty() {
            // A bare final hint only closes the speaker's own open entry
            return match self.entries.last_mut() {
                Some(last) if is_final && last.speaker == speaker && !last.is_final => {
                    last.is_final = true;
                    true
                }
                _ => false,
            };
        }

        match self.entries.last_mut() {
            Some(last) if last.speaker == speaker && !last.is_final => {
                last.text.push_str(delta);
                last.is_final = is_final;
                return true;
            }
            Some(last) => last.is_final = true,
            None => {}
        }

        self.entries.push(TranscriptEntry {
            speaker,
            text: delta.to_string(),
            is_final,
        });
        true
    }

    /// Close the trailing open entry of each speaker. Returns how many closed.
    pub fn finalize_trailing(&mut self) -> usize {
        let mut agent_done = false;
        let mut user_done = false;
        let mut finalized = 0;

        for entry in self.entries.iter_mut().rev() {
            if agent_done && user_done {
                break;
            }
            let done = match entry.speaker {
                Speaker::Agent => &mut agent_done,
                Speaker::User => &mut user_done,
            };
            if !*done && !entry.is_final {
                entry.is_final = true;
                *done = true;
                finalized += 1;
            }
        }

        finalized
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_speaker_appends() {
        let mut log = TranscriptLog::new();
        log.apply_fragment(Speaker::Agent, "Hel", false);
        log.apply_fragment(Speaker::Agent, "lo", false);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].text, "Hello");
        assert!(!log.entries()[0].is_final);
    }

    #[test]
    fn test_speaker_change_finalizes_previous() {
        let mut log = TranscriptLog::new();
        log.apply_fragment(Speaker::Agent, "Hi", false);
        log.apply_fragment(Speaker::User, "Hey", false);
        assert_eq!(log.len(), 2);
        assert!(log.entries()[0].is_final);
        assert!(!log.entries()[1].is_final);
    }

    #[test]
    fn test_empty_delta_ignored() {
        let mut log = TranscriptLog::new();
        assert!(!log.apply_fragment(Speaker::User, "", false));
        assert!(log.is_empty());
    }

    #[test]
    fn test_final_hint_without_text_closes_open_entry() {
        let mut log = TranscriptLog::new();
        log.apply_fragment(Speaker::User, "Yes", false);
        assert!(log.apply_fragment(Speaker::User, "", true));
        assert_eq!(log.len(), 1);
        assert!(log.entries()[0].is_final);
        assert!(!log.apply_fragment(Speaker::User, "", true));
    }
}
