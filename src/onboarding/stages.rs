use serde::{Deserialize, Serialize};
use std::fmt;

/// Step of the scripted onboarding call
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStage {
    #[default]
    Greeting = 0,
    Payment = 1,
    Nbfc = 2,
    Rca = 3,
}

impl OnboardingStage {
    pub const ALL: [OnboardingStage; 4] = [
        OnboardingStage::Greeting,
        OnboardingStage::Payment,
        OnboardingStage::Nbfc,
        OnboardingStage::Rca,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Greeting => "Greeting & Purpose",
            Self::Payment => "Payment Options",
            Self::Nbfc => "Why NBFCs (Trust & Transparency)",
            Self::Rca => "Right Co-Applicant Identification",
        }
    }

    pub fn narrative(self) -> &'static str {
        match self {
            Self::Greeting => {
                "Hello! I'm calling from NxtWave, your course activation expert. This call is about \
                 helping you complete the final step so your learning journey can begin. You've \
                 already taken a smart first move by reserving your seat — let's make sure it's \
                 activated today."
            }
            Self::Payment => {
                "We have three simple options to get started — 1. Full payment, if you prefer \
                 completing it in one go. 2. Credit card payment, if you want flexible billing. \
                 3. Or the most popular — 0% interest EMI through our NBFC partners — where you can \
                 pay in easy monthly installments without paying a single rupee extra. Most parents \
                 and students choose the 0% EMI plan since it's convenient, affordable, and helps \
                 you begin immediately. Which one do you prefer?"
            }
            Self::Nbfc => {
                "We've partnered with trusted NBFCs registered under RBI — like Feemonk, GyanDhan, \
                 Bajaj, and Varthana — to make the process safe, transparent, and quick. These \
                 partners handle the loan processing digitally, while NxtWave focuses fully on your \
                 training and placement journey. It's a 0% interest plan, meaning you pay the same \
                 total amount — just split into easy EMIs. There's no hidden charge, no paperwork, \
                 and approval takes less than a few minutes once documents are ready."
            }
            Self::Rca => {
                "To make the approval smooth, we'll need a Right Co-Applicant — someone in your \
                 family with a regular income and active bank account. Usually, parents or siblings \
                 are the best fit. We'll just need 3 things: their PAN, Aadhaar, and bank proof — \
                 and a quick 15-second confirmation video. Everything's 100% digital and secure. \
                 Once we upload these, the loan gets approved almost instantly, and your seat is \
                 locked for onboarding. Let's finalize your co-applicant now — who in your family \
                 can we proceed with?"
            }
        }
    }
}

impl fmt::Display for OnboardingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.index() + 1, Self::ALL.len(), self.title())
    }
}

/// Current position in the onboarding script
///
/// Lives outside any session: connecting, disconnecting and errors leave it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTracker {
    current: OnboardingStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: OnboardingStage::default(),
        }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> OnboardingStage {
        self.current
    }

    /// Move to `stage`. Returns true if the stage changed.
    pub fn set(&mut self, stage: OnboardingStage) -> bool {
        let changed = self.current != stage;
        self.current = stage;
        changed
    }

    /// Step forward, staying put on the last stage
    pub fn advance(&mut self) -> bool {
        match self.current.next() {
            Some(next) => self.set(next),
            None => false,
        }
    }

    /// Step back, staying put on the first stage
    pub fn go_back(&mut self) -> bool {
        match self.current.prev() {
            Some(prev) => self.set(prev),
            None => false,
        }
    }
}

/// System instruction for the live model: persona, the four stages, and when
/// to call the payment tool.
pub fn system_instruction() -> String {
    let mut text = String::from(
        "You are Maya, a friendly and persuasive course activation expert from NxtWave. Your goal \
         is to guide a new student through the final onboarding steps. Speak in a natural, \
         encouraging mix of Telugu and English (Tenglish). Follow these four stages precisely, \
         engaging with the user at each step. Wait for the user to respond or ask questions before \
         moving to the next stage.\n",
    );

    for stage in OnboardingStage::ALL {
        text.push_str(&format!(
            "- Stage {}: {}. Narrative: \"{}\"\n",
            stage.index() + 1,
            stage.title(),
            stage.narrative()
        ));
    }

    text.push_str(&format!(
        "\nAs soon as the user picks a payment option in Stage 2, call the `{}` function with \
         `option` set to FULL_PAYMENT, CREDIT_CARD or EMI. Continue to Stage 3 only for EMI.\n\
         \nBegin with Stage 1 now.",
        super::tool::SELECT_PAYMENT_OPTION
    ));

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_navigation_clamps() {
        let mut tracker = StageTracker::new();
        assert!(!tracker.go_back());
        assert_eq!(tracker.current(), OnboardingStage::Greeting);

        assert!(tracker.advance());
        assert!(tracker.advance());
        assert!(tracker.advance());
        assert_eq!(tracker.current(), OnboardingStage::Rca);
        assert!(!tracker.advance());
        assert_eq!(tracker.current(), OnboardingStage::Rca);

        assert!(tracker.go_back());
        assert_eq!(tracker.current(), OnboardingStage::Nbfc);
    }

    #[test]
    fn test_set_reports_change() {
        let mut tracker = StageTracker::new();
        assert!(tracker.set(OnboardingStage::Nbfc));
        assert!(!tracker.set(OnboardingStage::Nbfc));
    }

    #[test]
    fn test_system_instruction_mentions_every_stage() {
        let text = system_instruction();
        for stage in OnboardingStage::ALL {
            assert!(text.contains(stage.title()));
        }
        assert!(text.contains("selectPaymentOption"));
        assert!(text.ends_with("Begin with Stage 1 now."));
    }

    #[test]
    fn test_display() {
        assert_eq!(OnboardingStage::Payment.to_string(), "2/4 Payment Options");
    }
}
