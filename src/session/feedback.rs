use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Qualitative label for a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    Perfect,
    Excellent,
    Great,
    GoodEffort,
    KeepPracticing,
    TryAgain,
}

impl FeedbackTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            95..=u8::MAX => Self::Perfect,
            85..=94 => Self::Excellent,
            75..=84 => Self::Great,
            60..=74 => Self::GoodEffort,
            40..=59 => Self::KeepPracticing,
            _ => Self::TryAgain,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Perfect => "perfect",
            Self::Excellent => "excellent",
            Self::Great => "great",
            Self::GoodEffort => "good effort",
            Self::KeepPracticing => "keep practicing",
            Self::TryAgain => "try again",
        }
    }
}

impl Display for FeedbackTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
