//! Operator confirmation, injected into anything that can destroy data.

use crate::error::Result;

/// Asks the operator a yes/no question. Anything but an explicit yes is a no.
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Answers every question the same way (`--yes`, non-interactive runs, tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, question: &str) -> Result<bool> {
        log_status!(
            "confirm",
            "{} {}",
            question,
            if self.0 { "yes (preset)" } else { "no (preset)" }
        );
        Ok(self.0)
    }
}

impl<C: Confirm + ?Sized> Confirm for &C {
    fn confirm(&self, question: &str) -> Result<bool> {
        (**self).confirm(question)
    }
}

/// `y`/`yes` in any case. Empty input takes the default, which is no.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
