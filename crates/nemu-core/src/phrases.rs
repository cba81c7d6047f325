//! Canned conversation phrases.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::TeachOutcome;

const TEACHING_PROMPTS: &[&str] = &[
    "I don't know that yet. Can you teach me? 🤔",
    "Hmm, I haven't learned about that. Can you help me learn? 📚",
    "I'm not sure about that. Could you teach me? 🧠",
    "That's new to me! Can you explain it to me? ✨",
    "I don't have that information yet. Would you like to teach me? 💭",
];

const ACKNOWLEDGEMENTS: &[&str] = &[
    "Thanks {name}! I {verb} something new! 🧠✨",
    "Awesome {name}! I've {verb} that. Thanks for teaching me! 💕",
    "Great! I {verb} that information. Thank you {name}! 🎉",
    "Perfect! I've {verb} that knowledge. Thanks for helping me learn! 🌟",
];

const STORAGE_FAILED: &str =
    "Sorry {name}, I couldn't save that right now. Please teach me again in a bit! 🙏";

/// A random "please teach me" prompt.
pub fn teaching_prompt<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    TEACHING_PROMPTS.choose(rng).copied().unwrap_or(TEACHING_PROMPTS[0])
}

/// Reply text for a teaching outcome, addressed to `name`.
///
/// `None` for [`TeachOutcome::NotATeachingReply`]: there is nothing to acknowledge.
pub fn acknowledgement<R: Rng + ?Sized>(
    outcome: TeachOutcome,
    name: &str,
    rng: &mut R,
) -> Option<String> {
    let template = match outcome {
        TeachOutcome::NotATeachingReply => return None,
        TeachOutcome::StorageFailed => STORAGE_FAILED,
        TeachOutcome::Learned | TeachOutcome::Updated => {
            ACKNOWLEDGEMENTS.choose(rng).copied().unwrap_or(ACKNOWLEDGEMENTS[0])
        }
    };

    let verb = outcome.verb().unwrap_or_default();
    Some(template.replace("{name}", name).replace("{verb}", verb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_acknowledgement_uses_outcome_verb() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let text = acknowledgement(TeachOutcome::Updated, "ada", &mut rng).unwrap();
            assert!(text.contains("updated"));
            assert!(!text.contains('{'));
        }
    }

    #[test]
    fn test_storage_failure_is_an_apology() {
        let mut rng = StdRng::seed_from_u64(1);
        let text = acknowledgement(TeachOutcome::StorageFailed, "ada", &mut rng).unwrap();
        assert!(text.starts_with("Sorry ada"));
        assert!(!text.contains("learned"));
    }

    #[test]
    fn test_not_a_teaching_reply_has_no_text() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(acknowledgement(TeachOutcome::NotATeachingReply, "ada", &mut rng).is_none());
    }

    #[test]
    fn test_teaching_prompt_is_one_of_the_set() {
        let mut rng = StdRng::seed_from_u64(3);
        let prompt = teaching_prompt(&mut rng);
        assert!(TEACHING_PROMPTS.contains(&prompt));
    }
}
