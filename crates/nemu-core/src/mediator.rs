//! Response decoration.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::MediatorConfig;

/// Occasionally prepends a cosmetic marker to an answer.
///
/// Never changes which answer is returned, only how it looks.
#[derive(Debug, Clone)]
pub struct ResponseMediator {
    probability: f64,
    markers: Vec<String>,
}

impl ResponseMediator {
    pub fn new(config: &MediatorConfig) -> Self {
        let probability = if config.decoration_probability.is_finite() {
            config.decoration_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            probability,
            markers: config.markers.clone(),
        }
    }

    /// Decoration that never fires.
    pub fn plain() -> Self {
        Self {
            probability: 0.0,
            markers: Vec::new(),
        }
    }

    pub fn decorate(&self, response: &str) -> String {
        self.decorate_with(response, &mut rand::thread_rng())
    }

    pub fn decorate_with<R: Rng + ?Sized>(&self, response: &str, rng: &mut R) -> String {
        if self.markers.is_empty() || !rng.gen_bool(self.probability) {
            return response.to_string();
        }
        match self.markers.choose(rng) {
            Some(marker) => format!("{}{}", marker, response),
            None => response.to_string(),
        }
    }
}

impl Default for ResponseMediator {
    fn default() -> Self {
        Self::new(&MediatorConfig::default())
    }
}
