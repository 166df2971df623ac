//! Flight regime classification: straight flight versus circling.
//!
//! The classifier watches the magnitude of the smoothed turn rate. A state
//! only advances after the turn rate stayed beyond the relevant threshold for
//! [`CirclingParameters::hysteresis_samples`] consecutive samples, and the
//! way between [`CirclingState::StraightFlight`] and
//! [`CirclingState::Circling`] always passes through
//! [`CirclingState::Transition`].

use core::fmt;

/// Flight regime as seen by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CirclingState {
    /// Low turn rate, straight or gently curved flight.
    #[default]
    StraightFlight,
    /// Entering or leaving a thermal circle.
    Transition,
    /// Sustained turning.
    Circling,
}

impl fmt::Display for CirclingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StraightFlight => "straight flight",
            Self::Transition => "transition",
            Self::Circling => "circling",
        };
        f.write_str(name)
    }
}

/// Thresholds of the circling classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CirclingParameters {
    /// Turn rate magnitude in rad/s above which a sample counts towards
    /// circling.
    pub high_turn_rate: f32,
    /// Turn rate magnitude in rad/s below which a sample counts towards
    /// straight flight. Must be below [`Self::high_turn_rate`].
    pub low_turn_rate: f32,
    /// Consecutive samples beyond a threshold needed to advance the state.
    pub hysteresis_samples: u32,
}

impl Default for CirclingParameters {
    fn default() -> Self {
        Self {
            high_turn_rate: 0.15,
            low_turn_rate: 0.07,
            hysteresis_samples: 200,
        }
    }
}

/// Debounced three-state classifier.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CirclingClassifier {
    parameters: CirclingParameters,
    state: CirclingState,
    /// Positive: consecutive samples above the high threshold.
    /// Negative: consecutive samples below the low threshold.
    circling_counter: i64,
}

impl CirclingClassifier {
    /// Creates a classifier in [`CirclingState::StraightFlight`].
    #[must_use]
    pub fn new(parameters: CirclingParameters) -> Self {
        Self {
            parameters,
            state: CirclingState::StraightFlight,
            circling_counter: 0,
        }
    }

    /// The current flight regime.
    #[must_use]
    pub fn state(&self) -> CirclingState {
        self.state
    }

    /// The signed hysteresis counter, see the field documentation.
    #[must_use]
    pub fn counter(&self) -> i64 {
        self.circling_counter
    }

    /// Feeds one smoothed turn rate sample in rad/s (either sign) and returns
    /// the possibly updated state.
    pub fn update(&mut self, turn_rate: f32) -> CirclingState {
        let magnitude = turn_rate.abs();

        if magnitude > self.parameters.high_turn_rate {
            self.circling_counter = self.circling_counter.max(0) + 1;
        } else if magnitude < self.parameters.low_turn_rate {
            self.circling_counter = self.circling_counter.min(0) - 1;
        } else {
            self.circling_counter = 0;
        }

        let window = i64::from(self.parameters.hysteresis_samples);
        let next = match self.state {
            CirclingState::StraightFlight if self.circling_counter >= window => {
                Some(CirclingState::Transition)
            }
            CirclingState::Transition if self.circling_counter >= window => {
                Some(CirclingState::Circling)
            }
            CirclingState::Transition if self.circling_counter <= -window => {
                Some(CirclingState::StraightFlight)
            }
            CirclingState::Circling if self.circling_counter <= -window => {
                Some(CirclingState::Transition)
            }
            _ => None,
        };

        if let Some(next) = next {
            crate::log_debug!("circling state: {} -> {}", self.state, next);
            self.state = next;
            self.circling_counter = 0;
        }

        self.state
    }

    /// Returns to straight flight and clears the counter.
    pub fn reset(&mut self) {
        self.state = CirclingState::StraightFlight;
        self.circling_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const WINDOW: u32 = 10;

    #[fixture]
    fn classifier() -> CirclingClassifier {
        CirclingClassifier::new(CirclingParameters {
            high_turn_rate: 0.2,
            low_turn_rate: 0.1,
            hysteresis_samples: WINDOW,
        })
    }

    fn feed(classifier: &mut CirclingClassifier, turn_rate: f32, samples: u32) -> Vec<CirclingState> {
        (0..samples).map(|_| classifier.update(turn_rate)).collect()
    }

    fn distinct(states: &[CirclingState]) -> Vec<CirclingState> {
        let mut out: Vec<CirclingState> = Vec::new();
        for state in states {
            if out.last() != Some(state) {
                out.push(*state);
            }
        }
        out
    }

    #[rstest]
    fn step_enters_circling_through_transition(mut classifier: CirclingClassifier) {
        let mut states = feed(&mut classifier, 0.0, 5);
        states.extend(feed(&mut classifier, 0.5, 3 * WINDOW));
        assert_eq!(
            distinct(&states),
            [
                CirclingState::StraightFlight,
                CirclingState::Transition,
                CirclingState::Circling
            ]
        );
        assert_eq!(states[5 + WINDOW as usize - 2], CirclingState::StraightFlight);
        assert_eq!(states[5 + WINDOW as usize - 1], CirclingState::Transition);
        assert_eq!(states[5 + 2 * WINDOW as usize - 1], CirclingState::Circling);
    }

    #[rstest]
    fn negative_turn_rate_counts_as_well(mut classifier: CirclingClassifier) {
        feed(&mut classifier, -0.5, 2 * WINDOW);
        assert_eq!(classifier.state(), CirclingState::Circling);
    }

    #[rstest]
    fn short_spike_causes_no_transition(mut classifier: CirclingClassifier) {
        for _ in 0..5 {
            let states = feed(&mut classifier, 1.0, WINDOW - 1);
            assert!(states.iter().all(|s| *s == CirclingState::StraightFlight));
            feed(&mut classifier, 0.0, 1);
        }
        assert_eq!(classifier.state(), CirclingState::StraightFlight);
    }

    #[rstest]
    fn leaves_circling_through_transition(mut classifier: CirclingClassifier) {
        feed(&mut classifier, 0.5, 2 * WINDOW);
        assert_eq!(classifier.state(), CirclingState::Circling);

        let states = feed(&mut classifier, 0.0, 2 * WINDOW);
        assert_eq!(
            distinct(&states),
            [
                CirclingState::Circling,
                CirclingState::Transition,
                CirclingState::StraightFlight
            ]
        );
    }

    #[rstest]
    fn dead_band_resets_the_counter(mut classifier: CirclingClassifier) {
        feed(&mut classifier, 0.5, WINDOW - 1);
        assert_eq!(classifier.counter(), i64::from(WINDOW) - 1);
        classifier.update(0.15);
        assert_eq!(classifier.counter(), 0);
        feed(&mut classifier, 0.5, WINDOW - 1);
        assert_eq!(classifier.state(), CirclingState::StraightFlight);
    }

    #[rstest]
    fn transition_can_fall_back(mut classifier: CirclingClassifier) {
        feed(&mut classifier, 0.5, WINDOW);
        assert_eq!(classifier.state(), CirclingState::Transition);
        feed(&mut classifier, 0.0, WINDOW);
        assert_eq!(classifier.state(), CirclingState::StraightFlight);

        classifier.reset();
        assert_eq!(classifier.counter(), 0);
    }
}
