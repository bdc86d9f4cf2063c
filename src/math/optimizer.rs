// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Guiding traits to implement iterative optimization algorithms.

use log::trace;

/// Enum used to indicate if iterations should continue or stop.
/// Must be returned by the `stop_criterion` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    /// Stop iterations.
    Stop,
    /// Continue iterations.
    Forward,
}

/// A `State<Observations, EvalState, Model, Error>`
/// is capable of iteratively minimizing an energy function,
/// if provided few functions that are evaluated during iterations.
///
/// It is merely a skeleton for any iterative optimizer.
///
/// * `Observations`: the data used as reference during energy evaluations.
/// * `EvalState`: partially or fully evaluated new state.
///   Useful to short-circuit the computation of everything needed in the full state
///   in cases where we know that we are going to backtrack
///   (for example if the new energy is higher than the previous one).
/// * `Model`: the model of what you are trying to optimize.
/// * `Error`: returned when a step cannot be computed.
pub trait State<Observations, EvalState, Model, Error>
where
    Self: Sized,
{
    /// Initialize the optimizer state.
    fn init(obs: &Observations, model: Model) -> Self;

    /// Computes the iteration step from the current optimizer state.
    /// In case of error, iterations are stopped and `iterative_solve` also returns that error.
    fn step(&self) -> Result<Model, Error>;

    /// Evaluates the model.
    /// You might want to short-circuit evaluation of a full new state depending on your usage.
    /// This is why it returns an `EvalState` and not `Self`.
    fn eval(&self, obs: &Observations, new_model: Model) -> EvalState;

    /// Function deciding if iterations should continue.
    /// Also returns the state that will be used for next iteration, or returned if we stop.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue);

    /// Iteratively solve your optimization problem,
    /// with the provided functions by the trait implementation.
    /// Returns the final state and the number of iterations.
    fn iterative_solve(obs: &Observations, initial_model: Model) -> Result<(Self, usize), Error> {
        let mut state = Self::init(obs, initial_model);
        let mut nb_iter = 0;
        loop {
            nb_iter += 1;
            let new_model = state.step()?;
            let eval_state = state.eval(obs, new_model);
            let (kept_state, continuation) = state.stop_criterion(nb_iter, eval_state);
            state = kept_state;
            if let Continue::Stop = continuation {
                trace!("optimizer stopped after {} iterations", nb_iter);
                return Ok((state, nb_iter));
            }
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {
    use super::*;

    /// Newton iterations on `(x - target)^2`, with a fixed budget.
    struct Newton {
        x: f64,
        target: f64,
    }

    impl State<f64, f64, f64, String> for Newton {
        fn init(target: &f64, x: f64) -> Self {
            Newton { x, target: *target }
        }

        fn step(&self) -> Result<f64, String> {
            if self.x.is_finite() {
                Ok(self.x - (self.x - self.target))
            } else {
                Err("diverged".to_string())
            }
        }

        fn eval(&self, _: &f64, new_model: f64) -> f64 {
            new_model
        }

        fn stop_criterion(self, nb_iter: usize, x: f64) -> (Self, Continue) {
            let continuation = if nb_iter >= 3 {
                Continue::Stop
            } else {
                Continue::Forward
            };
            (Newton { x, ..self }, continuation)
        }
    }

    #[test]
    fn iterations_stop_at_the_criterion() {
        let (state, nb_iter) = Newton::iterative_solve(&2.5, -4.0).unwrap();
        assert_eq!(nb_iter, 3);
        assert_eq!(state.x, 2.5);
    }

    #[test]
    fn step_errors_are_returned() {
        assert!(Newton::iterative_solve(&2.5, f64::NAN).is_err());
    }
}
