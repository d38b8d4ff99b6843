//! Given-When-Then harness for reducers.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use gigbook_core::{effect::Effect, reducer::Reducer, SmallVec};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use gigbook_testing::ReducerTest;
///
/// ReducerTest::new(ProfileReducer)
///     .with_env(test_env())
///     .given_state(draft_profile())
///     .when_action(ProfileAction::Publish { actor })
///     .then_state(|state| assert!(state.profile.published))
///     .then_effects(|effects| assert_eq!(effects.len(), 1))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When). Calling it repeatedly reduces the
    /// actions in order; effect assertions see the last action's effects.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    pub fn run(self) {
        let _ = self.run_into();
    }

    /// Run the assertions, then hand back the final state and the last
    /// action's effects so async tests can drive them further.
    ///
    /// # Panics
    ///
    /// Same as [`ReducerTest::run`].
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run_into(self) -> (S, SmallVec<[Effect<A>; 4]>) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");
        let env = self
            .environment
            .expect("Environment must be set with with_env()");
        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let mut effects = SmallVec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env);
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
        for assertion in self.effect_assertions {
            assertion(&effects);
        }

        (state, effects)
    }
}

/// Helper assertions for effects
pub mod assertions {
    use gigbook_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigbook_core::smallvec;

    #[derive(Clone, Debug, PartialEq)]
    enum Gig {
        Open,
        Held,
    }

    #[derive(Clone, Debug)]
    enum GigAction {
        Hold,
        Release,
        Held,
    }

    struct GigReducer;

    impl Reducer for GigReducer {
        type State = Gig;
        type Action = GigAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Gig,
            action: GigAction,
            _env: &(),
        ) -> SmallVec<[Effect<GigAction>; 4]> {
            match action {
                GigAction::Hold => {
                    *state = Gig::Held;
                    smallvec![Effect::send(GigAction::Held)]
                },
                GigAction::Release => {
                    *state = Gig::Open;
                    smallvec![Effect::None]
                },
                GigAction::Held => SmallVec::new(),
            }
        }
    }

    #[test]
    fn state_and_effect_assertions_run() {
        ReducerTest::new(GigReducer)
            .with_env(())
            .given_state(Gig::Open)
            .when_action(GigAction::Hold)
            .then_state(|state| assert_eq!(*state, Gig::Held))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn actions_reduce_in_order() {
        let (state, effects) = ReducerTest::new(GigReducer)
            .with_env(())
            .given_state(Gig::Open)
            .when_action(GigAction::Hold)
            .when_action(GigAction::Release)
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run_into();

        assert_eq!(state, Gig::Open);
        assertions::assert_effects_count(&effects, 1);
    }

    #[test]
    #[should_panic(expected = "Expected at least one Future effect")]
    fn missing_future_effect_fails() {
        ReducerTest::new(GigReducer)
            .with_env(())
            .given_state(Gig::Held)
            .when_action(GigAction::Release)
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }
}
