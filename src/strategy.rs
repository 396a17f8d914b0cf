//! Promotion strategy evaluation.

use serde::Serialize;

use crate::environment::{Environment, PromotionStrategy};

/// What the workflow should do for one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the environment may be mutated at all.
    pub proceed: bool,
    /// Whether the pull request should be flagged for automatic merging.
    pub auto_merge: bool,
    /// Whether to wait for the pull request to be merged.
    pub poll: bool,
}

impl Decision {
    pub const SKIP: Self = Self {
        proceed: false,
        auto_merge: false,
        poll: false,
    };
}

/// Evaluates an environment's declared strategy against invocation flags.
///
/// Pure: it only looks at the environment snapshot it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionStrategyEvaluator {
    no_poll: bool,
}

impl PromotionStrategyEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable auto-merge and polling for this invocation.
    ///
    /// The flag can only turn auto-merge off; it never turns it on for a
    /// manual environment. Manual environments still wait for a human merge
    /// unless it is set.
    pub fn no_poll(mut self, no_poll: bool) -> Self {
        self.no_poll = no_poll;
        self
    }

    pub fn evaluate(&self, environment: &Environment) -> Decision {
        match environment.promotion_strategy {
            PromotionStrategy::Never => Decision::SKIP,
            PromotionStrategy::Manual => Decision {
                proceed: true,
                auto_merge: false,
                poll: !self.no_poll,
            },
            PromotionStrategy::Automatic => Decision {
                proceed: true,
                auto_merge: !self.no_poll,
                poll: !self.no_poll,
            },
        }
    }
}
