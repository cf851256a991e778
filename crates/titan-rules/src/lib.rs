//! Composable pre-action validation.
//!
//! A rule is `validate(context) -> ok | violation(reason)`. Rules are pure
//! with respect to the context they receive: a rule never reaches back into
//! storage or another cell — the caller preloads whatever the rule needs.
//! A cell composes its rules into a [`RuleChain`] in a fixed order for a
//! given operation and runs the whole chain before committing any state
//! change.

use titan_primitives::TitanError;

/// One named validator over a context type `Ctx`.
pub trait Rule<Ctx>: Send + Sync {
    /// A short, stable name used to identify which rule rejected a call.
    fn name(&self) -> &'static str;

    fn validate(&self, ctx: &Ctx) -> Result<(), String>;
}

/// A composed, ordered sequence of rules for one operation. Evaluation stops
/// at the first violation.
pub struct RuleChain<Ctx> {
    rules: Vec<Box<dyn Rule<Ctx>>>,
}

impl<Ctx> Default for RuleChain<Ctx> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<Ctx> RuleChain<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, rule: impl Rule<Ctx> + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Runs every rule in declaration order, returning the first violation.
    pub fn validate(&self, ctx: &Ctx) -> Result<(), TitanError> {
        for rule in &self.rules {
            if let Err(reason) = rule.validate(ctx) {
                return Err(TitanError::forbidden(format!("{}: {reason}", rule.name())));
            }
        }
        Ok(())
    }
}
