//! Usage metadata record: produced by an adapter once per call, consumed
//! by an optional user callback exactly once per call.

/// Token accounting for a single provider call. `model` is the provider's
/// own identifier string, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageMetadata {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub model: String,
}

impl UsageMetadata {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, model: impl Into<String>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            model: model.into(),
        }
    }
}

/// Invoked exactly once per call, after the call completes successfully.
/// A failed call never invokes it.
pub type UsageCallback = Box<dyn Fn(&UsageMetadata) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_the_sum_of_prompt_and_completion() {
        let usage = UsageMetadata::new(120, 30, "test-model");
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.model, "test-model");
    }
}
