//! Reconciles estimated message token counts with provider-reported usage.

use std::collections::HashMap;

/// Derive the token cost of the newest message from the provider's input count.
///
/// `token_count_map` holds the estimated count of every message sent with the
/// request, including `current_message_id`. The provider's input total minus
/// the other messages' estimates is the current message's actual cost. When
/// no usage was reported, or the derivation is not positive, the estimate for
/// the current message is returned unchanged.
pub fn calculate_current_token_count(
    token_count_map: &HashMap<String, u32>,
    current_message_id: &str,
    input_tokens: Option<u64>,
) -> u32 {
    let estimate = token_count_map.get(current_message_id).copied().unwrap_or(0);

    let Some(input_tokens) = input_tokens else {
        return estimate;
    };

    let others: i64 = token_count_map
        .iter()
        .filter(|(id, _)| id.as_str() != current_message_id)
        .map(|(_, count)| i64::from(*count))
        .sum();

    let derived = i64::try_from(input_tokens).unwrap_or(i64::MAX) - others;
    if derived > 0 {
        u32::try_from(derived).unwrap_or(u32::MAX)
    } else {
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, u32)]) -> HashMap<String, u32> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn derives_current_message_from_usage() {
        let counts = map(&[("a", 10), ("b", 20), ("current", 5)]);
        assert_eq!(calculate_current_token_count(&counts, "current", Some(42)), 12);
    }

    #[test]
    fn falls_back_to_estimate_without_usage() {
        let counts = map(&[("a", 10), ("current", 5)]);
        assert_eq!(calculate_current_token_count(&counts, "current", None), 5);
    }

    #[test]
    fn falls_back_to_estimate_when_derivation_not_positive() {
        let counts = map(&[("a", 50), ("current", 5)]);
        assert_eq!(calculate_current_token_count(&counts, "current", Some(40)), 5);
        assert_eq!(calculate_current_token_count(&counts, "current", Some(50)), 5);
    }

    #[test]
    fn unknown_message_estimates_zero() {
        let counts = map(&[("a", 50)]);
        assert_eq!(calculate_current_token_count(&counts, "missing", None), 0);
        assert_eq!(calculate_current_token_count(&counts, "missing", Some(60)), 10);
    }
}
