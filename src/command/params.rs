//! Command payload parsing
//!
//! A control payload is `"<COMMAND> <param1> <param2> ..."`: tokens separated
//! by spaces or newlines, the first token naming the command.

use tracing::debug;
use tracker_shared::{FrameworkError, FrameworkResult};

/// Split a payload into its ordered tokens
pub fn tokenize(payload: &str) -> Vec<String> {
    payload
        .split(|c| c == ' ' || c == '\n' || c == '\r')
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Integer parameter at `index`, or `default` when absent or malformed
///
/// Range checking is left to the handler; an out-of-range value is returned
/// as parsed.
pub fn int_param(tokens: &[String], index: usize, min: i32, max: i32, default: i32) -> i32 {
    let Some(token) = tokens.get(index) else {
        return default;
    };

    match token.parse::<i32>() {
        Ok(value) => {
            if value < min || value > max {
                debug!("parameter {} = {} is outside {}..={}", index, value, min, max);
            }
            value
        }
        Err(_) => {
            debug!("parameter {} '{}' is not an integer, using {}", index, token, default);
            default
        }
    }
}

/// Reject `value` unless it lies within `min..=max`
pub fn validate_range(name: &str, value: i32, min: i32, max: i32) -> FrameworkResult<i32> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(FrameworkError::validation(format!(
            "{} {} is outside {}..={}",
            name, value, min, max
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(payload: &str) -> Vec<String> {
        tokenize(payload)
    }

    #[test]
    fn test_tokenize_splits_on_space_and_newline() {
        assert_eq!(
            tokens("START_TASK 10\n"),
            vec!["START_TASK".to_string(), "10".to_string()]
        );
        assert_eq!(tokens("A  B\nC"), vec!["A", "B", "C"]);
        assert!(tokens("").is_empty());
        assert!(tokens(" \n ").is_empty());
    }

    #[test]
    fn test_int_param_fallbacks() {
        let t = tokens("SET_DWELL_TIME abc");
        assert_eq!(int_param(&t, 1, 5000, 60000, 30000), 30000);
        assert_eq!(int_param(&t, 2, 5000, 60000, 30000), 30000);
    }

    #[test]
    fn test_int_param_leaves_range_to_caller() {
        let t = tokens("SET_DWELL_TIME 1");
        assert_eq!(int_param(&t, 1, 5000, 60000, 30000), 1);

        let t = tokens("SET_DWELL_TIME -45000");
        assert_eq!(int_param(&t, 1, 5000, 60000, 30000), -45000);
    }

    #[test]
    fn test_validate_range() {
        assert_eq!(validate_range("dwell", 45000, 5000, 60000).unwrap(), 45000);
        assert!(matches!(
            validate_range("dwell", 1, 5000, 60000),
            Err(FrameworkError::Validation(_))
        ));
        assert!(validate_range("dwell", 60001, 5000, 60000).is_err());
    }
}
