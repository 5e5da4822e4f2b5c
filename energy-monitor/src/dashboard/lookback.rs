use serde::Serialize;

pub const DEFAULT_LOOKBACK_MINUTES: u32 = 15;
pub const MAX_AUTO_REFRESH_MINUTES: u32 = 60;

/// A resolved lookback field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lookback {
    pub minutes: u32,
    /// False once the window is long enough that the chart should stop
    /// refreshing on its own.
    pub auto_refresh: bool,
}

/// Parse the lookback field as a whole number of minutes.
///
/// Only an optionally signed run of ASCII digits is accepted. Anything else,
/// including expressions like `5*2`, and any value `<= 0` gives `default`.
pub fn parse_minutes(input: &str, default: u32) -> u32 {
    match input.trim().parse::<i64>() {
        Ok(minutes) if minutes > 0 => u32::try_from(minutes).unwrap_or(u32::MAX),
        _ => default,
    }
}

pub fn resolve(input: &str, default: u32, max_auto_refresh: u32) -> Lookback {
    let minutes = parse_minutes(input, default);
    Lookback {
        minutes,
        auto_refresh: minutes <= max_auto_refresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_default(input: &str) -> Lookback {
        resolve(input, DEFAULT_LOOKBACK_MINUTES, MAX_AUTO_REFRESH_MINUTES)
    }

    #[test]
    fn plain_numbers_are_honoured() {
        assert_eq!(resolve_default("15"), Lookback { minutes: 15, auto_refresh: true });
        assert_eq!(resolve_default(" 60 "), Lookback { minutes: 60, auto_refresh: true });
        assert_eq!(resolve_default("+5"), Lookback { minutes: 5, auto_refresh: true });
    }

    #[test]
    fn non_positive_and_garbage_fall_back() {
        for input in ["0", "-5", "", "abc", "5*2", "2.5", "1e3", "__import__('os')"] {
            assert_eq!(parse_minutes(input, 15), 15, "input {input:?}");
        }
    }

    #[test]
    fn long_lookback_disables_auto_refresh() {
        assert_eq!(resolve_default("75"), Lookback { minutes: 75, auto_refresh: false });
        assert!(!resolve_default("61").auto_refresh);
    }

    #[test]
    fn huge_values_saturate() {
        assert_eq!(parse_minutes("99999999999", 15), u32::MAX);
    }
}
