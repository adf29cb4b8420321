//! # Utility Functions Module
//!
//! Small helpers shared by the argument builders.

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// # Example
/// ```rust,ignore
/// let colors = 128;
/// let flags = to_string_vec(["--colors", &colors.to_string(), "--strip"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds a `Vec<String>` of command-line flags from mixed values.
///
/// # Example
/// ```rust,ignore
/// let flags = args![format!("--speed={}", 7), "--strip"];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

/// Last non-empty line of a tool's stderr, trimmed.
pub fn last_line(output: &[u8]) -> String {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}
