//! Text normalization applied identically to corpus records and questions.

/// Signature shared by every cleaning function the engine accepts.
pub type Cleaner = fn(&str) -> String;

/// Replace control characters with spaces, collapse whitespace runs and trim.
///
/// Case is preserved so cleaned text can be shown back to users.
pub fn clean(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
