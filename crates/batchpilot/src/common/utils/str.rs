use std::borrow::Cow;

/// Return the input string with an added "s" at the end if `count` is not one.
pub fn pluralize(value: &str, count: usize) -> Cow<'_, str> {
    if count == 1 {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("{value}s"))
    }
}

/// Quotes `value` for a POSIX shell, so that it is passed as a single argument.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use crate::common::utils::str::{pluralize, shell_quote};

    #[test]
    fn pluralize_counts() {
        assert_eq!(pluralize("node", 0), "nodes");
        assert_eq!(pluralize("node", 1), "node");
        assert_eq!(pluralize("node", 3), "nodes");
    }

    #[test]
    fn shell_quote_plain() {
        assert_eq!(shell_quote("make all"), "'make all'");
    }

    #[test]
    fn shell_quote_embedded_quote() {
        assert_eq!(shell_quote("echo 'x'"), r"'echo '\''x'\'''");
    }
}
