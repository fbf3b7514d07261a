#[cfg(test)]
mod tests {
    use super::super::logging::{DEFAULT_FILTER, VERBOSE_FILTER, filter_directive, init_logging};

    #[test]
    fn test_logging_initialization_is_repeatable() {
        init_logging(false);
        init_logging(true);
    }

    #[test]
    fn test_filter_directive_precedence() {
        assert_eq!(filter_directive(false, None), DEFAULT_FILTER);
        assert_eq!(filter_directive(false, Some("  ")), DEFAULT_FILTER);
        assert_eq!(filter_directive(false, Some("lumeai=warn")), "lumeai=warn");
        assert_eq!(filter_directive(true, Some("lumeai=warn")), VERBOSE_FILTER);
    }
}
