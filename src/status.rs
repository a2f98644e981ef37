//! Canonical status-code text and error classification.
//!
//! Classification is purely textual: a status is an error when it is
//! exactly three characters long and starts with `4` or `5`. Malformed
//! input is never an error and never panics.

/// Status codes for which the page offers to retry automatically.
pub const AUTO_REFRESH_CODES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Returns `true` if `status` is a three-character code in the 4xx or 5xx class.
pub fn is_error_status(status: &str) -> bool {
    let bytes = status.as_bytes();
    bytes.len() == 3 && matches!(bytes[0], b'4' | b'5')
}

/// Returns `true` if `code` belongs to the fixed auto-refresh set.
pub fn is_auto_refresh(code: u16) -> bool {
    AUTO_REFRESH_CODES.contains(&code)
}

/// Accumulates the decimal digits of `status` into a code, skipping any
/// non-digit characters.
pub fn parse_status_digits(status: &str) -> u16 {
    status
        .bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u16, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u16::from(digit - b'0'))
        })
}

/// Returns the standard reason phrase for `code`, falling back to a
/// class-wide phrase for codes without an entry.
pub fn message(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        400..=499 => "Client Error",
        _ => "Server Error",
    }
}

/// Returns a one-sentence explanation for common codes, falling back to a
/// class-wide sentence otherwise.
pub fn description(code: u16) -> &'static str {
    match code {
        400 => "The request could not be understood by the server due to malformed syntax.",
        401 => "The request requires user authentication.",
        403 => "The server understood the request, but is refusing to fulfill it.",
        404 => "The requested resource could not be found.",
        405 => "The method specified in the request is not allowed for the resource.",
        408 => "The server timed out waiting for the request.",
        429 => "Too many requests have been sent in a given amount of time.",
        500 => {
            "The server encountered an unexpected condition that prevented it from fulfilling the request."
        }
        502 => "The server received an invalid response from the upstream server.",
        503 => {
            "The server is currently unable to handle the request due to temporary overloading or maintenance."
        }
        504 => "The server did not receive a timely response from the upstream server.",
        400..=499 => "An error occurred while processing your request.",
        _ => "The server encountered an error while processing your request.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_three_digit_code_by_first_digit() {
        for code in 100..=999u16 {
            let s = code.to_string();
            let expected = s.starts_with('4') || s.starts_with('5');
            assert_eq!(is_error_status(&s), expected, "status {s}");
        }
    }

    #[test]
    fn malformed_status_is_never_an_error() {
        for s in ["", "4", "40", "4040", " 404", "404 ", "5xxx"] {
            assert!(!is_error_status(s), "status {s:?}");
        }
        // Only the first character is inspected for three-character input.
        assert!(is_error_status("4ab"));
        assert!(!is_error_status("abc"));
    }

    #[test]
    fn parses_digits_and_skips_noise() {
        assert_eq!(parse_status_digits("503"), 503);
        assert_eq!(parse_status_digits("4x4"), 44);
        assert_eq!(parse_status_digits(""), 0);
        assert_eq!(parse_status_digits("99999999"), u16::MAX);
    }

    #[test]
    fn explicit_messages_match_exactly() {
        assert_eq!(message(404), "Not Found");
        assert_eq!(message(418), "I'm a teapot");
        assert_eq!(message(511), "Network Authentication Required");
    }

    #[test]
    fn unknown_codes_fall_back_by_class() {
        assert_eq!(message(499), "Client Error");
        assert_eq!(message(420), "Client Error");
        assert_eq!(message(599), "Server Error");
        assert_eq!(message(150), "Server Error");
        assert_eq!(
            description(410),
            "An error occurred while processing your request."
        );
        assert_eq!(
            description(507),
            "The server encountered an error while processing your request."
        );
    }

    #[test]
    fn explicit_descriptions_match_exactly() {
        assert_eq!(description(404), "The requested resource could not be found.");
        assert_eq!(
            description(502),
            "The server received an invalid response from the upstream server."
        );
    }

    #[test]
    fn auto_refresh_set_is_fixed() {
        for code in 100..=599u16 {
            let expected = matches!(code, 408 | 425 | 429 | 500 | 502 | 503 | 504);
            assert_eq!(is_auto_refresh(code), expected, "code {code}");
        }
    }
}
