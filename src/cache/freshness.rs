//! Freshness metadata: ETags and HTTP-date handling.

use sha2::{Digest, Sha256};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// IMF-fixdate, the HTTP-date format clients send back verbatim.
const HTTP_DATE: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Strong ETag for a response body: quoted hex SHA-256 of the bytes.
pub fn compute_etag(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

/// Format a timestamp as an HTTP-date (second precision, always GMT).
pub fn http_date(moment: OffsetDateTime) -> String {
    moment
        .to_offset(UtcOffset::UTC)
        .format(&HTTP_DATE)
        .unwrap_or_else(|_| String::new())
}

/// Parse an HTTP-date; `None` for anything that is not an IMF-fixdate.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), &HTTP_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Whether a response whose stored Last-Modified is `stored` is still fresh
/// for a request carrying `If-Modified-Since: {header}`.
///
/// This is a date comparison, not string equality: the resource is
/// unmodified when its Last-Modified is not later than the client's date.
/// Unparseable dates on either side never match, which degrades to a plain
/// cache miss.
pub fn not_modified_since(stored: &str, header: &str) -> bool {
    match (parse_http_date(stored), parse_http_date(header)) {
        (Some(stored_at), Some(since)) => stored_at <= since,
        _ => false,
    }
}
