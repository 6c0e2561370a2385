/// Quotes the total for a reservation: the package price covers the booking
/// user, and each named traveler adds one more full share.
///
/// `total = price * (1 + travelers)`, so a solo booking pays exactly the
/// package price.
pub fn quote_total(price_cents: i64, traveler_count: usize) -> i64 {
    price_cents * (1 + traveler_count as i64)
}
