use crate::domain::metric::round_dp;
use crate::error::SimsError;
use rust_decimal::Decimal;

/// `(current - reference) / reference * 100`, rounded half-up to 2 decimal places.
pub fn percent_change(current: Decimal, reference: Decimal) -> Result<Decimal, SimsError> {
    if reference.is_zero() {
        return Err(SimsError::DivisionUndefined);
    }
    let ratio = (current - reference)
        .checked_div(reference)
        .ok_or(SimsError::DivisionUndefined)?;
    Ok(round_dp(ratio * Decimal::ONE_HUNDRED))
}
