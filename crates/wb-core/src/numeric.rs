use crate::WbError;

/// Floating point type used throughout system
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, WbError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(WbError::NonFinite { what, value: v })
    }
}

/// Finite and >= 0. Volumes, areas and depths all go through this.
pub fn ensure_non_negative(v: Real, what: &'static str) -> Result<Real, WbError> {
    let v = ensure_finite(v, what)?;
    if v < 0.0 {
        return Err(WbError::Negative { what, value: v });
    }
    Ok(v)
}

/// Percentage of `part` in `whole`, zero when `whole` is not positive.
pub fn percent_of(part: Real, whole: Real) -> Real {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
