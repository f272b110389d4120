//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Limit a value to the closed range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Wrap an angle in degrees into the range `[0, 360)`.
pub fn wrap_deg_360<T>(angle_deg: T) -> T
where
    T: Float,
{
    let full_turn = T::from(360.0).unwrap_or_else(T::max_value);
    let wrapped = rem_euclid(angle_deg, full_turn);

    // Round-off in rem_euclid can land exactly on 360
    if wrapped >= full_turn {
        T::zero()
    } else {
        wrapped
    }
}

/// Get the signed shortest angular distance in degrees to turn from `current`
/// to `target`.
///
/// Computed as `((target - current + 180) mod 360) - 180` and reported in the
/// range `(-180, 180]`, so that a half turn is always given as `+180`. A
/// positive result means the shorter turn is in the direction of increasing
/// heading.
pub fn ang_err_deg<T>(target: T, current: T) -> T
where
    T: Float,
{
    let half_turn = T::from(180.0).unwrap_or_else(T::max_value);

    let err = wrap_deg_360(target - current + half_turn) - half_turn;

    if err <= -half_turn {
        half_turn
    } else {
        err
    }
}
