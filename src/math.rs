//! Core math functions for the synthesis.
//! If the `libm` feature is enabled, this just exports the required functions.
//! If the `std` feature is enabled, this converts the syntax from the std variety: `f.sqrt()` into
//! the `libm` equiv. `sqrtf(f)`.

#[cfg(feature = "libm")]
pub(crate) use libm::{cosf, expf, powf, sqrtf};

#[cfg(feature = "std")]
pub(crate) fn sqrtf(f: f32) -> f32 {
    f.sqrt()
}
#[cfg(feature = "std")]
pub(crate) fn powf(f1: f32, f2: f32) -> f32 {
    f1.powf(f2)
}
#[cfg(feature = "std")]
pub(crate) fn cosf(f: f32) -> f32 {
    f.cos()
}
#[cfg(feature = "std")]
pub(crate) fn expf(f: f32) -> f32 {
    f.exp()
}
