//! Logging macros
//!
//! Routes crate-internal log statements to `defmt` on the target and to the
//! `log` facade on the host. With neither backend the arguments are still
//! evaluated by reference so that no `unused` warnings leak out.
//!
//! Format strings must stay within the subset both backends accept:
//! `{}` for integers and `{:?}` for enums.

#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "embedded")]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(all(feature = "std", not(feature = "embedded")))]
            ::log::trace!($s $(, $x)*);
            #[cfg(not(any(feature = "std", feature = "embedded")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "embedded")]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(all(feature = "std", not(feature = "embedded")))]
            ::log::debug!($s $(, $x)*);
            #[cfg(not(any(feature = "std", feature = "embedded")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "embedded")]
            ::defmt::info!($s $(, $x)*);
            #[cfg(all(feature = "std", not(feature = "embedded")))]
            ::log::info!($s $(, $x)*);
            #[cfg(not(any(feature = "std", feature = "embedded")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "embedded")]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(all(feature = "std", not(feature = "embedded")))]
            ::log::warn!($s $(, $x)*);
            #[cfg(not(any(feature = "std", feature = "embedded")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "embedded")]
            ::defmt::error!($s $(, $x)*);
            #[cfg(all(feature = "std", not(feature = "embedded")))]
            ::log::error!($s $(, $x)*);
            #[cfg(not(any(feature = "std", feature = "embedded")))]
            let _ = ($( & $x ),*);
        }
    };
}
