#![doc = include_str!("../README.md")]
#![no_std]

/// Expands the first branch whose condition is active.
///
/// A condition is either a `#[cfg(...)]` attribute or the path of an alias
/// created by [`define_alias!`]. The `_` branch always matches and must come
/// last if present.
///
/// The macro must be used in item position.
///
/// # Examples
///
/// ```
/// dt_cfg::switch! {
///     #[cfg(unix)] => {
///         const FAMILY: &str = "unix";
///     }
///     #[cfg(windows)] => {
///         const FAMILY: &str = "windows";
///     }
///     _ => {
///         const FAMILY: &str = "other";
///     }
/// }
///
/// assert!(!FAMILY.is_empty());
/// ```
#[macro_export]
macro_rules! switch {
    ({ $($tt:tt)* }) => {{
        $crate::switch! { $($tt)* }
    }};
    (_ => { $($output:tt)* }) => {
        $($output)*
    };
    (
        $cond:path => $output:tt
        $($( $rest:tt )+)?
    ) => {
        $cond! {
            if {
                $crate::switch! { _ => $output }
            } else {
                $(
                    $crate::switch! { $($rest)+ }
                )?
            }
        }
    };
    (
        #[cfg($cfg:meta)] => $output:tt
        $($( $rest:tt )+)?
    ) => {
        #[cfg($cfg)]
        $crate::switch! { _ => $output }
        $(
            #[cfg(not($cfg))]
            $crate::switch! { $($rest)+ }
        )?
    };
}

/// Defines one alias macro per `#[cfg(...)] => name` pair.
///
/// Each alias expands its input when the condition holds and drops it
/// otherwise. Aliases also understand the `if { .. } else { .. }` form used
/// by [`switch!`].
///
/// # Examples
///
/// ```
/// mod cfg {
///     dt_cfg::define_alias! {
///         #[cfg(debug_assertions)] => debug,
///         #[cfg(not(debug_assertions))] => release,
///     }
/// }
///
/// cfg::debug! {
///     const MODE: &str = "debug";
/// }
/// cfg::release! {
///     const MODE: &str = "release";
/// }
///
/// assert!(!MODE.is_empty());
/// ```
#[macro_export]
macro_rules! define_alias {
    (
        #[cfg($meta:meta)] => $p:ident
        $(, $( $rest:tt )+)?
    ) => {
        $crate::define_alias! {
            #[cfg($meta)] => { $p }
            $(
                $($rest)+
            )?
        }
    };
    (
        #[cfg($meta:meta)] => $p:ident,
        $($( $rest:tt )+)?
    ) => {
        $crate::define_alias! {
            #[cfg($meta)] => { $p }
            $(
                $($rest)+
            )?
        }
    };
    (
        #[cfg($meta:meta)] => {
            $(#[$p_meta:meta])*
            $p:ident
        }
        $($( $rest:tt )+)?
    ) => {
        $crate::switch! {
            #[cfg($meta)] => {
                $(#[$p_meta])*
                #[doc(inline)]
                ///
                #[doc = concat!("Passes the provided code through, `#[cfg(", stringify!($meta), ")]` is active.")]
                pub use $crate::enabled as $p;
            }
            _ => {
                $(#[$p_meta])*
                #[doc(inline)]
                ///
                #[doc = concat!("Drops the provided code, `#[cfg(", stringify!($meta), ")]` is not active.")]
                pub use $crate::disabled as $p;
            }
        }

        $(
            $crate::define_alias! {
                $($rest)+
            }
        )?
    };
}

/// An alias that is always active.
///
/// `enabled!()` evaluates to `true`.
#[doc(hidden)]
#[macro_export]
macro_rules! enabled {
    () => { true };
    (if { $($p:tt)* } else { $($n:tt)* }) => { $($p)* };
    ($($p:tt)*) => { $($p)* };
}

/// An alias that is never active.
///
/// `disabled!()` evaluates to `false`.
#[doc(hidden)]
#[macro_export]
macro_rules! disabled {
    () => { false };
    (if { $($p:tt)* } else { $($n:tt)* }) => { $($n)* };
    ($($p:tt)*) => {};
}
