//! Module containing utility macros for sharing in the crate.

/// Macro for instantiating a `HashMap`.
#[cfg(test)]
macro_rules! hash_map {
    ($($tt:tt)*) => {
        std_map!(<HashMap> $($tt)*)
    }
}

/// Implementation macro for instantiating a standard library map type like
/// `HashMap` or `BTreeMap`. Note that `ToOwned::to_owned` is called for keys,
/// so things like `str` keys automatically get turned into `String`s.
#[cfg(test)]
macro_rules! std_map {
    (<$t:ident> $( $key:expr => $value:expr ),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = std::collections::$t::new();
        $(
            map.insert(($key).to_owned(), $value);
        )*
        map
    }}
}

/// Macro for wrapping an already computed value in a boxed future, useful for
/// mock expectations on futures-returning traits.
#[cfg(test)]
macro_rules! immediate {
    ($expression:expr) => {{
        let value = $expression;
        futures::future::FutureExt::boxed(async move { value })
    }};
}
