//! Small logging helper macros, in the same spirit as the reference service's
//! `macros.rs`: thin wrappers over `log::*` that keep call sites short.

#[macro_export]
macro_rules! full_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_return_err {
    ( $e:expr ) => {{
        log::error!("\t{}\n {:#?}", $e, $e);
        return Err($e);
    }};
}
