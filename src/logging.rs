//! Logging macros.
//!
//! - With the `defmt` feature: forwarded to `defmt`.
//! - Host unit tests: printed with a level prefix.
//! - Otherwise: no-op (arguments are still type-checked).
//!
//! The estimator only logs state changes, never once per sample. The macros
//! are crate private.

/// Log an informational message.
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        println!("[INFO] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = format_args!($($arg)*);
    }};
}

/// Log a warning.
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        println!("[WARN] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = format_args!($($arg)*);
    }};
}

/// Log a debug message.
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        println!("[DEBUG] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = format_args!($($arg)*);
    }};
}

pub(crate) use {log_debug, log_info, log_warn};

#[cfg(test)]
mod tests {
    #[test]
    fn macros_accept_format_arguments() {
        let samples = 3_u32;
        crate::log_info!("info {}", samples);
        crate::log_warn!("warn {} {}", samples, 0.5_f32);
        crate::log_debug!("debug");
    }
}
