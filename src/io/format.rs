//! Nice tdrdm output formatting.

use std::fmt;

use log;

const TDRDM_BANNER_LENGTH: usize = 103;

/// Logs an error to the `tdrdm-output` logger.
macro_rules! tdrdm_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "tdrdm-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `tdrdm-output` logger.
macro_rules! tdrdm_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "tdrdm-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `tdrdm-output` logger.
macro_rules! tdrdm_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "tdrdm-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {tdrdm_error, tdrdm_output, tdrdm_warn};

/// Logs a nicely formatted section title to the `tdrdm-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(TDRDM_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    tdrdm_output!("┌──{bar}──┐");
    tdrdm_output!("│§ {title:^length$} §│");
    tdrdm_output!("└──{bar}──┘");
}

/// Logs a nicely formatted subtitle to the `tdrdm-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    tdrdm_output!("{}", subtitle);
    tdrdm_output!("{}", bar);
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging tdrdm outputs nicely.
pub(crate) trait TdRdmOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            tdrdm_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> TdRdmOutput for T where T: fmt::Debug + fmt::Display {}
