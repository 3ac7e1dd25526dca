//! Rounding and display of amounts in reais.

use std::sync::OnceLock;

use numfmt::{Formatter, Precision};

/// Round `value` to the nearest cent.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Convert `value` to a whole number of cents.
pub fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Format `amount` the Brazilian way, e.g. "R$ 1.234,50" or "-R$ 12,00".
pub fn format_brl(amount: f64) -> String {
    static POSITIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let positive_fmt = POSITIVE_FMT.get_or_init(|| {
        Formatter::currency("R$ ")
            .expect("valid currency prefix")
            .precision(Precision::Decimals(2))
    });

    static NEGATIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let negative_fmt = NEGATIVE_FMT.get_or_init(|| {
        Formatter::currency("-R$ ")
            .expect("valid currency prefix")
            .precision(Precision::Decimals(2))
    });

    let amount = round_to_cents(amount);
    // numfmt writes zero as "0" without the prefix.
    let formatted = if amount < 0.0 {
        negative_fmt.fmt_string(amount.abs())
    } else if amount > 0.0 {
        positive_fmt.fmt_string(amount)
    } else {
        return "R$ 0,00".to_owned();
    };

    to_brazilian_separators(&formatted)
}

/// Swap "1,234.5" style separators for "1.234,50", padding to two decimals.
///
/// numfmt drops trailing zeros, so "12.30" arrives as "12.3" and "12.00" as "12".
fn to_brazilian_separators(formatted: &str) -> String {
    let mut swapped: String = formatted
        .chars()
        .map(|c| match c {
            ',' => '.',
            '.' => ',',
            other => other,
        })
        .collect();

    match swapped.rfind(',') {
        Some(index) => {
            let decimals = swapped.len() - index - 1;
            swapped.extend(std::iter::repeat_n('0', 2usize.saturating_sub(decimals)));
        }
        None => swapped.push_str(",00"),
    }

    swapped
}
