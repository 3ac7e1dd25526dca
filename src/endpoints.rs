//! The API endpoints URIs.
//!
//! For endpoints that take an ID, e.g., '/api/cartoes/{card_id}', use [format_endpoint].

/// The route for creating a new user.
pub const REGISTER: &str = "/api/auth/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/api/auth/login";
/// The route for fetching the logged in user.
pub const CURRENT_USER: &str = "/api/auth/me";

/// The route to list and create cards.
pub const CARDS: &str = "/api/cartoes";
/// The route to access a single card.
pub const CARD: &str = "/api/cartoes/{card_id}";
/// The route for a card's used limit and invoices.
pub const CARD_SUMMARY: &str = "/api/cartoes/{card_id}/resumo";

/// The route to list and create invoices.
pub const INVOICES: &str = "/api/faturas";
/// The route to access a single invoice.
pub const INVOICE: &str = "/api/faturas/{invoice_id}";
/// The route to reset an invoice's total to the sum of its expenses.
pub const INVOICE_RECALCULATE: &str = "/api/faturas/{invoice_id}/recalcular";
/// The route to list the invoices of a card.
pub const CARD_INVOICES: &str = "/api/faturas/cartao/{card_id}";

/// The route to list and create expenses.
pub const EXPENSES: &str = "/api/despesas";
/// The route to access a single expense.
pub const EXPENSE: &str = "/api/despesas/{expense_id}";
/// The route to create a purchase split into installments.
pub const INSTALLMENT_PURCHASE: &str = "/api/despesas/parcelada";

/// The route to list and create income.
pub const INCOME: &str = "/api/receitas";
/// The route to access a single income entry.
pub const INCOME_ENTRY: &str = "/api/receitas/{income_id}";

/// The route to list and create investments.
pub const INVESTMENTS: &str = "/api/investimentos";
/// The route to access a single investment.
pub const INVESTMENT: &str = "/api/investimentos/{investment_id}";
/// The route for the totals across all investments.
pub const INVESTMENT_SUMMARY: &str = "/api/investimentos/resumo";

/// The route for the user's settings.
pub const SETTINGS: &str = "/api/configuracoes";

/// The route for the monthly dashboard.
pub const DASHBOARD: &str = "/api/dashboard";
/// The route for the month by month totals of a year.
pub const DASHBOARD_HISTORY: &str = "/api/dashboard/historico";

/// The route to upload CSV files of expenses or income.
pub const IMPORT: &str = "/api/import/{kind}";
/// The route to download expenses or income as CSV.
pub const EXPORT: &str = "/api/export/{kind}";

/// The route for alerts about overdue invoices and card limits.
pub const NOTIFICATIONS: &str = "/api/notificacoes";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/api/cartoes/{card_id}', '{card_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: impl std::fmt::Display) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|offset| param_start + offset + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        for endpoint in [
            endpoints::REGISTER,
            endpoints::LOG_IN,
            endpoints::CURRENT_USER,
            endpoints::CARDS,
            endpoints::CARD,
            endpoints::CARD_SUMMARY,
            endpoints::INVOICES,
            endpoints::INVOICE,
            endpoints::INVOICE_RECALCULATE,
            endpoints::CARD_INVOICES,
            endpoints::EXPENSES,
            endpoints::EXPENSE,
            endpoints::INSTALLMENT_PURCHASE,
            endpoints::INCOME,
            endpoints::INCOME_ENTRY,
            endpoints::INVESTMENTS,
            endpoints::INVESTMENT,
            endpoints::INVESTMENT_SUMMARY,
            endpoints::SETTINGS,
            endpoints::DASHBOARD,
            endpoints::DASHBOARD_HISTORY,
            endpoints::IMPORT,
            endpoints::EXPORT,
            endpoints::NOTIFICATIONS,
        ] {
            assert_endpoint_is_valid_uri(endpoint);
        }
    }

    #[test]
    fn produces_valid_uri() {
        let formatted_path = format_endpoint("/hello/{world_id}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn accepts_string_parameters() {
        let formatted_path = format_endpoint(endpoints::EXPORT, "despesas");

        assert_eq!(formatted_path, "/api/export/despesas");
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint("/hello/world", 1);

        assert_eq!(formatted_path, "/hello/world");
    }

    #[test]
    fn parameter_in_middle() {
        let formatted_path = format_endpoint(endpoints::CARD_SUMMARY, 3);

        assert_eq!(formatted_path, "/api/cartoes/3/resumo");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }
}
