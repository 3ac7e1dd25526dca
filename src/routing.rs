//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppState, Error,
    auth::{auth_guard, get_current_user, post_log_in, register_user},
    card::{
        create_card_endpoint, delete_card_endpoint, get_card_endpoint, get_card_summary_endpoint,
        list_cards_endpoint, update_card_endpoint,
    },
    csv_import::import_records_endpoint,
    dashboard::{get_dashboard_endpoint, get_history_endpoint},
    endpoints,
    expense::{
        create_expense_endpoint, create_installment_purchase_endpoint, delete_expense_endpoint,
        get_expense_endpoint, list_expenses_endpoint, update_expense_endpoint,
    },
    export::export_records_endpoint,
    income::{
        create_income_endpoint, delete_income_endpoint, get_income_endpoint, list_income_endpoint,
        update_income_endpoint,
    },
    investment::{
        create_investment_endpoint, delete_investment_endpoint, get_investment_endpoint,
        get_investment_summary_endpoint, list_investments_endpoint, update_investment_endpoint,
    },
    invoice::{
        create_invoice_endpoint, delete_invoice_endpoint, get_invoice_endpoint,
        list_card_invoices_endpoint, list_invoices_endpoint, recalculate_invoice_endpoint,
        update_invoice_endpoint,
    },
    notifications::get_notifications_endpoint,
    settings::{get_settings_endpoint, update_settings_endpoint},
};

/// Return a router with all the app's routes.
///
/// Every route except registration and log in requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::LOG_IN, post(post_log_in));

    let protected_routes = Router::new()
        .route(endpoints::CURRENT_USER, get(get_current_user))
        .route(
            endpoints::CARDS,
            get(list_cards_endpoint).post(create_card_endpoint),
        )
        .route(
            endpoints::CARD,
            get(get_card_endpoint)
                .put(update_card_endpoint)
                .delete(delete_card_endpoint),
        )
        .route(endpoints::CARD_SUMMARY, get(get_card_summary_endpoint))
        .route(
            endpoints::INVOICES,
            get(list_invoices_endpoint).post(create_invoice_endpoint),
        )
        .route(
            endpoints::INVOICE,
            get(get_invoice_endpoint)
                .put(update_invoice_endpoint)
                .delete(delete_invoice_endpoint),
        )
        .route(
            endpoints::INVOICE_RECALCULATE,
            post(recalculate_invoice_endpoint),
        )
        .route(endpoints::CARD_INVOICES, get(list_card_invoices_endpoint))
        .route(
            endpoints::EXPENSES,
            get(list_expenses_endpoint).post(create_expense_endpoint),
        )
        .route(
            endpoints::INSTALLMENT_PURCHASE,
            post(create_installment_purchase_endpoint),
        )
        .route(
            endpoints::EXPENSE,
            get(get_expense_endpoint)
                .put(update_expense_endpoint)
                .delete(delete_expense_endpoint),
        )
        .route(
            endpoints::INCOME,
            get(list_income_endpoint).post(create_income_endpoint),
        )
        .route(
            endpoints::INCOME_ENTRY,
            get(get_income_endpoint)
                .put(update_income_endpoint)
                .delete(delete_income_endpoint),
        )
        .route(
            endpoints::INVESTMENTS,
            get(list_investments_endpoint).post(create_investment_endpoint),
        )
        .route(
            endpoints::INVESTMENT_SUMMARY,
            get(get_investment_summary_endpoint),
        )
        .route(
            endpoints::INVESTMENT,
            get(get_investment_endpoint)
                .put(update_investment_endpoint)
                .delete(delete_investment_endpoint),
        )
        .route(
            endpoints::SETTINGS,
            get(get_settings_endpoint).put(update_settings_endpoint),
        )
        .route(endpoints::DASHBOARD, get(get_dashboard_endpoint))
        .route(endpoints::DASHBOARD_HISTORY, get(get_history_endpoint))
        .route(endpoints::IMPORT, post(import_records_endpoint))
        .route(endpoints::EXPORT, get(export_records_endpoint))
        .route(endpoints::NOTIFICATIONS, get(get_notifications_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .layer(cors)
        .with_state(state)
}

async fn get_404_not_found() -> Error {
    Error::NotFound
}
