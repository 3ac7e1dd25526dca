mod core;
mod endpoints;
mod installments;

pub use core::{
    Expense, ExpenseFilter, ExpenseForm, ExpenseKind, create_expense, create_expense_table,
    get_expenses, insert_expense_with_invoice, validate_entry,
};
pub use endpoints::{
    create_expense_endpoint, delete_expense_endpoint, get_expense_endpoint,
    list_expenses_endpoint, update_expense_endpoint,
};
pub use installments::{
    InstallmentPurchase, create_installment_purchase, create_installment_purchase_endpoint,
};

#[cfg(test)]
pub(crate) use core::test_expense_form;
