mod core;
mod endpoints;

pub use core::{Income, IncomeFilter, IncomeForm, create_income, create_income_table, get_incomes};
pub use endpoints::{
    create_income_endpoint, delete_income_endpoint, get_income_endpoint, list_income_endpoint,
    update_income_endpoint,
};

#[cfg(test)]
pub(crate) use core::test_income_form;
