mod core;
mod endpoints;
mod summary;

pub use core::{Card, CardForm, CardId, create_card, create_card_table, delete_card, get_card, get_cards};
pub use endpoints::{
    create_card_endpoint, delete_card_endpoint, get_card_endpoint, list_cards_endpoint,
    update_card_endpoint,
};
pub use summary::{get_card_summary_endpoint, get_used_limit};

#[cfg(test)]
pub(crate) use core::test_card_form;
