mod core;
mod endpoints;

pub use core::{
    Invoice, InvoiceId, InvoiceStatus, add_to_invoice_total, create_invoice_table,
    find_or_create_invoice, get_card_invoices, get_invoice,
};
pub use endpoints::{
    create_invoice_endpoint, delete_invoice_endpoint, get_invoice_endpoint,
    list_card_invoices_endpoint, list_invoices_endpoint, recalculate_invoice_endpoint,
    update_invoice_endpoint,
};

#[cfg(test)]
pub(crate) use core::{InvoiceUpdate, update_invoice};
