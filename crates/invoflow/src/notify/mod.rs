//! Batch completion emails and the user directory used to address them.
//!
//! Rendering and delivering the actual email is someone else's job; a
//! [`Notifier`] hands a [`BatchCompletedEmail`] to that system.

mod notifier;
mod users;

pub use notifier::{BatchCompletedEmail, LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use users::{StaticUserDirectory, UserContact, UserDirectory};
