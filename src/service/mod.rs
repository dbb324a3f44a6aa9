//! Command dispatch and the extension lifecycle

pub mod dispatcher;
pub mod lifecycle;
pub mod send_mail;

pub use dispatcher::{
    CommandDispatcher, CommandError, CommandHandler, DispatchContext, DispatcherBuilder,
};
pub use lifecycle::{HostContext, MailCoreService};
pub use send_mail::{SendMailHandler, SEND_MAIL};
