//! # Notifications
//!
//! Message composition, recipient and weather lookups, and the dispatcher
//! that fans incident alerts out over SMS.

pub mod composer;
pub mod contacts;
pub mod dispatcher;
pub mod lookups;
pub mod sms;
pub mod weather;

#[cfg(test)]
pub(crate) mod testing;

pub use composer::{MessageComposer, MessageContext, alert_level_label};
pub use contacts::{ContactDirectory, SheetsContactDirectory, StaticContactDirectory};
pub use dispatcher::{
    AlertDispatcher, DispatchCollaborators, DispatchOutcome, NotificationDispatcher,
};
pub use lookups::{LayoutDirectory, chemical_manual_url};
pub use sms::{LogOnlyTransport, SmsRequest, SmsResponse, SmsTransport, SolapiTransport};
pub use weather::{
    DisabledWeatherProvider, EvacuationRecommender, KmaWeatherProvider, SiteScoringRecommender,
    WeatherProvider,
};
