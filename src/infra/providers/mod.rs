//! HTTP implementations of the external content providers.

pub mod caption;
pub mod holiday;
pub mod sales;
pub mod weather;

pub use caption::ChatCaptionWriter;
pub use holiday::CalendarificHolidays;
pub use sales::SquareSalesProvider;
pub use weather::OpenWeatherProvider;

use reqwest::Client;

use crate::infra::error::InfraError;

pub(crate) fn http_client() -> Result<Client, InfraError> {
    Client::builder()
        .user_agent(concat!("plateful/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| InfraError::configuration(format!("failed to build provider client: {err}")))
}
