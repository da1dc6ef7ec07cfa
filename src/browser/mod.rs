pub mod chrome;
pub mod context;
pub mod time_keeper;

pub use chrome::{ChromeDriver, ConnectionMode};
pub use context::BrowserSession;
pub use time_keeper::TimeKeeperPage;
