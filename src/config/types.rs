//! Configuration types and re-exports

pub use super::{
    AppConfig, BotSettings, DashboardSettings, GateSettings, PaperSettings, PersistenceSettings,
    SummarySettings, TrackerSettings,
};
