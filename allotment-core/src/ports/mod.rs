pub mod connector;
pub mod notifier;

pub use connector::{ColumnSchema, Connector, Row, SqlValue};
pub use notifier::{AlertNotification, AlertSink};
