use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    Notion,
}

impl ConnectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notion => "notion",
        }
    }
}

impl FromStr for ConnectorType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "notion" => Ok(Self::Notion),
            _ => Err(format!("unknown connector type: {value}")),
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Succeeded,
    Failed,
    InProgress,
    NeverRun,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
            Self::NeverRun => "never_run",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "in_progress" => Ok(Self::InProgress),
            "never_run" => Ok(Self::NeverRun),
            _ => Err(format!("unknown sync status: {value}")),
        }
    }
}

/// Lookup key of a connector: one per (type, workspace, data source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectorKey {
    #[serde(rename = "type")]
    pub connector_type: ConnectorType,
    pub workspace_id: String,
    pub data_source_name: String,
}

impl ConnectorKey {
    pub fn new(
        connector_type: ConnectorType,
        workspace_id: impl Into<String>,
        data_source_name: impl Into<String>,
    ) -> Self {
        Self {
            connector_type,
            workspace_id: workspace_id.into(),
            data_source_name: data_source_name.into(),
        }
    }
}

impl fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.connector_type, self.workspace_id, self.data_source_name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub connector_type: ConnectorType,
    pub workspace_id: String,
    pub workspace_api_key: String,
    pub data_source_name: String,
    /// Token broker connection id.
    pub connection_id: String,
    pub last_sync_status: SyncStatus,
    pub last_sync_start_time: Option<DateTime<Utc>>,
    pub last_sync_finish_time: Option<DateTime<Utc>>,
    pub last_sync_successful_time: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    /// Watermark for incremental listing; `None` means full sync.
    pub sync_cursor: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connector {
    pub fn key(&self) -> ConnectorKey {
        ConnectorKey::new(
            self.connector_type,
            self.workspace_id.clone(),
            self.data_source_name.clone(),
        )
    }
}

/// Input for registering a connector when a tenant links an account.
#[derive(Debug, Clone)]
pub struct NewConnector {
    pub connector_type: ConnectorType,
    pub workspace_id: String,
    pub workspace_api_key: String,
    pub data_source_name: String,
    pub connection_id: String,
}

impl NewConnector {
    pub fn into_connector(self, now: DateTime<Utc>) -> Connector {
        Connector {
            id: Uuid::new_v4(),
            connector_type: self.connector_type,
            workspace_id: self.workspace_id,
            workspace_api_key: self.workspace_api_key,
            data_source_name: self.data_source_name,
            connection_id: self.connection_id,
            last_sync_status: SyncStatus::NeverRun,
            last_sync_start_time: None,
            last_sync_finish_time: None,
            last_sync_successful_time: None,
            last_sync_error: None,
            sync_cursor: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal state of a run, written atomically by `update_sync_result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResultUpdate {
    Succeeded { finished_at: DateTime<Utc> },
    Failed { finished_at: DateTime<Utc>, error: String },
}

/// Apply a terminal result to a connector in place.
///
/// Shared by the repositories so the in-memory fake and Postgres agree:
/// success advances the cursor to the run's start time and both timestamps
/// only move forward; failure leaves the cursor and successful time alone.
pub fn apply_sync_result(connector: &mut Connector, update: &SyncResultUpdate) {
    match update {
        SyncResultUpdate::Succeeded { finished_at } => {
            connector.last_sync_status = SyncStatus::Succeeded;
            connector.last_sync_finish_time = Some(*finished_at);
            connector.last_sync_successful_time =
                max_opt(connector.last_sync_successful_time, Some(*finished_at));
            connector.last_sync_error = None;
            connector.sync_cursor = max_opt(connector.sync_cursor, connector.last_sync_start_time);
            connector.updated_at = *finished_at;
        }
        SyncResultUpdate::Failed { finished_at, error } => {
            connector.last_sync_status = SyncStatus::Failed;
            connector.last_sync_finish_time = Some(*finished_at);
            connector.last_sync_error = Some(error.clone());
            connector.updated_at = *finished_at;
        }
    }
}

fn max_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn connector() -> Connector {
        NewConnector {
            connector_type: ConnectorType::Notion,
            workspace_id: "w1".to_owned(),
            workspace_api_key: "sk-test".to_owned(),
            data_source_name: "ds1".to_owned(),
            connection_id: "conn-1".to_owned(),
        }
        .into_connector(Utc::now())
    }

    #[test]
    fn key_display_is_stable() {
        let key = ConnectorKey::new(ConnectorType::Notion, "w1", "ds1");
        assert_eq!(key.to_string(), "notion:w1:ds1");
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            SyncStatus::Succeeded,
            SyncStatus::Failed,
            SyncStatus::InProgress,
            SyncStatus::NeverRun,
        ] {
            assert_eq!(SyncStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(SyncStatus::from_str("running").is_err());
    }

    #[test]
    fn new_connector_has_never_run() {
        let c = connector();
        assert_eq!(c.last_sync_status, SyncStatus::NeverRun);
        assert!(c.sync_cursor.is_none());
    }

    #[test]
    fn success_advances_cursor_to_run_start() {
        let mut c = connector();
        let started = Utc::now();
        c.last_sync_start_time = Some(started);

        let finished = started + Duration::seconds(30);
        apply_sync_result(&mut c, &SyncResultUpdate::Succeeded { finished_at: finished });

        assert_eq!(c.last_sync_status, SyncStatus::Succeeded);
        assert_eq!(c.sync_cursor, Some(started));
        assert_eq!(c.last_sync_successful_time, Some(finished));
        assert_eq!(c.last_sync_finish_time, Some(finished));
    }

    #[test]
    fn failure_keeps_cursor_and_successful_time() {
        let mut c = connector();
        let t0 = Utc::now();
        c.last_sync_start_time = Some(t0);
        apply_sync_result(&mut c, &SyncResultUpdate::Succeeded { finished_at: t0 });

        c.last_sync_start_time = Some(t0 + Duration::minutes(5));
        apply_sync_result(
            &mut c,
            &SyncResultUpdate::Failed {
                finished_at: t0 + Duration::minutes(6),
                error: "auth error".to_owned(),
            },
        );

        assert_eq!(c.last_sync_status, SyncStatus::Failed);
        assert_eq!(c.sync_cursor, Some(t0));
        assert_eq!(c.last_sync_successful_time, Some(t0));
        assert_eq!(c.last_sync_error.as_deref(), Some("auth error"));
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut c = connector();
        let later = Utc::now();
        c.sync_cursor = Some(later);
        c.last_sync_start_time = Some(later - Duration::hours(1));

        apply_sync_result(&mut c, &SyncResultUpdate::Succeeded { finished_at: later });
        assert_eq!(c.sync_cursor, Some(later));
    }
}
