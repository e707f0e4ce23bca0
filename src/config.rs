use mssql_client::{Config, Credentials};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{GdaError, Result};
use crate::recordset::{CursorLocation, CursorType};
use crate::transport::ColumnDescriptor;

pub const DEFAULT_CACHE_SIZE: usize = 64;

/// JSON config sent over the C ABI.
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub recordset: RecordsetDefaults,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Mssql(MssqlConfig),
    Memory(MemoryConfig),
}

/// Settings applied to recordsets created by a connection.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RecordsetDefaults {
    pub cache_size: usize,
    /// Upper bound on rows fetched into a client cache; 0 means unlimited.
    pub max_rows: usize,
    pub cursor_location: CursorLocation,
    pub cursor_type: CursorType,
}

impl Default for RecordsetDefaults {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            max_rows: 0,
            cursor_location: CursorLocation::Client,
            cursor_type: CursorType::ForwardOnly,
        }
    }
}

impl ConnectionConfig {
    /// Parse from a JSON string sent over FFI.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GdaError::Config(format!("Invalid config JSON: {e}")))
    }
}

// ── In-memory provider ───────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub result_sets: Vec<MemoryResultSet>,
}

/// A named result set served by the memory provider. Row values are
/// read according to the declared column types.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryResultSet {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

// ── SQL Server provider ──────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MssqlConfig {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub auth: AuthConfig,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub app_name: String,
    pub instance_name: Option<String>,
    pub packet_size: u16,
    pub pool: Option<PoolConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    #[serde(rename = "sql")]
    Sql { username: String, password: String },
    #[serde(rename = "ntlm")]
    Ntlm {
        username: String,
        password: String,
        domain: String,
    },
    #[serde(rename = "windows")]
    Windows,
    #[serde(rename = "azure_ad")]
    AzureAd { username: String, password: String },
    #[serde(rename = "azure_ad_token")]
    AzureAdToken { token: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub idle_timeout_ms: Option<u64>,
}

impl MssqlConfig {
    /// Convert to an mssql-client Config.
    pub fn to_client_config(&self) -> Result<Config> {
        let credentials = match &self.auth {
            AuthConfig::Sql { username, password } => {
                Credentials::sql_server(username.clone(), password.clone())
            }
            AuthConfig::Ntlm {
                username,
                password,
                domain,
            } => {
                // mssql-client takes NTLM users as domain\username
                let full_user = format!("{domain}\\{username}");
                Credentials::sql_server(full_user, password.clone())
            }
            AuthConfig::Windows => {
                return Err(GdaError::Config(
                    "Windows authentication is not supported by the mssql provider".into(),
                ));
            }
            AuthConfig::AzureAd { username, password } => {
                Credentials::sql_server(username.clone(), password.clone())
            }
            AuthConfig::AzureAdToken { token } => Credentials::azure_token(token.clone()),
        };

        let mut config = Config::new()
            .host(&self.server)
            .port(self.port)
            .credentials(credentials)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .application_name(&self.app_name)
            .trust_server_certificate(self.trust_server_certificate)
            .encrypt(self.encrypt);

        // no builder method for the command timeout
        config.command_timeout = Duration::from_millis(self.request_timeout_ms);

        if !self.database.is_empty() {
            config = config.database(&self.database);
        }

        if let Some(ref instance) = self.instance_name {
            config.instance = Some(instance.clone());
        }

        if self.packet_size > 0 {
            config.packet_size = self.packet_size;
        }

        Ok(config)
    }

    /// Canonical identity key for pool deduplication.
    /// Excludes pool-tuning params (min/max/idle_timeout) and timeouts.
    pub fn dedup_key(&self) -> String {
        let auth_key = match &self.auth {
            AuthConfig::Sql { username, .. } => format!("sql|{}", username),
            AuthConfig::Ntlm {
                username, domain, ..
            } => format!("ntlm|{}|{}", domain, username),
            AuthConfig::Windows => "windows".into(),
            AuthConfig::AzureAd { username, .. } => format!("azure_ad|{}", username),
            AuthConfig::AzureAdToken { .. } => "azure_ad_token".into(),
        };
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.server.to_lowercase(),
            self.port,
            self.database.to_lowercase(),
            auth_key,
            self.encrypt,
            self.trust_server_certificate,
            self.instance_name.as_deref().unwrap_or("").to_lowercase(),
            self.app_name,
            self.packet_size,
        )
    }

    /// Build a pool config from the normalized config.
    pub fn to_pool_config(&self) -> mssql_driver_pool::PoolConfig {
        let mut pc = mssql_driver_pool::PoolConfig::default();
        if let Some(ref pool) = self.pool {
            if let Some(min) = pool.min {
                pc.min_connections = min;
            }
            if let Some(max) = pool.max {
                pc.max_connections = max;
            }
            if let Some(idle_ms) = pool.idle_timeout_ms {
                pc.idle_timeout = Duration::from_millis(idle_ms);
            }
        }
        pc.connection_timeout = Duration::from_millis(self.connect_timeout_ms);
        pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldType;

    #[test]
    fn parse_mssql_sql_auth() {
        let json = r#"{
            "provider": {
                "type": "mssql",
                "server": "localhost",
                "port": 1433,
                "database": "master",
                "auth": {"type": "sql", "username": "sa", "password": "secret"},
                "encrypt": true,
                "trust_server_certificate": true,
                "connect_timeout_ms": 15000,
                "request_timeout_ms": 30000,
                "app_name": "test",
                "instance_name": null,
                "packet_size": 4096,
                "pool": null
            }
        }"#;
        let cfg = ConnectionConfig::from_json(json).unwrap();
        let ProviderConfig::Mssql(mssql) = &cfg.provider else {
            panic!("expected mssql provider");
        };
        assert_eq!(mssql.server, "localhost");
        let client_cfg = mssql.to_client_config().unwrap();
        assert_eq!(client_cfg.host, "localhost");
        assert_eq!(client_cfg.port, 1433);
        assert_eq!(cfg.recordset.cache_size, DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn parse_memory_with_recordset_defaults() {
        let json = r#"{
            "provider": {
                "type": "memory",
                "result_sets": [{
                    "name": "people",
                    "columns": [
                        {"name": "id", "type": "integer"},
                        {"name": "name", "type": "varchar", "defined_size": 32}
                    ],
                    "rows": [[1, "ann"], [2, "bob"]]
                }]
            },
            "recordset": {"cache_size": 16, "cursor_location": "server", "cursor_type": "scrollable"}
        }"#;
        let cfg = ConnectionConfig::from_json(json).unwrap();
        let ProviderConfig::Memory(mem) = &cfg.provider else {
            panic!("expected memory provider");
        };
        assert_eq!(mem.result_sets[0].columns[1].field_type, FieldType::Varchar);
        assert_eq!(mem.result_sets[0].columns[1].defined_size, 32);
        assert_eq!(mem.result_sets[0].rows.len(), 2);
        assert_eq!(cfg.recordset.cache_size, 16);
        assert_eq!(cfg.recordset.max_rows, 0);
        assert_eq!(cfg.recordset.cursor_location, CursorLocation::Server);
        assert_eq!(cfg.recordset.cursor_type, CursorType::Scrollable);
    }

    #[test]
    fn windows_auth_is_rejected() {
        let mut cfg = make_config("localhost", "db", None, None);
        cfg.auth = AuthConfig::Windows;
        assert!(cfg.to_client_config().is_err());
    }

    #[test]
    fn pool_config_carries_limits() {
        let cfg = make_config("localhost", "test", Some(2), Some(10));
        let pool_cfg = cfg.to_pool_config();
        assert_eq!(pool_cfg.min_connections, 2);
        assert_eq!(pool_cfg.max_connections, 10);
    }

    #[test]
    fn invalid_json_returns_error() {
        assert!(ConnectionConfig::from_json("not json").is_err());
        assert!(ConnectionConfig::from_json(r#"{"provider": {"type": "oracle"}}"#).is_err());
    }

    fn make_config(server: &str, database: &str, pool_min: Option<u32>, pool_max: Option<u32>) -> MssqlConfig {
        MssqlConfig {
            server: server.to_string(),
            port: 1433,
            database: database.to_string(),
            auth: AuthConfig::Sql {
                username: "sa".to_string(),
                password: "secret".to_string(),
            },
            encrypt: true,
            trust_server_certificate: true,
            connect_timeout_ms: 15000,
            request_timeout_ms: 15000,
            app_name: "gdacursor".to_string(),
            instance_name: None,
            packet_size: 4096,
            pool: Some(PoolConfig {
                min: pool_min,
                max: pool_max,
                idle_timeout_ms: None,
            }),
        }
    }

    #[test]
    fn dedup_key_ignores_pool_tuning() {
        let a = make_config("localhost", "mydb", Some(1), Some(5));
        let b = make_config("localhost", "mydb", Some(5), Some(50));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_different_server() {
        let a = make_config("host1", "mydb", None, None);
        let b = make_config("host2", "mydb", None, None);
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_case_insensitive_server() {
        let a = make_config("MyServer", "mydb", None, None);
        let b = make_config("myserver", "mydb", None, None);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
