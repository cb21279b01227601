mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, EmailConfig, EventsConfig, LoggingConfig, RedisConfig,
    ServerConfig, Settings, SmsConfig, StorageConfig, TransportConfig,
};
