//! mg-core: Messenger Gateway Core Library
//!
//! 設定の読み込み、エラー型、ホスト側ボットとのインターフェースを提供します。

pub mod config;
pub mod error;
pub mod notification;

pub use config::{AdapterConfig, Config, ServerConfig, DEFAULT_CONFIG_FILE, HEALTH_PATH};
pub use error::{CoreError, Result};
pub use notification::{MessageNotification, NotificationReply, NotificationRequest};
