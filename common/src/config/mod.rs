use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::decode_error::ReError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub base: BaseConfig,
    pub master: MasterConfig,
    pub binlog: BinlogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// 日志输出路径
    pub log_dir: Option<String>,
}

/// 到上游master的连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// router作为slave向master注册时使用的server_id
    pub server_id: u32,

    /// router自身的uuid，通过 set @slave_uuid 下发给master
    pub uuid: String,
}

/// 本地binlog落盘与心跳相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinlogConfig {
    /// binlog 文件存放目录
    pub binlog_dir: String,

    /// 起始消费的 binlog file, 如 mysql-bin.000005
    pub file: String,

    /// 起始消费的 position
    pub position: u64,

    /// master_heartbeat_period（纳秒）
    pub heartbeat_period_ns: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            base: BaseConfig::default(),
            master: MasterConfig::default(),
            binlog: BinlogConfig::default(),
        }
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        BaseConfig {
            log_dir: Some(String::from("/tmp/router/logs")),
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: "".to_string(),
            server_id: 65535,
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for BinlogConfig {
    fn default() -> Self {
        BinlogConfig {
            binlog_dir: "/tmp/router/binlog".to_string(),
            file: "".to_string(),
            position: 4,
            heartbeat_period_ns: 1_799_999_979_520,
        }
    }
}

impl BaseConfig {
    pub fn get_log_dir(&self) -> Option<String> {
        self.log_dir.clone()
    }
}

/// 读取指定路径下的配制文件信息
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<RouterConfig, ReError> {
    let mut file = File::open(path.as_ref())?;
    let mut s = String::new();
    file.read_to_string(&mut s)?;

    toml::from_str(s.as_str())
        .map_err(|e| ReError::ConfigFileParseErr(e.to_string()))
}
