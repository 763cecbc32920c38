// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时工作区（落地 / 集市 / 参照目录）、配置生成、集市读取
// ==========================================

#![allow(dead_code)]

use energy_mart_etl::config::ConfigManager;
use energy_mart_etl::domain::{RunContext, RunMode};
use energy_mart_etl::repository::{CsvMartRepository, MartStore};
use energy_mart_etl::{EtlConfig, MartTable};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 示例场景: 月度售电量（主键 cliente + periodo）
pub const VENTAS_CONFIG: &str = r#"
sources:
  facturacion:
    pattern: facturacion
    required: true
    sheets:
      ventas_mensual_mwh: 0
tables:
  ventas_mensual_mwh:
    required_columns: [cliente, periodo]
    optional_columns: [mwh]
    key_columns: [cliente, periodo]
    types:
      cliente: identifier
      periodo: period
      mwh: decimal
    constraints:
      mwh:
        - rule: range
          min: 0
"#;

pub const VENTAS_TABLE: &str = "ventas_mensual_mwh";

/// 临时工作区（配置文件位于根目录，默认子目录布局）
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn landing(&self) -> PathBuf {
        self.root().join("data_landing")
    }

    pub fn output(&self) -> PathBuf {
        self.root().join("data_mart")
    }

    pub fn reference(&self) -> PathBuf {
        self.root().join("data_reference")
    }

    /// 写入（或覆盖）落地文件
    pub fn write_landing(&self, name: &str, content: &str) {
        fs::create_dir_all(self.landing()).expect("Failed to create landing dir");
        fs::write(self.landing().join(name), content).expect("Failed to write landing file");
    }

    pub fn remove_landing(&self, name: &str) {
        fs::remove_file(self.landing().join(name)).expect("Failed to remove landing file");
    }

    pub fn write_reference(&self, name: &str, content: &str) {
        fs::create_dir_all(self.reference()).expect("Failed to create reference dir");
        fs::write(self.reference().join(name), content).expect("Failed to write reference file");
    }

    /// 写入 config.yml 并加载
    pub fn config(&self, yaml: &str) -> EtlConfig {
        let path = self.root().join("config.yml");
        fs::write(&path, yaml).expect("Failed to write config");
        let config = ConfigManager::load(&path).expect("Failed to load config");
        ConfigManager::ensure_directories(&config.paths).expect("Failed to create directories");
        config
    }

    pub fn mart_path(&self, table: &str) -> PathBuf {
        self.output().join(format!("{}.csv", table))
    }

    pub fn mart_bytes(&self, table: &str) -> Vec<u8> {
        fs::read(self.mart_path(table)).expect("Failed to read mart file")
    }

    pub fn load_mart(&self, table: &str, keys: &[&str]) -> MartTable {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        CsvMartRepository::new(self.output())
            .load(table, &keys)
            .expect("Failed to load mart")
    }
}

/// 按 cliente 读取某列的值（按集市行顺序）
pub fn column_by_client(mart: &MartTable, column: &str) -> Vec<(String, String)> {
    mart.rows
        .iter()
        .map(|row| {
            (
                row.field("cliente").unwrap_or_default().to_string(),
                row.field(column).unwrap_or_default().to_string(),
            )
        })
        .collect()
}

pub fn strict_ctx() -> RunContext {
    RunContext::new(RunMode::Strict, false, Some("202501".to_string()), true)
}

pub fn non_strict_ctx() -> RunContext {
    RunContext::new(RunMode::NonStrict, false, None, true)
}

pub fn force_ctx() -> RunContext {
    RunContext::new(RunMode::Strict, true, None, true)
}
